//! Recipient Directory
//!
//! Immutable label -> recipient mapping, loaded once from configuration.

use crate::telegram::traits::UserId;

/// One named recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Short machine label used in callback payloads (lowercase)
    pub label: String,
    /// Name shown on buttons and confirmations
    pub display_name: String,
    pub id: UserId,
}

/// Static set of recipients an anonymous sender may choose from
#[derive(Debug, Clone)]
pub struct RecipientDirectory {
    recipients: Vec<Recipient>,
}

impl RecipientDirectory {
    /// Build the directory. Labels are normalised to lowercase and must be
    /// unique and usable inside a callback payload.
    pub fn new(recipients: Vec<Recipient>) -> Result<Self, DirectoryError> {
        if recipients.is_empty() {
            return Err(DirectoryError::Empty);
        }

        let mut normalised: Vec<Recipient> = Vec::with_capacity(recipients.len());
        for mut recipient in recipients {
            recipient.label = recipient.label.trim().to_lowercase();
            if recipient.label.is_empty()
                || !recipient
                    .label
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
            {
                return Err(DirectoryError::InvalidLabel(recipient.label));
            }
            if normalised.iter().any(|r| r.label == recipient.label) {
                return Err(DirectoryError::DuplicateLabel(recipient.label));
            }
            normalised.push(recipient);
        }

        Ok(Self {
            recipients: normalised,
        })
    }

    /// Look up a recipient by label (case-insensitive)
    pub fn lookup(&self, label: &str) -> Option<&Recipient> {
        let label = label.trim().to_lowercase();
        self.recipients.iter().find(|r| r.label == label)
    }

    /// Recipients in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter()
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Directory construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Recipient directory is empty")]
    Empty,

    #[error("Invalid recipient label '{0}'")]
    InvalidLabel(String),

    #[error("Duplicate recipient label '{0}'")]
    DuplicateLabel(String),
}
