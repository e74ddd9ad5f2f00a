//! Join Challenges
//!
//! Answer checks are substring or token-count matches, so conversational
//! answers like "it's 4" or "the word is человек" pass.

use serde::{Deserialize, Serialize};

/// Default word for word-recall challenges
pub const DEFAULT_RECALL_WORD: &str = "человек";

/// How an answer is checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerRule {
    /// Answer contains this numeral literally
    ContainsNumeral(String),
    /// Answer contains this word, case-insensitively (stored lowercase)
    ContainsWord(String),
    /// Answer has more than this many whitespace-separated tokens
    MoreTokensThan(usize),
}

/// Prompt shown to an applicant plus the rule checking the answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSpec {
    pub prompt: String,
    pub rule: AnswerRule,
}

impl ChallengeSpec {
    /// "How much is left + right?"
    pub fn arithmetic(left: i64, right: i64) -> Result<Self, ChallengeError> {
        let sum = left
            .checked_add(right)
            .ok_or(ChallengeError::SumOutOfRange { left, right })?;
        Ok(Self {
            prompt: format!("How much is {} + {}?", left, right),
            rule: AnswerRule::ContainsNumeral(sum.to_string()),
        })
    }

    /// Ask the applicant to type back a word
    pub fn word_recall(word: &str) -> Self {
        Self {
            prompt: format!("Please type the word «{}».", word),
            rule: AnswerRule::ContainsWord(word.to_lowercase()),
        }
    }

    /// Ask for a few words about anything
    pub fn free_text() -> Self {
        Self {
            prompt: "Tell us in a few words why you would like to join.".to_string(),
            rule: AnswerRule::MoreTokensThan(2),
        }
    }

    /// Check an answer against the rule
    pub fn validate(&self, answer: &str) -> bool {
        match &self.rule {
            AnswerRule::ContainsNumeral(numeral) => answer.contains(numeral.as_str()),
            AnswerRule::ContainsWord(word) => answer.to_lowercase().contains(word.as_str()),
            AnswerRule::MoreTokensThan(min) => answer.split_whitespace().count() > *min,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("Arithmetic challenge {left} + {right} overflows a 64-bit integer")]
    SumOutOfRange { left: i64, right: i64 },
}

/// Challenge selection as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChallengeConfig {
    Arithmetic { left: i64, right: i64 },
    Word {
        #[serde(default = "default_recall_word")]
        word: String,
    },
    FreeText,
}

fn default_recall_word() -> String {
    DEFAULT_RECALL_WORD.to_string()
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        ChallengeConfig::Arithmetic { left: 2, right: 2 }
    }
}

impl TryFrom<&ChallengeConfig> for ChallengeSpec {
    type Error = ChallengeError;

    fn try_from(config: &ChallengeConfig) -> Result<Self, Self::Error> {
        match config {
            ChallengeConfig::Arithmetic { left, right } => ChallengeSpec::arithmetic(*left, *right),
            ChallengeConfig::Word { word } => Ok(ChallengeSpec::word_recall(word)),
            ChallengeConfig::FreeText => Ok(ChallengeSpec::free_text()),
        }
    }
}
