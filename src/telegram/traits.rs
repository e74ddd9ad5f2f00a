//! Telegram Client Trait Abstractions
//!
//! The engines and the dispatcher only ever talk to `BotApi`, so every flow
//! can be driven end to end with `MockTelegramClient`.

use async_trait::async_trait;
use std::fmt;

/// Longest text `sendMessage` accepts, in UTF-16 code units
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Length of `text` as the Bot API counts it
pub fn message_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Telegram user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub i64);

/// Telegram chat identifier (private chat, group or channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChatId(pub i64);

/// Message identifier, unique within one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A private chat with a user shares the user's numeric id.
impl From<UserId> for ChatId {
    fn from(user: UserId) -> Self {
        ChatId(user.0)
    }
}

/// One inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    /// Callback payload delivered back in `Update::CallbackSelection`
    pub payload: String,
}

impl InlineButton {
    pub fn new(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            payload: payload.into(),
        }
    }
}

/// Inline keyboard: rows of buttons
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl InlineKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row holding a single button
    pub fn button(mut self, text: impl Into<String>, payload: impl Into<String>) -> Self {
        self.rows.push(vec![InlineButton::new(text, payload)]);
        self
    }

    /// All callback payloads, row by row
    pub fn payloads(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.payload.as_str())
            .collect()
    }
}

/// The message a user replied to, as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepliedMessage {
    pub message_id: MessageId,
    /// Author of the replied-to message, when the platform reports it
    pub author: Option<UserId>,
    pub text: Option<String>,
}

/// Inbound event, already classified by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Plain text (commands included)
    TextMessage {
        sender: UserId,
        chat: ChatId,
        message_id: MessageId,
        text: String,
        reply_to: Option<RepliedMessage>,
    },

    /// Inline keyboard button press
    CallbackSelection {
        callback_id: String,
        from: UserId,
        /// Chat and message the keyboard was attached to
        origin: Option<(ChatId, MessageId)>,
        payload: String,
    },

    /// Request to join a channel that requires approval
    ChatMemberJoinRequest {
        channel: ChatId,
        applicant: UserId,
        /// Private chat the bot may use to contact the applicant
        user_chat: ChatId,
    },
}

/// Result type for Telegram operations
pub type TelegramResult<T> = Result<T, TelegramError>;

/// Telegram client errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TelegramError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Bot API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl TelegramError {
    /// True when the target user cannot be reached at all (blocked the bot,
    /// never opened a private chat, deleted account).
    pub fn is_unreachable(&self) -> bool {
        match self {
            TelegramError::Api { code: 403, .. } => true,
            TelegramError::Api {
                code: 400,
                description,
            } => description.to_lowercase().contains("chat not found"),
            _ => false,
        }
    }
}

/// Telegram Bot API abstraction for testing
///
/// `HttpBotClient` talks to the real Bot API; `MockTelegramClient` records
/// everything in memory.
#[async_trait]
pub trait BotApi: Clone + Send + Sync + 'static {
    /// Send a text message, optionally threaded as a reply
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> TelegramResult<MessageId>;

    /// Send a text message with an inline keyboard
    async fn send_menu(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: &InlineKeyboard,
    ) -> TelegramResult<MessageId>;

    /// Replace the text (and keyboard) of a message the bot sent earlier
    async fn edit_menu(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> TelegramResult<()>;

    /// Acknowledge a button press so the client stops its spinner
    async fn answer_callback(&self, callback_id: &str) -> TelegramResult<()>;

    /// Approve a pending join request
    async fn approve_join_request(&self, channel: ChatId, user: UserId) -> TelegramResult<()>;

    /// Decline a pending join request
    async fn decline_join_request(&self, channel: ChatId, user: UserId) -> TelegramResult<()>;

    /// Receive the next batch of updates (long poll)
    async fn receive_updates(&self) -> TelegramResult<Vec<Update>>;

    /// The bot's own user id
    fn bot_id(&self) -> UserId;
}
