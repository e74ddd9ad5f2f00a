//! Telegram Bot API Integration
//!
//! Transport layer around the two engines:
//! - `traits`: the `BotApi` seam, ids and classified updates
//! - `client`: HTTPS long-polling client
//! - `mock`: in-memory client for tests
//! - `commands`: slash commands, menus and user-facing texts
//! - `bot`: dispatcher and event loop

pub mod bot;
pub mod client;
pub mod commands;
pub mod mock;
pub mod traits;

pub use bot::{DispatchError, RunOutcome, VeilpostBot};
pub use client::HttpBotClient;
pub use mock::MockTelegramClient;
pub use traits::{
    message_len, BotApi, ChatId, InlineKeyboard, MessageId, RepliedMessage, TelegramError,
    TelegramResult, Update, UserId, MAX_MESSAGE_LEN,
};
