//! Veilpost - Anonymous Relay and Join Verification Bot
//!
//! A Telegram bot that:
//! - Relays anonymous messages to a fixed set of recipients and routes their
//!   replies back to the anonymous sender
//! - Gates a channel's join requests behind a short challenge
//!
//! Key principles:
//! - Volatile state only; nothing is written to disk
//! - Reply routing lives in the delivered message itself (sealed reference)
//! - Message bodies are never logged

pub mod admin;
pub mod relay;
pub mod telegram;
pub mod verification;
