//! Anonymous Relay
//!
//! A sender picks one of a few fixed recipients, writes a message, and the
//! bot delivers it without revealing who wrote it. The recipient answers by
//! replying to the delivered message; the answer is routed back to the
//! anonymous sender.
//!
//! Selections are ephemeral (RAM only). Reply routing needs no state at all:
//! see `correlation`.

pub mod correlation;
pub mod directory;
pub mod engine;
pub mod session;

pub use correlation::{CorrelationError, CorrelationKey, DeliveredMessage, RELAY_MARKER};
pub use directory::{DirectoryError, Recipient, RecipientDirectory};
pub use engine::{RelayEngine, RelayError, Relayed, ReplyDelivered};
pub use session::{RelaySession, RelaySessionStore};
