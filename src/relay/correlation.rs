//! Reply Correlation for Relayed Messages
//!
//! A relayed message carries everything needed to route a reply back to its
//! anonymous author, so nothing has to be stored by the bot:
//!
//! ```text
//! 📨 Anonymous message:            <- RELAY_MARKER
//!
//! <sender's text>
//!
//! ↩️ To answer, reply to this message.
//! ref:<hex(nonce || AES-256-GCM(sender chat, sender message))>
//! ```
//!
//! The token key is derived with HKDF-SHA256 from the correlation secret.
//! Without the key the token reveals nothing about the sender and cannot be
//! forged, so a recipient can only ever answer the real author.

use crate::telegram::traits::{ChatId, MessageId, RepliedMessage, UserId};
use hkdf::Hkdf;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Marker text that identifies a relayed message
pub const RELAY_MARKER: &str = "📨 Anonymous message";

/// Prefix of the line holding the sealed sender reference
pub const REF_PREFIX: &str = "ref:";

/// Domain separation for the correlation key (versioned for rotation)
const CORRELATION_SALT: &[u8] = b"veilpost-correlation-v1";
const CORRELATION_INFO: &[u8] = b"reply-correlation";

/// Plaintext layout: chat id (8 bytes BE) || message id (8 bytes BE)
const PLAINTEXT_LEN: usize = 16;

/// Where a relayed message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginalSender {
    /// Private chat with the anonymous sender
    pub chat: ChatId,
    /// The sender's own message that was relayed
    pub message: MessageId,
}

impl OriginalSender {
    pub fn user(&self) -> UserId {
        UserId(self.chat.0)
    }
}

/// A replied-to message recognised as a relay delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub delivered_message_id: MessageId,
    pub original_sender: OriginalSender,
}

impl DeliveredMessage {
    /// Recognise `replied` as a message this bot relayed.
    ///
    /// Requires the bot as author (when reported), the marker text, and a
    /// reference token that opens under `key`.
    pub fn recognize(
        replied: &RepliedMessage,
        bot_id: UserId,
        key: &CorrelationKey,
    ) -> Result<Self, CorrelationError> {
        if replied.author.is_some_and(|author| author != bot_id) {
            return Err(CorrelationError::NotRelayMessage);
        }

        let text = replied
            .text
            .as_deref()
            .ok_or(CorrelationError::NotRelayMessage)?;
        if !text.contains(RELAY_MARKER) {
            return Err(CorrelationError::NotRelayMessage);
        }

        let token = extract_token(text).ok_or(CorrelationError::NotRelayMessage)?;
        let original_sender = key.open(token)?;

        Ok(Self {
            delivered_message_id: replied.message_id,
            original_sender,
        })
    }
}

/// Build the text delivered to a recipient
pub fn compose_relay_body(text: &str, token: &str) -> String {
    format!(
        "{}:\n\n{}\n\n↩️ To answer, reply to this message.\n{}{}",
        RELAY_MARKER, text, REF_PREFIX, token
    )
}

/// Find the reference token (last `ref:` line)
fn extract_token(text: &str) -> Option<&str> {
    text.lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(REF_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Symmetric key sealing sender references
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CorrelationKey {
    key: [u8; 32],
}

impl std::fmt::Debug for CorrelationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CorrelationKey(..)")
    }
}

impl CorrelationKey {
    /// Derive the key from a secret (bot token or configured secret)
    pub fn derive(secret: &[u8]) -> Result<Self, CorrelationError> {
        if secret.is_empty() {
            return Err(CorrelationError::KeyDerivation(
                "correlation secret is empty".to_string(),
            ));
        }

        let hk = Hkdf::<Sha256>::new(Some(CORRELATION_SALT), secret);
        let mut key = [0u8; 32];
        hk.expand(CORRELATION_INFO, &mut key)
            .map_err(|e| CorrelationError::KeyDerivation(e.to_string()))?;
        Ok(Self { key })
    }

    fn aead_key(&self) -> Result<LessSafeKey, CorrelationError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|e| CorrelationError::KeyDerivation(format!("Key creation failed: {}", e)))?;
        Ok(LessSafeKey::new(unbound))
    }

    /// Seal a sender reference into a hex token
    pub fn seal(&self, origin: &OriginalSender) -> Result<String, CorrelationError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| CorrelationError::Seal("RNG failure".to_string()))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut buffer = Vec::with_capacity(PLAINTEXT_LEN + AES_256_GCM.tag_len());
        buffer.extend_from_slice(&origin.chat.0.to_be_bytes());
        buffer.extend_from_slice(&origin.message.0.to_be_bytes());

        self.aead_key()?
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut buffer)
            .map_err(|e| CorrelationError::Seal(e.to_string()))?;

        let mut token = Vec::with_capacity(NONCE_LEN + buffer.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&buffer);
        Ok(hex::encode(token))
    }

    /// Open a token produced by `seal`
    pub fn open(&self, token: &str) -> Result<OriginalSender, CorrelationError> {
        let bytes = hex::decode(token).map_err(|_| CorrelationError::MalformedToken)?;
        if bytes.len() != NONCE_LEN + PLAINTEXT_LEN + AES_256_GCM.tag_len() {
            return Err(CorrelationError::MalformedToken);
        }

        let (nonce_bytes, sealed) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CorrelationError::MalformedToken)?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .aead_key()?
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| CorrelationError::Unauthentic)?;

        let (chat, message) = plaintext.split_at(8);
        let chat = i64::from_be_bytes(
            chat.try_into()
                .map_err(|_| CorrelationError::MalformedToken)?,
        );
        let message = i64::from_be_bytes(
            message
                .try_into()
                .map_err(|_| CorrelationError::MalformedToken)?,
        );

        Ok(OriginalSender {
            chat: ChatId(chat),
            message: MessageId(message),
        })
    }
}

/// Correlation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("Message is not a relayed message")]
    NotRelayMessage,

    #[error("Malformed reference token")]
    MalformedToken,

    #[error("Reference token failed authentication")]
    Unauthentic,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Sealing failed: {0}")]
    Seal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOT: UserId = UserId(999);

    fn key() -> CorrelationKey {
        CorrelationKey::derive(b"123456:test-token").unwrap()
    }

    fn origin() -> OriginalSender {
        OriginalSender {
            chat: ChatId(4242),
            message: MessageId(17),
        }
    }

    fn replied(author: Option<UserId>, text: &str) -> RepliedMessage {
        RepliedMessage {
            message_id: MessageId(300),
            author,
            text: Some(text.to_string()),
        }
    }

    #[test]
    fn test_recognize_delivered_message() {
        let key = key();
        let token = key.seal(&origin()).unwrap();
        let body = compose_relay_body("meet at noon", &token);

        let delivered = DeliveredMessage::recognize(&replied(Some(BOT), &body), BOT, &key).unwrap();
        assert_eq!(delivered.delivered_message_id, MessageId(300));
        assert_eq!(delivered.original_sender, origin());
        assert_eq!(delivered.original_sender.user(), UserId(4242));
    }

    #[test]
    fn test_body_does_not_expose_sender() {
        let token = key().seal(&origin()).unwrap();
        let body = compose_relay_body("hi", &token);

        assert!(body.starts_with(RELAY_MARKER));
        assert!(!body.contains("4242"));
    }

    #[test]
    fn test_tokens_are_not_reused() {
        let key = key();
        assert_ne!(key.seal(&origin()).unwrap(), key.seal(&origin()).unwrap());
    }

    #[test]
    fn test_rejects_foreign_author() {
        let key = key();
        let body = compose_relay_body("hi", &key.seal(&origin()).unwrap());

        assert_eq!(
            DeliveredMessage::recognize(&replied(Some(UserId(1)), &body), BOT, &key),
            Err(CorrelationError::NotRelayMessage)
        );
    }

    #[test]
    fn test_rejects_plain_messages() {
        let key = key();

        assert_eq!(
            DeliveredMessage::recognize(&replied(Some(BOT), "✅ Message sent"), BOT, &key),
            Err(CorrelationError::NotRelayMessage)
        );
        let marker_only = format!("{}:\n\nhello", RELAY_MARKER);
        assert_eq!(
            DeliveredMessage::recognize(&replied(Some(BOT), &marker_only), BOT, &key),
            Err(CorrelationError::NotRelayMessage)
        );
        let no_text = RepliedMessage {
            message_id: MessageId(1),
            author: Some(BOT),
            text: None,
        };
        assert_eq!(
            DeliveredMessage::recognize(&no_text, BOT, &key),
            Err(CorrelationError::NotRelayMessage)
        );
    }

    #[test]
    fn test_rejects_token_from_other_key() {
        let other = CorrelationKey::derive(b"another-secret").unwrap();
        let body = compose_relay_body("hi", &other.seal(&origin()).unwrap());

        assert_eq!(
            DeliveredMessage::recognize(&replied(Some(BOT), &body), BOT, &key()),
            Err(CorrelationError::Unauthentic)
        );
    }

    #[test]
    fn test_rejects_malformed_token() {
        let key = key();
        assert_eq!(key.open("zz-not-hex"), Err(CorrelationError::MalformedToken));
        assert_eq!(key.open("abcd"), Err(CorrelationError::MalformedToken));
    }

    #[test]
    fn test_sender_text_cannot_shadow_token() {
        let key = key();
        let token = key.seal(&origin()).unwrap();
        // A sender writing their own ref: line does not displace the real one
        let body = compose_relay_body("ref:deadbeef", &token);

        let delivered = DeliveredMessage::recognize(&replied(Some(BOT), &body), BOT, &key).unwrap();
        assert_eq!(delivered.original_sender, origin());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            CorrelationKey::derive(b""),
            Err(CorrelationError::KeyDerivation(_))
        ));
    }

    proptest! {
        /// Property: any sender reference survives seal/open
        #[test]
        fn seal_open_preserves_origin(chat in any::<i64>(), message in any::<i64>()) {
            let key = key();
            let origin = OriginalSender { chat: ChatId(chat), message: MessageId(message) };

            let token = key.seal(&origin).unwrap();
            prop_assert_eq!(key.open(&token).unwrap(), origin);
        }

        /// Property: flipping any token byte breaks authentication
        #[test]
        fn tampered_token_is_rejected(index in 0usize..60, flip in 1u8..=255) {
            let key = key();
            let token = key.seal(&origin()).unwrap();
            let mut bytes = hex::decode(&token).unwrap();
            let index = index % bytes.len();
            bytes[index] ^= flip;

            prop_assert!(key.open(&hex::encode(bytes)).is_err());
        }
    }
}
