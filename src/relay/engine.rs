//! Relay Engine
//!
//! Recipient selection, anonymous delivery, and reply routing back to the
//! anonymous sender.

use super::correlation::{
    compose_relay_body, CorrelationError, CorrelationKey, DeliveredMessage, OriginalSender,
};
use super::directory::{Recipient, RecipientDirectory};
use super::session::{RelaySession, RelaySessionStore};
use crate::telegram::traits::{
    message_len, BotApi, ChatId, MessageId, RepliedMessage, TelegramError, UserId,
    MAX_MESSAGE_LEN,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Successful anonymous delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    pub recipient: Recipient,
    /// Id of the delivered message in the recipient's chat
    pub delivered_message_id: MessageId,
}

/// Successful reply routed back to an anonymous sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDelivered {
    /// Id of the reply in the original sender's chat
    pub delivered_message_id: MessageId,
}

/// Relay errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Unknown recipient '{0}'")]
    UnknownRecipient(String),

    #[error("No recipient selected")]
    NoRecipientSelected,

    #[error("Not a reply to a relayed message")]
    NotARelayReply,

    #[error("Delivery to {target} failed: {source}")]
    DeliveryFailed {
        target: String,
        #[source]
        source: TelegramError,
    },

    #[error("Message is {excess} character(s) over the platform limit")]
    MessageTooLong { excess: usize },

    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

/// Reject a composed body the Bot API would refuse
fn check_length(body: &str) -> Result<(), RelayError> {
    match message_len(body).saturating_sub(MAX_MESSAGE_LEN) {
        0 => Ok(()),
        excess => Err(RelayError::MessageTooLong { excess }),
    }
}

/// Text the original sender receives when a recipient answers
pub fn compose_reply_body(text: &str) -> String {
    format!("↩️ Reply to your anonymous message:\n\n{}", text)
}

/// Anonymous relay state machine
pub struct RelayEngine<C: BotApi> {
    client: C,
    directory: Arc<RecipientDirectory>,
    sessions: RelaySessionStore,
    key: CorrelationKey,
}

impl<C: BotApi> RelayEngine<C> {
    pub fn new(
        client: C,
        directory: Arc<RecipientDirectory>,
        sessions: RelaySessionStore,
        key: CorrelationKey,
    ) -> Self {
        Self {
            client,
            directory,
            sessions,
            key,
        }
    }

    pub fn directory(&self) -> &RecipientDirectory {
        &self.directory
    }

    pub fn sessions(&self) -> &RelaySessionStore {
        &self.sessions
    }

    /// Remember which recipient `sender` wants to write to.
    ///
    /// Overwrites any earlier, unconsumed selection.
    pub fn select_recipient(&self, sender: UserId, label: &str) -> Result<Recipient, RelayError> {
        let recipient = self
            .directory
            .lookup(label)
            .cloned()
            .ok_or_else(|| RelayError::UnknownRecipient(label.to_string()))?;

        let replaced = self.sessions.put(RelaySession {
            sender,
            recipient: recipient.clone(),
        });
        if let Some(previous) = replaced {
            debug!(
                sender = %sender,
                previous = %previous.recipient.label,
                "replaced pending recipient selection"
            );
        }

        info!(sender = %sender, recipient = %recipient.label, "recipient selected");
        Ok(recipient)
    }

    /// Deliver `text` anonymously to the recipient `sender` selected.
    ///
    /// `message_id` is the sender's own message in their private chat; it is
    /// sealed into the delivery so a reply can be threaded under it.
    ///
    /// The selection is consumed whether or not delivery succeeds. Text too
    /// long to deliver is refused up front and the selection is kept.
    pub async fn relay(
        &self,
        sender: UserId,
        message_id: MessageId,
        text: &str,
    ) -> Result<Relayed, RelayError> {
        if self.sessions.get(sender).is_none() {
            return Err(RelayError::NoRecipientSelected);
        }

        let token = self.key.seal(&OriginalSender {
            chat: ChatId::from(sender),
            message: message_id,
        })?;
        let body = compose_relay_body(text, &token);
        check_length(&body)?;

        let session = self
            .sessions
            .take(sender)
            .ok_or(RelayError::NoRecipientSelected)?;
        let recipient = session.recipient;

        match self
            .client
            .send_message(ChatId::from(recipient.id), &body, None)
            .await
        {
            Ok(delivered_message_id) => {
                info!(
                    recipient = %recipient.label,
                    delivered = %delivered_message_id,
                    "anonymous message relayed"
                );
                Ok(Relayed {
                    recipient,
                    delivered_message_id,
                })
            }
            Err(source) => {
                warn!(recipient = %recipient.label, error = %source, "relay delivery failed");
                Err(RelayError::DeliveryFailed {
                    target: recipient.display_name,
                    source,
                })
            }
        }
    }

    /// Route a reply to a relayed message back to its anonymous author.
    ///
    /// Fails with `NotARelayReply` when `replied` is not a relay delivery, in
    /// which case the caller treats the text as an ordinary message.
    pub async fn relay_reply(
        &self,
        replier: UserId,
        replied: &RepliedMessage,
        text: &str,
    ) -> Result<ReplyDelivered, RelayError> {
        let delivered = DeliveredMessage::recognize(replied, self.client.bot_id(), &self.key)
            .map_err(|e| {
                debug!(replier = %replier, reason = %e, "reply is not a relay reply");
                RelayError::NotARelayReply
            })?;
        let origin = delivered.original_sender;
        let body = compose_reply_body(text);
        check_length(&body)?;

        let delivered_message_id = self
            .client
            .send_message(origin.chat, &body, Some(origin.message))
            .await
            .map_err(|source| {
                warn!(replier = %replier, error = %source, "reply delivery failed");
                RelayError::DeliveryFailed {
                    target: "the anonymous sender".to_string(),
                    source,
                }
            })?;

        info!(
            replier = %replier,
            in_reply_to = %delivered.delivered_message_id,
            "reply routed to anonymous sender"
        );
        Ok(ReplyDelivered {
            delivered_message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::correlation::RELAY_MARKER;
    use crate::telegram::mock::MockTelegramClient;

    const BOT: UserId = UserId(999);
    const HEAD: UserId = UserId(100);
    const DEPUTY: UserId = UserId(200);
    const SENDER: UserId = UserId(7);

    fn directory() -> Arc<RecipientDirectory> {
        Arc::new(
            RecipientDirectory::new(vec![
                Recipient {
                    label: "head".to_string(),
                    display_name: "Head".to_string(),
                    id: HEAD,
                },
                Recipient {
                    label: "deputy".to_string(),
                    display_name: "Deputy".to_string(),
                    id: DEPUTY,
                },
            ])
            .unwrap(),
        )
    }

    fn engine() -> (RelayEngine<MockTelegramClient>, MockTelegramClient) {
        let client = MockTelegramClient::new(BOT);
        let engine = RelayEngine::new(
            client.clone(),
            directory(),
            RelaySessionStore::new(),
            CorrelationKey::derive(b"test-secret").unwrap(),
        );
        (engine, client)
    }

    fn reply_to(message: &crate::telegram::mock::SentMessage) -> RepliedMessage {
        RepliedMessage {
            message_id: message.message_id,
            author: Some(BOT),
            text: Some(message.text.clone()),
        }
    }

    #[test]
    fn test_select_unknown_recipient() {
        let (engine, _) = engine();

        let err = engine.select_recipient(SENDER, "treasurer").unwrap_err();
        assert!(matches!(err, RelayError::UnknownRecipient(label) if label == "treasurer"));
        assert_eq!(engine.sessions().active_count(), 0);
    }

    #[tokio::test]
    async fn test_relay_delivers_once_then_requires_selection() {
        let (engine, client) = engine();

        engine.select_recipient(SENDER, "head").unwrap();
        let relayed = engine.relay(SENDER, MessageId(1), "hi").await.unwrap();
        assert_eq!(relayed.recipient.id, HEAD);

        let to_head = client.sent_to(ChatId::from(HEAD));
        assert_eq!(to_head.len(), 1);
        assert!(to_head[0].contains(RELAY_MARKER));
        assert!(to_head[0].contains("hi"));

        assert!(matches!(
            engine.relay(SENDER, MessageId(2), "hi").await,
            Err(RelayError::NoRecipientSelected)
        ));
        assert_eq!(client.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_last_selection_wins() {
        let (engine, client) = engine();

        engine.select_recipient(SENDER, "head").unwrap();
        engine.select_recipient(SENDER, "deputy").unwrap();
        engine.relay(SENDER, MessageId(1), "hello").await.unwrap();

        assert!(client.sent_to(ChatId::from(HEAD)).is_empty());
        assert_eq!(client.sent_to(ChatId::from(DEPUTY)).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_consumes_selection() {
        let (engine, client) = engine();
        client.set_unreachable(ChatId::from(HEAD));

        engine.select_recipient(SENDER, "head").unwrap();
        let err = engine.relay(SENDER, MessageId(1), "hello").await.unwrap_err();
        match err {
            RelayError::DeliveryFailed { target, source } => {
                assert_eq!(target, "Head");
                assert!(source.is_unreachable());
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(engine.sessions().get(SENDER).is_none());
    }

    #[tokio::test]
    async fn test_reply_routes_back_to_sender() {
        let (engine, client) = engine();

        engine.select_recipient(SENDER, "head").unwrap();
        engine.relay(SENDER, MessageId(41), "question").await.unwrap();
        let delivered = client.last_sent_to(ChatId::from(HEAD)).unwrap();

        engine
            .relay_reply(HEAD, &reply_to(&delivered), "answer")
            .await
            .unwrap();

        let back = client.last_sent_to(ChatId::from(SENDER)).unwrap();
        assert_eq!(back.text, compose_reply_body("answer"));
        assert_eq!(back.reply_to, Some(MessageId(41)));
    }

    #[tokio::test]
    async fn test_reply_to_ordinary_message_is_not_relay_reply() {
        let (engine, client) = engine();
        let replied = RepliedMessage {
            message_id: MessageId(5),
            author: Some(BOT),
            text: Some("✅ Message sent anonymously!".to_string()),
        };

        assert!(matches!(
            engine.relay_reply(HEAD, &replied, "answer").await,
            Err(RelayError::NotARelayReply)
        ));
        assert!(client.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_unreachable_sender_reports_failure() {
        let (engine, client) = engine();

        engine.select_recipient(SENDER, "head").unwrap();
        engine.relay(SENDER, MessageId(1), "question").await.unwrap();
        let delivered = client.last_sent_to(ChatId::from(HEAD)).unwrap();
        client.set_unreachable(ChatId::from(SENDER));

        assert!(matches!(
            engine.relay_reply(HEAD, &reply_to(&delivered), "answer").await,
            Err(RelayError::DeliveryFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_overlong_message_keeps_selection() {
        let (engine, client) = engine();
        engine.select_recipient(SENDER, "head").unwrap();

        let result = engine
            .relay(SENDER, MessageId(1), &"x".repeat(MAX_MESSAGE_LEN))
            .await;

        assert!(matches!(result, Err(RelayError::MessageTooLong { excess }) if excess > 0));
        assert!(client.sent_messages().is_empty());
        assert!(engine.sessions().get(SENDER).is_some());

        engine
            .relay(SENDER, MessageId(2), &"x".repeat(MAX_MESSAGE_LEN - 300))
            .await
            .unwrap();
        assert_eq!(client.sent_to(ChatId::from(HEAD)).len(), 1);
    }

    #[tokio::test]
    async fn test_overlong_message_without_selection() {
        let (engine, _client) = engine();

        assert!(matches!(
            engine.relay(SENDER, MessageId(1), &"x".repeat(5000)).await,
            Err(RelayError::NoRecipientSelected)
        ));
    }

    #[tokio::test]
    async fn test_reply_length_limit() {
        let (engine, client) = engine();
        engine.select_recipient(SENDER, "head").unwrap();
        engine.relay(SENDER, MessageId(1), "question").await.unwrap();
        let delivered = client.last_sent_to(ChatId::from(HEAD)).unwrap();
        let room = MAX_MESSAGE_LEN - message_len(&compose_reply_body(""));

        assert!(matches!(
            engine
                .relay_reply(HEAD, &reply_to(&delivered), &"y".repeat(room + 1))
                .await,
            Err(RelayError::MessageTooLong { excess: 1 })
        ));
        assert!(client.sent_to(ChatId::from(SENDER)).is_empty());

        engine
            .relay_reply(HEAD, &reply_to(&delivered), &"y".repeat(room))
            .await
            .unwrap();
    }
}
