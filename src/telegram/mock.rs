//! Mock Telegram Client for Testing
//!
//! Provides MockTelegramClient so relay, verification and dispatch flows can
//! be exercised without the real Bot API.

use super::traits::*;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Mock Telegram client for testing
#[derive(Clone)]
pub struct MockTelegramClient {
    state: Arc<Mutex<MockState>>,
    bot_id: UserId,
}

#[derive(Default)]
struct MockState {
    sent_messages: Vec<SentMessage>,
    edits: Vec<EditedMessage>,
    answered_callbacks: Vec<String>,
    join_decisions: Vec<JoinDecision>,
    incoming_updates: VecDeque<Update>,
    unreachable: HashSet<ChatId>,
    fail_join_decisions: bool,
    slow_join_decisions: bool,
    next_message_id: i64,
}

/// Message recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub reply_to: Option<MessageId>,
    pub keyboard: Option<InlineKeyboard>,
}

/// Edit recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedMessage {
    pub chat: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub keyboard: Option<InlineKeyboard>,
}

/// Join-request decision recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinDecision {
    Approved { channel: ChatId, user: UserId },
    Declined { channel: ChatId, user: UserId },
}

impl MockTelegramClient {
    /// Create new mock client
    pub fn new(bot_id: UserId) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_message_id: 1,
                ..MockState::default()
            })),
            bot_id,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an update for the next `receive_updates` call
    pub fn push_update(&self, update: Update) {
        self.state().incoming_updates.push_back(update);
    }

    /// Make every send to `chat` fail as if the user blocked the bot
    pub fn set_unreachable(&self, chat: ChatId) {
        self.state().unreachable.insert(chat);
    }

    /// Undo `set_unreachable`
    pub fn set_reachable(&self, chat: ChatId) {
        self.state().unreachable.remove(&chat);
    }

    /// Make approve/decline calls fail with a transient error
    pub fn fail_join_decisions(&self, fail: bool) {
        self.state().fail_join_decisions = fail;
    }

    /// Make approve/decline calls yield to the scheduler before completing,
    /// so concurrent handlers interleave around them
    pub fn slow_join_decisions(&self, slow: bool) {
        self.state().slow_join_decisions = slow;
    }

    /// Get sent messages for assertions
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state().sent_messages.clone()
    }

    /// Texts sent to a specific chat, in order
    pub fn sent_to(&self, chat: ChatId) -> Vec<String> {
        self.state()
            .sent_messages
            .iter()
            .filter(|msg| msg.chat == chat)
            .map(|msg| msg.text.clone())
            .collect()
    }

    /// Most recent message sent to `chat`
    pub fn last_sent_to(&self, chat: ChatId) -> Option<SentMessage> {
        self.state()
            .sent_messages
            .iter()
            .rev()
            .find(|msg| msg.chat == chat)
            .cloned()
    }

    /// Get message edits for assertions
    pub fn edits(&self) -> Vec<EditedMessage> {
        self.state().edits.clone()
    }

    /// Callback ids that were acknowledged
    pub fn answered_callbacks(&self) -> Vec<String> {
        self.state().answered_callbacks.clone()
    }

    /// Join-request decisions issued so far
    pub fn join_decisions(&self) -> Vec<JoinDecision> {
        self.state().join_decisions.clone()
    }

    /// Clear all recorded traffic
    pub fn clear(&self) {
        let mut state = self.state();
        state.sent_messages.clear();
        state.edits.clear();
        state.answered_callbacks.clear();
        state.join_decisions.clear();
    }

    fn blocked(chat: ChatId) -> TelegramError {
        TelegramError::Api {
            code: 403,
            description: format!("Forbidden: bot was blocked by the user {}", chat),
        }
    }

    fn record_send(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboard>,
    ) -> TelegramResult<MessageId> {
        let mut state = self.state();
        if state.unreachable.contains(&chat) {
            return Err(Self::blocked(chat));
        }
        if message_len(text) > MAX_MESSAGE_LEN {
            return Err(TelegramError::Api {
                code: 400,
                description: "Bad Request: message is too long".to_string(),
            });
        }

        let message_id = MessageId(state.next_message_id);
        state.next_message_id += 1;
        state.sent_messages.push(SentMessage {
            chat,
            message_id,
            text: text.to_string(),
            reply_to,
            keyboard,
        });
        Ok(message_id)
    }

    async fn record_decision(&self, decision: JoinDecision) -> TelegramResult<()> {
        let slow = self.state().slow_join_decisions;
        if slow {
            tokio::task::yield_now().await;
        }

        let mut state = self.state();
        if state.fail_join_decisions {
            return Err(TelegramError::Network(
                "simulated join decision failure".to_string(),
            ));
        }
        state.join_decisions.push(decision);
        Ok(())
    }
}

#[async_trait]
impl BotApi for MockTelegramClient {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> TelegramResult<MessageId> {
        self.record_send(chat, text, reply_to, None)
    }

    async fn send_menu(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: &InlineKeyboard,
    ) -> TelegramResult<MessageId> {
        self.record_send(chat, text, None, Some(keyboard.clone()))
    }

    async fn edit_menu(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> TelegramResult<()> {
        let mut state = self.state();
        if state.unreachable.contains(&chat) {
            return Err(Self::blocked(chat));
        }
        state.edits.push(EditedMessage {
            chat,
            message_id: message,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> TelegramResult<()> {
        self.state()
            .answered_callbacks
            .push(callback_id.to_string());
        Ok(())
    }

    async fn approve_join_request(&self, channel: ChatId, user: UserId) -> TelegramResult<()> {
        self.record_decision(JoinDecision::Approved { channel, user })
            .await
    }

    async fn decline_join_request(&self, channel: ChatId, user: UserId) -> TelegramResult<()> {
        self.record_decision(JoinDecision::Declined { channel, user })
            .await
    }

    async fn receive_updates(&self) -> TelegramResult<Vec<Update>> {
        Ok(self.state().incoming_updates.drain(..).collect())
    }

    fn bot_id(&self) -> UserId {
        self.bot_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_message_assigns_ids() {
        let client = MockTelegramClient::new(UserId(1));

        let first = client.send_message(ChatId(10), "Hello", None).await.unwrap();
        let second = client
            .send_message(ChatId(10), "Again", Some(first))
            .await
            .unwrap();

        assert_ne!(first, second);
        let sent = client.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].reply_to, Some(first));
        assert_eq!(client.sent_to(ChatId(10)), vec!["Hello", "Again"]);
    }

    #[tokio::test]
    async fn test_unreachable_chat_fails() {
        let client = MockTelegramClient::new(UserId(1));
        client.set_unreachable(ChatId(10));

        let err = client.send_message(ChatId(10), "Hello", None).await.unwrap_err();
        assert!(err.is_unreachable());
        assert!(client.sent_messages().is_empty());

        client.set_reachable(ChatId(10));
        assert!(client.send_message(ChatId(10), "Hello", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_decisions() {
        let client = MockTelegramClient::new(UserId(1));

        client
            .approve_join_request(ChatId(-100), UserId(5))
            .await
            .unwrap();
        client.fail_join_decisions(true);
        assert!(client
            .decline_join_request(ChatId(-100), UserId(6))
            .await
            .is_err());

        assert_eq!(
            client.join_decisions(),
            vec![JoinDecision::Approved {
                channel: ChatId(-100),
                user: UserId(5)
            }]
        );
    }

    #[tokio::test]
    async fn test_receive_updates_drains_queue() {
        let client = MockTelegramClient::new(UserId(1));
        client.push_update(Update::ChatMemberJoinRequest {
            channel: ChatId(-100),
            applicant: UserId(7),
            user_chat: ChatId(7),
        });

        assert_eq!(client.receive_updates().await.unwrap().len(), 1);
        assert!(client.receive_updates().await.unwrap().is_empty());
    }
}
