//! Shared fixtures: a fully wired bot over `MockTelegramClient`

#![allow(dead_code)]

use std::sync::Arc;
use veilpost::admin::AdminGuard;
use veilpost::relay::{
    CorrelationKey, Recipient, RecipientDirectory, RelayEngine, RelaySessionStore,
};
use veilpost::telegram::{
    ChatId, MessageId, MockTelegramClient, RepliedMessage, Update, UserId, VeilpostBot,
};
use veilpost::verification::{
    ChallengeSpec, VerificationEngine, VerificationPolicy, VerificationSessionStore,
};

pub const BOT: UserId = UserId(999);
pub const ADMIN: UserId = UserId(1);
pub const HEAD: UserId = UserId(100);
pub const DEPUTY: UserId = UserId(200);
pub const CHANNEL: ChatId = ChatId(-1001);
pub const ADMIN_CHANNEL: ChatId = ChatId(-5005);

pub fn directory() -> RecipientDirectory {
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
    .unwrap()
}

pub fn bot_with(
    secret: &[u8],
    challenge: ChallengeSpec,
) -> (Arc<VeilpostBot<MockTelegramClient>>, MockTelegramClient) {
    let client = MockTelegramClient::new(BOT);
    let relay = RelayEngine::new(
        client.clone(),
        Arc::new(directory()),
        RelaySessionStore::new(),
        CorrelationKey::derive(secret).unwrap(),
    );
    let verification = VerificationEngine::new(
        client.clone(),
        VerificationSessionStore::new(3),
        VerificationPolicy {
            channel: CHANNEL,
            admin_chats: vec![ADMIN_CHANNEL],
            challenge,
        },
    );
    let bot = VeilpostBot::new(
        client.clone(),
        relay,
        Some(verification),
        AdminGuard::new([ADMIN]),
        vec![ADMIN_CHANNEL],
    );
    (Arc::new(bot), client)
}

pub fn bot() -> (Arc<VeilpostBot<MockTelegramClient>>, MockTelegramClient) {
    bot_with(b"integration-secret", ChallengeSpec::arithmetic(2, 2).unwrap())
}

pub fn text(sender: UserId, message_id: i64, text: &str) -> Update {
    Update::TextMessage {
        sender,
        chat: ChatId::from(sender),
        message_id: MessageId(message_id),
        text: text.to_string(),
        reply_to: None,
    }
}

pub fn reply(sender: UserId, message_id: i64, replied: RepliedMessage, text: &str) -> Update {
    Update::TextMessage {
        sender,
        chat: ChatId::from(sender),
        message_id: MessageId(message_id),
        text: text.to_string(),
        reply_to: Some(replied),
    }
}

pub fn select(from: UserId, label: &str) -> Update {
    Update::CallbackSelection {
        callback_id: format!("cb-{}-{}", from, label),
        from,
        origin: None,
        payload: format!("target_{}", label),
    }
}

pub fn join_request(applicant: UserId) -> Update {
    Update::ChatMemberJoinRequest {
        channel: CHANNEL,
        applicant,
        user_chat: ChatId::from(applicant),
    }
}
