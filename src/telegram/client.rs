//! Production Telegram Client Implementation
//!
//! Implements `BotApi` over the public Bot API using long polling
//! (`getUpdates`), so no public URL or webhook is needed.
//!
//! Every call is made exactly once. Failures are returned to the caller,
//! which reports them to the affected user.

use super::traits::*;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Public Bot API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Timeout for every call except `getUpdates`
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack on top of the long-poll timeout before the HTTP request gives up
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Update kinds the bot subscribes to
const ALLOWED_UPDATES: [&str; 3] = ["message", "callback_query", "chat_join_request"];

// ── Bot API wire types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
    chat_join_request: Option<TgChatJoinRequest>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    from: Option<TgUser>,
    chat: TgChat,
    text: Option<String>,
    reply_to_message: Option<Box<TgMessage>>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChatJoinRequest {
    chat: TgChat,
    from: TgUser,
    user_chat_id: i64,
}

impl TgUpdate {
    /// Classify a raw update; unsupported kinds yield `None`.
    fn into_update(self) -> Option<Update> {
        if let Some(message) = self.message {
            let sender = message.from.as_ref()?;
            if sender.is_bot {
                return None;
            }
            let text = message.text?;
            let reply_to = message.reply_to_message.map(|replied| RepliedMessage {
                message_id: MessageId(replied.message_id),
                author: replied.from.map(|user| UserId(user.id)),
                text: replied.text,
            });
            return Some(Update::TextMessage {
                sender: UserId(sender.id),
                chat: ChatId(message.chat.id),
                message_id: MessageId(message.message_id),
                text,
                reply_to,
            });
        }

        if let Some(query) = self.callback_query {
            return Some(Update::CallbackSelection {
                callback_id: query.id,
                from: UserId(query.from.id),
                origin: query
                    .message
                    .map(|m| (ChatId(m.chat.id), MessageId(m.message_id))),
                payload: query.data?,
            });
        }

        if let Some(request) = self.chat_join_request {
            return Some(Update::ChatMemberJoinRequest {
                channel: ChatId(request.chat.id),
                applicant: UserId(request.from.id),
                user_chat: ChatId(request.user_chat_id),
            });
        }

        None
    }
}

/// Convert a `getUpdates` batch into classified updates.
///
/// Returns the next offset to poll from (if the batch was non-empty).
pub(crate) fn classify_updates(raw: Vec<TgUpdate>) -> (Option<i64>, Vec<Update>) {
    let next_offset = raw.iter().map(|u| u.update_id + 1).max();
    let updates = raw.into_iter().filter_map(TgUpdate::into_update).collect();
    (next_offset, updates)
}

fn keyboard_markup(keyboard: &InlineKeyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({ "text": button.text, "callback_data": button.payload }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

// ── Client ────────────────────────────────────────────────────────────

/// Telegram Bot API client
#[derive(Clone)]
pub struct HttpBotClient {
    http: reqwest::Client,
    /// `{api_base}/bot{token}`; never logged
    endpoint: Arc<String>,
    poll_timeout: Duration,
    offset: Arc<AtomicI64>,
    bot_id: UserId,
}

impl HttpBotClient {
    /// Connect to the Bot API and verify the token with `getMe`
    pub async fn connect(
        token: &str,
        api_base: &str,
        poll_timeout: Duration,
    ) -> TelegramResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(poll_timeout + POLL_GRACE)
            .build()
            .map_err(|e| TelegramError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let endpoint = Arc::new(format!("{}/bot{}", api_base.trim_end_matches('/'), token));

        let me: TgUser = call(&http, &endpoint, "getMe", json!({}), REQUEST_TIMEOUT).await?;
        info!(
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or("unknown"),
            "connected to Bot API"
        );

        Ok(Self {
            http,
            endpoint,
            poll_timeout,
            offset: Arc::new(AtomicI64::new(0)),
            bot_id: UserId(me.id),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> TelegramResult<T> {
        call(&self.http, &self.endpoint, method, body, REQUEST_TIMEOUT).await
    }
}

async fn call<T: DeserializeOwned>(
    http: &reqwest::Client,
    endpoint: &str,
    method: &str,
    body: Value,
    timeout: Duration,
) -> TelegramResult<T> {
    let url = format!("{}/{}", endpoint, method);
    let response = http
        .post(&url)
        .timeout(timeout)
        .json(&body)
        .send()
        .await
        // Strip the URL: it embeds the bot token
        .map_err(|e| TelegramError::Network(format!("{}: {}", method, e.without_url())))?;

    let status = response.status();
    let envelope: TgResponse<T> = response.json().await.map_err(|e| {
        TelegramError::InvalidResponse(format!("{} (HTTP {}): {}", method, status, e.without_url()))
    })?;

    if !envelope.ok {
        return Err(TelegramError::Api {
            code: envelope.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
            description: envelope.description.unwrap_or_default(),
        });
    }

    envelope
        .result
        .ok_or_else(|| TelegramError::InvalidResponse(format!("{}: missing result", method)))
}

#[async_trait]
impl BotApi for HttpBotClient {
    async fn send_message(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> TelegramResult<MessageId> {
        let mut body = json!({ "chat_id": chat.0, "text": text });
        if let Some(reply_to) = reply_to {
            body["reply_parameters"] = json!({
                "message_id": reply_to.0,
                "allow_sending_without_reply": true,
            });
        }
        let sent: TgMessage = self.call("sendMessage", body).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn send_menu(
        &self,
        chat: ChatId,
        text: &str,
        keyboard: &InlineKeyboard,
    ) -> TelegramResult<MessageId> {
        let body = json!({
            "chat_id": chat.0,
            "text": text,
            "reply_markup": keyboard_markup(keyboard),
        });
        let sent: TgMessage = self.call("sendMessage", body).await?;
        Ok(MessageId(sent.message_id))
    }

    async fn edit_menu(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> TelegramResult<()> {
        let mut body = json!({
            "chat_id": chat.0,
            "message_id": message.0,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard_markup(keyboard);
        }
        // Returns the edited Message, or `true` for inline messages
        let _: Value = self.call("editMessageText", body).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> TelegramResult<()> {
        let _: bool = self
            .call("answerCallbackQuery", json!({ "callback_query_id": callback_id }))
            .await?;
        Ok(())
    }

    async fn approve_join_request(&self, channel: ChatId, user: UserId) -> TelegramResult<()> {
        let _: bool = self
            .call(
                "approveChatJoinRequest",
                json!({ "chat_id": channel.0, "user_id": user.0 }),
            )
            .await?;
        Ok(())
    }

    async fn decline_join_request(&self, channel: ChatId, user: UserId) -> TelegramResult<()> {
        let _: bool = self
            .call(
                "declineChatJoinRequest",
                json!({ "chat_id": channel.0, "user_id": user.0 }),
            )
            .await?;
        Ok(())
    }

    async fn receive_updates(&self) -> TelegramResult<Vec<Update>> {
        let body = json!({
            "offset": self.offset.load(Ordering::Acquire),
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ALLOWED_UPDATES,
        });
        let raw: Vec<TgUpdate> = call(
            &self.http,
            &self.endpoint,
            "getUpdates",
            body,
            self.poll_timeout + POLL_GRACE,
        )
        .await?;

        let received = raw.len();
        let (next_offset, updates) = classify_updates(raw);
        if let Some(next) = next_offset {
            self.offset.store(next, Ordering::Release);
        }
        if received > 0 {
            debug!(received, classified = updates.len(), "polled updates");
        }
        Ok(updates)
    }

    fn bot_id(&self) -> UserId {
        self.bot_id
    }
}
