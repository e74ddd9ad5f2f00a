//! Veilpost Bot
//!
//! Event loop and dispatcher:
//! - Long-polls the Bot API and handles every update in its own task
//! - Routes text to reply routing, join verification or anonymous relay
//! - Handles commands and inline menus, guarding admin operations
//! - Turns every handler error into a user-facing message
//!
//! Message text is never logged; only ids and outcomes are.

use super::commands::{self, parse_callback, parse_command, Callback, Command};
use super::traits::*;
use crate::admin::{
    self, AdminError, AdminGuard, RestartSignal, Uptime, UserRegistry, RESTART_EXIT_CODE,
};
use crate::relay::{RelayEngine, RelayError};
use crate::verification::{VerificationEngine, VerificationError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Minimum gap between two `getUpdates` calls
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after a failed poll
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(2);

/// Errors surfaced at the handler boundary
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error("Telegram call failed: {0}")]
    Transport(#[from] TelegramError),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

impl DispatchError {
    /// Text shown to the user whose update failed
    pub fn user_message(&self) -> String {
        match self {
            DispatchError::Relay(RelayError::UnknownRecipient(_)) => {
                "❌ Unknown recipient. Choose one with /send".to_string()
            }
            DispatchError::Relay(RelayError::NoRecipientSelected) => {
                "❌ First choose a recipient with /send".to_string()
            }
            DispatchError::Relay(RelayError::NotARelayReply) => {
                "❌ That message cannot be answered".to_string()
            }
            DispatchError::Relay(RelayError::DeliveryFailed { target, .. }) => format!(
                "❌ Could not deliver the message to {}. They may have blocked the bot.",
                target
            ),
            DispatchError::Relay(RelayError::MessageTooLong { excess }) => format!(
                "❌ The message is {} character(s) too long. Shorten it and send it again.",
                excess
            ),
            DispatchError::Relay(RelayError::Correlation(_)) => {
                "⚠️ Could not prepare your message, please try again later".to_string()
            }
            DispatchError::Verification(VerificationError::TransientPlatformError(_)) => {
                "⚠️ Something went wrong while processing your request, please try again later"
                    .to_string()
            }
            DispatchError::Admin(AdminError::Unauthorized { .. }) => {
                "⛔️ You do not have permission to do this".to_string()
            }
            DispatchError::Transport(_) | DispatchError::Signal(_) => {
                "⚠️ Error processing your request, please try again later".to_string()
            }
        }
    }

    /// Errors the administrators should hear about
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            DispatchError::Transport(_)
                | DispatchError::Signal(_)
                | DispatchError::Relay(RelayError::Correlation(_))
        )
    }
}

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Interrupted (Ctrl-C)
    Shutdown,
    /// An administrator asked for a restart
    RestartRequested,
}

impl RunOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::Shutdown => 0,
            RunOutcome::RestartRequested => RESTART_EXIT_CODE,
        }
    }
}

/// Anonymous relay and join verification bot
pub struct VeilpostBot<C: BotApi> {
    client: C,
    relay: RelayEngine<C>,
    verification: Option<VerificationEngine<C>>,
    admins: AdminGuard,
    users: UserRegistry,
    restart: RestartSignal,
    uptime: Uptime,
    /// Where unexpected errors are reported
    report_chats: Vec<ChatId>,
}

impl<C: BotApi> VeilpostBot<C> {
    pub fn new(
        client: C,
        relay: RelayEngine<C>,
        verification: Option<VerificationEngine<C>>,
        admins: AdminGuard,
        report_chats: Vec<ChatId>,
    ) -> Self {
        Self {
            client,
            relay,
            verification,
            admins,
            users: UserRegistry::new(),
            restart: RestartSignal::new(),
            uptime: Uptime::start(),
            report_chats,
        }
    }

    pub fn relay(&self) -> &RelayEngine<C> {
        &self.relay
    }

    pub fn verification(&self) -> Option<&VerificationEngine<C>> {
        self.verification.as_ref()
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn restart_signal(&self) -> &RestartSignal {
        &self.restart
    }

    /// Main event loop
    ///
    /// Returns when Ctrl-C is received or an administrator requests a
    /// restart. Failures handling single updates never end the loop.
    pub async fn run(self: Arc<Self>) -> Result<RunOutcome, DispatchError> {
        info!(bot = %self.client.bot_id(), "bot started, polling for updates");

        let mut poll = tokio::time::interval(POLL_INTERVAL);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = self.restart.requested() => {
                    info!("restart requested, leaving event loop");
                    return Ok(RunOutcome::RestartRequested);
                }
                result = &mut shutdown => {
                    result.map_err(DispatchError::Signal)?;
                    info!("shutdown signal received");
                    return Ok(RunOutcome::Shutdown);
                }
                updates = self.poll_once(&mut poll) => {
                    for update in updates {
                        let bot = Arc::clone(&self);
                        tokio::spawn(async move {
                            bot.handle_update(update).await;
                        });
                    }
                }
            }
        }
    }

    async fn poll_once(&self, poll: &mut tokio::time::Interval) -> Vec<Update> {
        poll.tick().await;
        match self.client.receive_updates().await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "error receiving updates, will retry");
                tokio::time::sleep(POLL_ERROR_PAUSE).await;
                Vec::new()
            }
        }
    }

    /// Handle one update, rendering any error to the user involved
    pub async fn handle_update(&self, update: Update) {
        let reply_chat = match &update {
            Update::TextMessage { chat, .. } => Some(*chat),
            Update::CallbackSelection { from, .. } => Some(ChatId::from(*from)),
            Update::ChatMemberJoinRequest { .. } => None,
        };

        if let Err(e) = self.dispatch(update).await {
            self.report(reply_chat, &e).await;
        }
    }

    /// Route one update to its handler
    pub async fn dispatch(&self, update: Update) -> Result<(), DispatchError> {
        match update {
            Update::TextMessage {
                sender,
                chat,
                message_id,
                text,
                reply_to,
            } => {
                if chat != ChatId::from(sender) {
                    debug!(chat = %chat, "ignoring text outside a private chat");
                    return Ok(());
                }
                self.handle_text(sender, chat, message_id, &text, reply_to)
                    .await
            }
            Update::CallbackSelection {
                callback_id,
                from,
                origin,
                payload,
            } => {
                if let Err(e) = self.client.answer_callback(&callback_id).await {
                    debug!(error = %e, "could not acknowledge callback");
                }
                self.handle_callback(from, origin, &payload).await
            }
            Update::ChatMemberJoinRequest {
                channel,
                applicant,
                user_chat,
            } => match &self.verification {
                Some(verification) => {
                    let outcome = verification
                        .on_join_request(channel, applicant, user_chat)
                        .await?;
                    debug!(applicant = %applicant, ?outcome, "join request handled");
                    Ok(())
                }
                None => {
                    debug!(channel = %channel, "join verification disabled, ignoring request");
                    Ok(())
                }
            },
        }
    }

    async fn handle_text(
        &self,
        sender: UserId,
        chat: ChatId,
        message_id: MessageId,
        text: &str,
        reply_to: Option<RepliedMessage>,
    ) -> Result<(), DispatchError> {
        if let Some(command) = parse_command(text) {
            return self.handle_command(sender, chat, command).await;
        }

        if let Some(replied) = reply_to {
            match self.relay.relay_reply(sender, &replied, text).await {
                Ok(_) => {
                    self.client
                        .send_message(chat, commands::msg_reply_sent(), None)
                        .await?;
                    return Ok(());
                }
                Err(RelayError::NotARelayReply) => {}
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(verification) = &self.verification {
            if let Some(outcome) = verification.on_answer(sender, text).await? {
                debug!(applicant = %sender, ?outcome, "verification answer handled");
                return Ok(());
            }
        }

        self.relay.relay(sender, message_id, text).await?;
        self.client
            .send_message(chat, commands::msg_relayed(), None)
            .await?;
        Ok(())
    }

    async fn handle_command(
        &self,
        sender: UserId,
        chat: ChatId,
        command: Command,
    ) -> Result<(), DispatchError> {
        let is_admin = self.admins.is_admin(sender);
        if let Some(action) = command.privileged_action() {
            self.admins.authorize(sender, action)?;
        }

        match command {
            Command::Start => {
                if self.users.register(sender) {
                    info!(user = %sender, "new user registered");
                }
                self.client
                    .send_menu(chat, commands::welcome_text(), &commands::main_menu(is_admin))
                    .await?;
            }
            Command::Help => {
                self.client
                    .send_menu(chat, &commands::help_text(is_admin), &commands::help_menu())
                    .await?;
            }
            Command::Send => {
                self.client
                    .send_menu(
                        chat,
                        commands::msg_choose_recipient(),
                        &commands::recipient_menu(self.relay.directory()),
                    )
                    .await?;
            }
            Command::Status => {
                self.client
                    .send_message(chat, &self.status_text(is_admin), None)
                    .await?;
            }
            Command::Privacy => {
                self.client
                    .send_message(chat, commands::privacy_text(), None)
                    .await?;
            }
            Command::About => {
                self.client
                    .send_message(chat, &commands::about_text(), None)
                    .await?;
            }
            Command::Broadcast { text } => {
                if text.is_empty() {
                    self.client
                        .send_message(chat, commands::msg_broadcast_usage(), None)
                        .await?;
                    return Ok(());
                }
                let report = admin::broadcast(&self.client, &self.users, &text).await;
                self.client
                    .send_message(
                        chat,
                        &commands::msg_broadcast_done(report.delivered, report.failed),
                        None,
                    )
                    .await?;
            }
            Command::Restart => {
                info!(admin = %sender, "restart requested");
                self.client
                    .send_message(chat, commands::msg_restarting(), None)
                    .await?;
                self.restart.request();
            }
            Command::Unknown(name) => {
                debug!(command = %name, "unknown command");
                self.client
                    .send_message(chat, commands::msg_unknown_command(), None)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_callback(
        &self,
        from: UserId,
        origin: Option<(ChatId, MessageId)>,
        payload: &str,
    ) -> Result<(), DispatchError> {
        let callback = parse_callback(payload);
        let is_admin = self.admins.is_admin(from);

        if let Some(action) = callback.privileged_action() {
            self.admins.authorize(from, action)?;
        }

        match callback {
            Callback::MenuSend => {
                let menu = commands::recipient_menu(self.relay.directory());
                self.show(from, origin, commands::msg_choose_recipient(), Some(&menu))
                    .await?;
            }
            Callback::MenuHelp => {
                self.show(
                    from,
                    origin,
                    &commands::help_text(is_admin),
                    Some(&commands::help_menu()),
                )
                .await?;
            }
            Callback::MenuStatus => {
                self.show(from, origin, &self.status_text(is_admin), None)
                    .await?;
            }
            Callback::MenuMain => {
                self.show(
                    from,
                    origin,
                    commands::welcome_text(),
                    Some(&commands::main_menu(is_admin)),
                )
                .await?;
            }
            Callback::MenuAdmin => {
                self.show(
                    from,
                    origin,
                    "🛠 Admin panel\n\nChoose an action:",
                    Some(&commands::admin_menu()),
                )
                .await?;
            }
            Callback::AdminStats => {
                let pending = self
                    .verification
                    .as_ref()
                    .map(|v| v.sessions().active_count())
                    .unwrap_or(0);
                let text = commands::admin_stats_text(
                    &self.uptime.display(),
                    self.users.count(),
                    pending,
                    from,
                );
                self.show(from, origin, &text, Some(&commands::back_to_admin()))
                    .await?;
            }
            Callback::AdminBroadcast => {
                self.show(
                    from,
                    origin,
                    commands::msg_broadcast_usage(),
                    Some(&commands::back_to_admin()),
                )
                .await?;
            }
            Callback::AdminRestart => {
                info!(admin = %from, "restart requested from admin panel");
                self.show(from, origin, commands::msg_restarting(), None)
                    .await?;
                self.restart.request();
            }
            Callback::Target(label) => {
                let recipient = self.relay.select_recipient(from, &label)?;
                self.show(
                    from,
                    origin,
                    &commands::msg_recipient_selected(&recipient.display_name),
                    None,
                )
                .await?;
            }
            Callback::Unknown(payload) => {
                debug!(payload = %payload, "unknown callback payload");
            }
        }
        Ok(())
    }

    /// Replace the menu the button belonged to, or send a new message
    async fn show(
        &self,
        user: UserId,
        origin: Option<(ChatId, MessageId)>,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> TelegramResult<()> {
        match (origin, keyboard) {
            (Some((chat, message)), keyboard) => {
                self.client.edit_menu(chat, message, text, keyboard).await
            }
            (None, Some(keyboard)) => self
                .client
                .send_menu(ChatId::from(user), text, keyboard)
                .await
                .map(|_| ()),
            (None, None) => self
                .client
                .send_message(ChatId::from(user), text, None)
                .await
                .map(|_| ()),
        }
    }

    fn status_text(&self, is_admin: bool) -> String {
        commands::status_text(&self.uptime.display(), self.users.count(), is_admin)
    }

    async fn report(&self, chat: Option<ChatId>, error: &DispatchError) {
        warn!(error = %error, "error handling update");

        if let Some(chat) = chat {
            if let Err(e) = self
                .client
                .send_message(chat, &error.user_message(), None)
                .await
            {
                debug!(chat = %chat, error = %e, "could not report error to user");
            }
        }

        if error.is_unexpected() {
            let text = format!("⚠️ Unexpected error while handling an update: {}", error);
            for chat in &self.report_chats {
                if let Err(e) = self.client.send_message(*chat, &text, None).await {
                    debug!(chat = %chat, error = %e, "could not report error to admins");
                }
            }
        }
    }
}
