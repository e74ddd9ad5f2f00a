//! Verification Engine
//!
//! ```text
//! NoRecord ──join request──► Pending ──correct answer──► Approved
//!                              │  ▲                          (record removed)
//!                              │  └── wrong answer, attempts left
//!                              └──── last wrong answer / challenge undeliverable ──► Declined
//!                                                                   (record removed)
//! ```
//!
//! A failed approve/decline call leaves the record as it was. The applicant
//! and the administrators are told, and a human can step in.
//!
//! Only one answer per applicant can reach approve/decline at a time; answers
//! arriving meanwhile get a "please wait" reply and change nothing.

use super::challenge::ChallengeSpec;
use super::session::{DecisionClaim, FailedAttempt, PendingApplicant, VerificationSessionStore};
use crate::telegram::traits::{BotApi, ChatId, TelegramError, UserId};
use tracing::{debug, info, warn};

/// Gate configuration
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    /// Channel whose join requests are gated
    pub channel: ChatId,
    /// Where administrator notifications go
    pub admin_chats: Vec<ChatId>,
    /// Challenge assigned to every new applicant
    pub challenge: ChallengeSpec,
}

/// What happened to a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Request for a chat this bot does not gate
    Ignored,
    /// Applicant already has a pending challenge; nothing changed
    AlreadyPending,
    /// Challenge delivered; applicant is pending
    ChallengeSent,
    /// Challenge could not be delivered; request declined
    DeclinedUnreachable,
}

/// What happened to an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Join request approved; `attempts` wrong answers preceded it
    Approved { attempts: u32 },
    /// Wrong answer; applicant stays pending
    Retry { attempts: u32, remaining: u32 },
    /// Attempts exhausted; join request declined
    Declined { attempts: u32 },
    /// An earlier answer is still being decided; this one was ignored
    Deciding,
}

/// Verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Platform call failed, please try again later: {0}")]
    TransientPlatformError(#[source] TelegramError),
}

/// Join verification state machine
pub struct VerificationEngine<C: BotApi> {
    client: C,
    sessions: VerificationSessionStore,
    policy: VerificationPolicy,
}

impl<C: BotApi> VerificationEngine<C> {
    pub fn new(client: C, sessions: VerificationSessionStore, policy: VerificationPolicy) -> Self {
        Self {
            client,
            sessions,
            policy,
        }
    }

    pub fn sessions(&self) -> &VerificationSessionStore {
        &self.sessions
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Start verification for a join request to the gated channel
    pub async fn on_join_request(
        &self,
        channel: ChatId,
        applicant: UserId,
        user_chat: ChatId,
    ) -> Result<JoinOutcome, VerificationError> {
        if channel != self.policy.channel {
            return Ok(JoinOutcome::Ignored);
        }

        if !self
            .sessions
            .create(applicant, user_chat, self.policy.challenge.clone())
        {
            info!(applicant = %applicant, "join request already pending");
            return Ok(JoinOutcome::AlreadyPending);
        }
        info!(applicant = %applicant, channel = %channel, "join request pending verification");

        let prompt = msg_challenge(&self.policy.challenge.prompt, self.sessions.max_attempts());
        if let Err(e) = self.client.send_message(user_chat, &prompt, None).await {
            warn!(applicant = %applicant, error = %e, "challenge undeliverable, declining");
            self.sessions.remove(applicant);

            let admin_note = match self.client.decline_join_request(channel, applicant).await {
                Ok(()) => msg_admin_unreachable(applicant),
                Err(decline_err) => {
                    warn!(applicant = %applicant, error = %decline_err, "decline failed");
                    msg_admin_platform_error(applicant, &decline_err)
                }
            };
            self.notify_admins(&admin_note).await;
            return Ok(JoinOutcome::DeclinedUnreachable);
        }

        self.notify_admins(&msg_admin_new_request(applicant)).await;
        Ok(JoinOutcome::ChallengeSent)
    }

    /// Check an applicant's answer.
    ///
    /// `Ok(None)` means the user has no pending challenge and the text should
    /// be handled as an ordinary message.
    pub async fn on_answer(
        &self,
        applicant: UserId,
        answer: &str,
    ) -> Result<Option<AnswerOutcome>, VerificationError> {
        let Some(pending) = self.sessions.get(applicant) else {
            return Ok(None);
        };

        if pending.challenge.validate(answer) {
            return match self.sessions.begin_decision(applicant) {
                None => Ok(None),
                Some(DecisionClaim::Deciding) => Ok(Some(self.still_deciding(&pending).await)),
                Some(DecisionClaim::Claimed(pending)) => {
                    self.conclude(&pending, true).await?;
                    info!(
                        applicant = %applicant,
                        attempts = pending.attempts,
                        "applicant approved"
                    );

                    self.tell(pending.user_chat, msg_approved()).await;
                    self.notify_admins(&msg_admin_approved(applicant)).await;
                    Ok(Some(AnswerOutcome::Approved {
                        attempts: pending.attempts,
                    }))
                }
            };
        }

        match self.sessions.register_failure(applicant) {
            None => Ok(None),
            Some(FailedAttempt::Deciding) => Ok(Some(self.still_deciding(&pending).await)),
            Some(FailedAttempt::Retry {
                attempts,
                remaining,
            }) => {
                info!(applicant = %applicant, attempts, "wrong answer");
                self.tell(pending.user_chat, &msg_wrong_answer(remaining))
                    .await;
                Ok(Some(AnswerOutcome::Retry {
                    attempts,
                    remaining,
                }))
            }
            Some(FailedAttempt::Exhausted { attempts }) => {
                self.conclude(&pending, false).await?;
                info!(applicant = %applicant, attempts, "applicant declined");

                self.tell(pending.user_chat, msg_declined()).await;
                self.notify_admins(&msg_admin_declined(applicant)).await;
                Ok(Some(AnswerOutcome::Declined { attempts }))
            }
        }
    }

    /// Carry out a claimed decision. The record is removed on success and
    /// released unchanged on failure.
    async fn conclude(
        &self,
        pending: &PendingApplicant,
        approve: bool,
    ) -> Result<(), VerificationError> {
        match self.decide(pending.applicant, approve).await {
            Ok(()) => {
                self.sessions.remove(pending.applicant);
                Ok(())
            }
            Err(e) => {
                self.sessions.abandon_decision(pending.applicant);
                Err(e)
            }
        }
    }

    async fn still_deciding(&self, pending: &PendingApplicant) -> AnswerOutcome {
        debug!(applicant = %pending.applicant, "answer arrived while a decision is in flight");
        self.tell(pending.user_chat, msg_decision_in_progress()).await;
        AnswerOutcome::Deciding
    }

    /// Approve or decline. On failure the admins are told and state is left alone.
    async fn decide(&self, applicant: UserId, approve: bool) -> Result<(), VerificationError> {
        let channel = self.policy.channel;
        let result = if approve {
            self.client.approve_join_request(channel, applicant).await
        } else {
            self.client.decline_join_request(channel, applicant).await
        };

        if let Err(e) = result {
            warn!(applicant = %applicant, approve, error = %e, "join decision failed");
            self.notify_admins(&msg_admin_platform_error(applicant, &e))
                .await;
            return Err(VerificationError::TransientPlatformError(e));
        }
        Ok(())
    }

    async fn tell(&self, chat: ChatId, text: &str) {
        if let Err(e) = self.client.send_message(chat, text, None).await {
            warn!(chat = %chat, error = %e, "could not notify applicant");
        }
    }

    /// Best-effort message to every administrator chat
    pub async fn notify_admins(&self, text: &str) {
        for chat in &self.policy.admin_chats {
            if let Err(e) = self.client.send_message(*chat, text, None).await {
                warn!(chat = %chat, error = %e, "could not notify administrator");
            }
        }
    }
}

// ============================================================================
// Message Templates
// ============================================================================

pub fn msg_challenge(prompt: &str, max_attempts: u32) -> String {
    format!(
        "👋 Your request to join the channel needs a quick check.\n\n\
         {}\n\n\
         Reply with your answer. You have {} attempt(s).",
        prompt, max_attempts
    )
}

pub fn msg_wrong_answer(remaining: u32) -> String {
    format!("❌ Wrong answer. Attempts left: {}", remaining)
}

pub fn msg_approved() -> &'static str {
    "✅ Correct! Your join request has been approved. Welcome!"
}

pub fn msg_declined() -> &'static str {
    "⛔️ Out of attempts. Your join request has been declined."
}

pub fn msg_decision_in_progress() -> &'static str {
    "⏳ Your answer is being processed, please wait."
}

pub fn msg_admin_new_request(applicant: UserId) -> String {
    format!("🆕 Join request from user {}: challenge sent.", applicant)
}

pub fn msg_admin_approved(applicant: UserId) -> String {
    format!("✅ User {} passed the check and was approved.", applicant)
}

pub fn msg_admin_declined(applicant: UserId) -> String {
    format!("⛔️ User {} failed the check and was declined.", applicant)
}

pub fn msg_admin_unreachable(applicant: UserId) -> String {
    format!(
        "⚠️ User {} could not be sent the challenge (no private chat with the bot). \
         Join request declined.",
        applicant
    )
}

pub fn msg_admin_platform_error(applicant: UserId, error: &TelegramError) -> String {
    format!(
        "⚠️ Join request of user {} needs attention: {}",
        applicant, error
    )
}
