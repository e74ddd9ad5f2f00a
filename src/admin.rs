//! Administration
//!
//! Allow-list checks for privileged operations, the registry of users who
//! started the bot, broadcast, supervisor restart signalling and uptime.

use crate::telegram::traits::{BotApi, ChatId, UserId};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{info, warn};

/// Exit code asking the process supervisor to start the bot again
pub const RESTART_EXIT_CODE: i32 = 75;

/// Operations only administrators may perform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivilegedAction {
    Broadcast,
    Restart,
    AdminPanel,
}

impl fmt::Display for PrivilegedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrivilegedAction::Broadcast => "broadcast",
            PrivilegedAction::Restart => "restart",
            PrivilegedAction::AdminPanel => "admin panel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    #[error("User {user} is not allowed to use {action}")]
    Unauthorized {
        user: UserId,
        action: PrivilegedAction,
    },
}

/// Fixed set of administrator ids, injected from configuration
#[derive(Debug, Clone, Default)]
pub struct AdminGuard {
    admins: HashSet<UserId>,
}

impl AdminGuard {
    pub fn new(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    pub fn is_empty(&self) -> bool {
        self.admins.is_empty()
    }

    /// Check `user` before performing `action`
    pub fn authorize(&self, user: UserId, action: PrivilegedAction) -> Result<(), AdminError> {
        if self.is_admin(user) {
            Ok(())
        } else {
            warn!(user = %user, action = %action, "unauthorized privileged request");
            Err(AdminError::Unauthorized { user, action })
        }
    }

    /// Private chats of every administrator, sorted for stable output
    pub fn admin_chats(&self) -> Vec<ChatId> {
        let mut chats: Vec<ChatId> = self.admins.iter().map(|id| ChatId::from(*id)).collect();
        chats.sort_by_key(|chat| chat.0);
        chats
    }
}

/// Users who have started the bot (volatile)
#[derive(Debug, Clone, Default)]
pub struct UserRegistry {
    users: Arc<Mutex<HashSet<UserId>>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> MutexGuard<'_, HashSet<UserId>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` for a user not seen before
    pub fn register(&self, user: UserId) -> bool {
        self.users().insert(user)
    }

    pub fn count(&self) -> usize {
        self.users().len()
    }

    pub fn snapshot(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.users().iter().copied().collect();
        users.sort_by_key(|user| user.0);
        users
    }
}

/// Outcome of a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Send `text` to every registered user, one at a time
pub async fn broadcast<C: BotApi>(
    client: &C,
    registry: &UserRegistry,
    text: &str,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for user in registry.snapshot() {
        match client.send_message(ChatId::from(user), text, None).await {
            Ok(_) => report.delivered += 1,
            Err(e) => {
                warn!(user = %user, error = %e, "broadcast delivery failed");
                report.failed += 1;
            }
        }
    }

    info!(
        delivered = report.delivered,
        failed = report.failed,
        "broadcast finished"
    );
    report
}

/// One-shot request for a supervisor-level restart
#[derive(Debug, Clone, Default)]
pub struct RestartSignal {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl RestartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if nobody is waiting yet
        self.notify.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolve once `request` has been called
    pub async fn requested(&self) {
        if self.is_requested() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Process start time
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    started: Instant,
}

impl Uptime {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in whole seconds, e.g. "1h 2m 3s"
    pub fn display(&self) -> String {
        format_uptime(self.elapsed())
    }
}

pub fn format_uptime(elapsed: Duration) -> String {
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}
