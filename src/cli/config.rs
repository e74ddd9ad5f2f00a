//! Veilpost configuration file handling
//!
//! Provides default configuration generation and loading for the bot.
//! Configuration files are TOML, by default at
//! `~/.config/veilpost/config.toml`.
//!
//! Everything the bot keeps at runtime (selections, pending applicants,
//! registered users) is volatile; this file is the only persistent input.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use veilpost::admin::AdminGuard;
use veilpost::relay::{DirectoryError, Recipient, RecipientDirectory};
use veilpost::telegram::client::DEFAULT_API_BASE;
use veilpost::telegram::{ChatId, UserId};
use veilpost::verification::{
    ChallengeConfig, ChallengeError, ChallengeSpec, VerificationPolicy, DEFAULT_MAX_ATTEMPTS,
};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default long-poll timeout
const DEFAULT_POLL_TIMEOUT: &str = "30s";

/// Veilpost bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeilpostConfig {
    /// Bot API connection
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Anonymous relay recipients
    pub relay: RelayConfig,

    /// Administrator allow-list
    #[serde(default)]
    pub admin: AdminConfig,

    /// Join verification (disabled when absent)
    pub verification: Option<VerificationConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token inline (prefer `token_file` or the environment)
    pub token: Option<String>,

    /// File holding the bot token
    pub token_file: Option<PathBuf>,

    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Long-poll timeout, humantime syntax ("30s", "1m")
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout: String,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Secret for sealing reply references (defaults to the bot token).
    ///
    /// Changing it orphans replies to messages relayed before the change.
    pub correlation_secret: Option<String>,

    pub recipients: Vec<RecipientConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientConfig {
    /// Short label used in button payloads
    pub label: String,
    /// Name shown to senders
    pub name: String,
    /// Telegram user id
    pub id: UserId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub users: Vec<UserId>,
}

/// Join verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Gated channel
    pub channel_id: ChatId,

    /// Administrator channel for notifications; admins' private chats if absent
    pub admin_chat_id: Option<ChatId>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub challenge: ChallengeConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_poll_timeout() -> String {
    DEFAULT_POLL_TIMEOUT.to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            token_file: None,
            api_base: default_api_base(),
            poll_timeout: default_poll_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl TelegramConfig {
    pub fn poll_timeout(&self) -> Result<Duration, Box<dyn std::error::Error>> {
        humantime::parse_duration(&self.poll_timeout).map_err(|e| {
            format!("Invalid poll_timeout '{}': {}", self.poll_timeout, e).into()
        })
    }
}

impl RelayConfig {
    pub fn directory(&self) -> Result<RecipientDirectory, DirectoryError> {
        RecipientDirectory::new(
            self.recipients
                .iter()
                .map(|r| Recipient {
                    label: r.label.clone(),
                    display_name: r.name.clone(),
                    id: r.id,
                })
                .collect(),
        )
    }
}

impl AdminConfig {
    pub fn guard(&self) -> AdminGuard {
        AdminGuard::new(self.users.iter().copied())
    }
}

impl VeilpostConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: VeilpostConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Where administrator notifications and unexpected errors go
    pub fn admin_chats(&self) -> Vec<ChatId> {
        match self.verification.as_ref().and_then(|v| v.admin_chat_id) {
            Some(chat) => vec![chat],
            None => self.admin.guard().admin_chats(),
        }
    }

    /// Verification policy, if join verification is enabled
    pub fn verification_policy(
        &self,
    ) -> Result<Option<(VerificationPolicy, u32)>, ChallengeError> {
        let Some(v) = &self.verification else {
            return Ok(None);
        };

        let policy = VerificationPolicy {
            channel: v.channel_id,
            admin_chats: self.admin_chats(),
            challenge: ChallengeSpec::try_from(&v.challenge)?,
        };
        Ok(Some((policy, v.max_attempts)))
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# Veilpost Bot Configuration
#
# Runtime state (recipient selections, pending join checks, registered users)
# lives in memory only and is lost on restart.

[telegram]
# Bot token. Precedence: --token-file flag, VEILPOST_BOT_TOKEN env var,
# token_file below, token below.
# token_file = "/run/secrets/veilpost-token"
# token = "123456:ABC..."

# Bot API base URL
api_base = "{api_base}"

# Long-poll timeout for getUpdates
poll_timeout = "{poll_timeout}"

[relay]
# Secret sealing the reply reference inside relayed messages.
# Defaults to the bot token. Changing it breaks replies to older messages.
# correlation_secret = "..."

[[relay.recipients]]
label = "head"
name = "Head"
id = 0

[[relay.recipients]]
label = "deputy"
name = "Deputy"
id = 0

[admin]
# Telegram user ids allowed to /broadcast, /restart and open the admin panel
users = []

# Join verification for a channel with join requests enabled.
# Remove the section to disable it.
# [verification]
# channel_id = -1001234567890
# admin_chat_id = -1009876543210
# max_attempts = {max_attempts}
#
# [verification.challenge]
# kind = "arithmetic"    # or "word" (with word = "..."), or "free-text"
# left = 2
# right = 2

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/veilpost/veilpost.log"
"#,
            api_base = DEFAULT_API_BASE,
            poll_timeout = DEFAULT_POLL_TIMEOUT,
            max_attempts = DEFAULT_MAX_ATTEMPTS,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("veilpost")
        .join("config.toml")
}
