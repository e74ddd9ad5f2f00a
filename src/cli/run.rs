use super::config::{default_config_path, LoggingConfig, VeilpostConfig};
use super::token::{determine_token_source, read_token};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use veilpost::relay::{CorrelationKey, RelayEngine, RelaySessionStore};
use veilpost::telegram::{HttpBotClient, VeilpostBot};
use veilpost::verification::{VerificationEngine, VerificationSessionStore};

/// Run the bot service
///
/// Loads the configuration, connects to the Bot API and handles updates
/// until Ctrl-C or an administrator's `/restart`.
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. Default config at `~/.config/veilpost/config.toml`
///
/// Create one with `veilpost init-config`.
///
/// ## Token Loading
///
/// 1. `--token-file` flag if provided
/// 2. `VEILPOST_BOT_TOKEN` environment variable
/// 3. `[telegram] token_file`
/// 4. `[telegram] token`
///
/// Returns the process exit code: 0 after Ctrl-C, 75 when a restart was
/// requested and the supervisor should start the bot again.
pub async fn execute(
    config_path: Option<String>,
    token_file: Option<String>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        return Err(format!(
            "Config file not found: {}\nCreate one with: veilpost init-config",
            config_path.display()
        )
        .into());
    }

    let config = VeilpostConfig::load(&config_path)?;
    let directory = config.relay.directory()?;
    let poll_timeout = config.telegram.poll_timeout()?;
    let verification_policy = config.verification_policy()?;

    let source = determine_token_source(token_file, &config.telegram)?;
    let token = read_token(source, &config.telegram)?;

    init_logging(&config.logging)?;
    info!(config = %config_path.display(), "configuration loaded");

    let key = match &config.relay.correlation_secret {
        Some(secret) => CorrelationKey::derive(secret.as_bytes())?,
        None => CorrelationKey::derive(token.as_bytes())?,
    };

    let client = HttpBotClient::connect(&token, &config.telegram.api_base, poll_timeout).await?;
    drop(token);

    let admins = config.admin.guard();
    if admins.is_empty() {
        warn!("no administrators configured; admin commands are disabled");
    }

    let relay = RelayEngine::new(
        client.clone(),
        Arc::new(directory),
        RelaySessionStore::new(),
        key,
    );

    let verification = verification_policy.map(|(policy, max_attempts)| {
        info!(channel = %policy.channel, max_attempts, "join verification enabled");
        VerificationEngine::new(
            client.clone(),
            VerificationSessionStore::new(max_attempts),
            policy,
        )
    });

    let bot = Arc::new(VeilpostBot::new(
        client,
        relay,
        verification,
        admins,
        config.admin_chats(),
    ));

    let outcome = bot.run().await?;
    info!(?outcome, "bot stopped");

    Ok(outcome.exit_code())
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `[logging] level`.
fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| format!("Invalid log level '{}': {}", logging.level, e))?;

    let registry = tracing_subscriber::registry().with(filter);

    match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create log directory: {}", e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;

            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()?;
        }
        None => registry.with(fmt::layer()).try_init()?,
    }

    Ok(())
}
