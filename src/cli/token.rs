use super::config::TelegramConfig;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Environment variable holding the bot token
pub const TOKEN_ENV_VAR: &str = "VEILPOST_BOT_TOKEN";

/// Places the bot token can come from, checked in order
#[derive(Debug, PartialEq, Eq)]
pub enum TokenSource {
    /// From --token-file or `[telegram] token_file` (container-native)
    File(PathBuf),
    /// From VEILPOST_BOT_TOKEN
    EnvVar,
    /// From `[telegram] token` (warned as insecure)
    Config,
}

/// Determine the token source
///
/// 1. `--token-file` flag
/// 2. VEILPOST_BOT_TOKEN env var
/// 3. `[telegram] token_file`
/// 4. `[telegram] token`
pub fn determine_token_source(
    token_file: Option<String>,
    config: &TelegramConfig,
) -> Result<TokenSource, Box<dyn std::error::Error>> {
    select_token_source(token_file, std::env::var_os(TOKEN_ENV_VAR).is_some(), config)
}

fn select_token_source(
    token_file: Option<String>,
    env_set: bool,
    config: &TelegramConfig,
) -> Result<TokenSource, Box<dyn std::error::Error>> {
    if let Some(file) = token_file {
        Ok(TokenSource::File(PathBuf::from(file)))
    } else if env_set {
        Ok(TokenSource::EnvVar)
    } else if let Some(file) = &config.token_file {
        Ok(TokenSource::File(file.clone()))
    } else if config.token.is_some() {
        Ok(TokenSource::Config)
    } else {
        Err(format!(
            "No bot token configured. Use --token-file, set {}, or add token_file to [telegram]",
            TOKEN_ENV_VAR
        )
        .into())
    }
}

/// Read the bot token; the returned buffer is wiped on drop
pub fn read_token(
    source: TokenSource,
    config: &TelegramConfig,
) -> Result<Zeroizing<String>, Box<dyn std::error::Error>> {
    let token = match source {
        TokenSource::File(path) => read_token_file(&path)?,
        TokenSource::EnvVar => Zeroizing::new(
            std::env::var(TOKEN_ENV_VAR)
                .map_err(|_| format!("{} env var not set", TOKEN_ENV_VAR))?
                .trim()
                .to_string(),
        ),
        TokenSource::Config => {
            eprintln!("⚠️  WARNING: bot token is stored in the config file");
            eprintln!("   Consider token_file or {} instead", TOKEN_ENV_VAR);
            eprintln!();
            Zeroizing::new(config.token.clone().unwrap_or_default().trim().to_string())
        }
    };

    validate_token(&token)?;
    Ok(token)
}

fn read_token_file(path: &Path) -> Result<Zeroizing<String>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Token file not found: {}", path.display()).into());
    }

    let contents = Zeroizing::new(
        fs::read_to_string(path).map_err(|e| format!("Failed to read token file: {}", e))?,
    );
    Ok(Zeroizing::new(contents.trim().to_string()))
}

/// Bot tokens look like `<bot id>:<secret>`
fn validate_token(token: &str) -> Result<(), Box<dyn std::error::Error>> {
    if token.is_empty() {
        return Err("Bot token is empty".into());
    }
    match token.split_once(':') {
        Some((id, secret)) if !secret.is_empty() && id.parse::<u64>().is_ok() => Ok(()),
        _ => Err("Bot token is malformed (expected '<bot id>:<secret>')".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_TOKEN: &str = "123456:ABC-def_ghi";

    fn config_with(token: Option<&str>, token_file: Option<PathBuf>) -> TelegramConfig {
        TelegramConfig {
            token: token.map(str::to_string),
            token_file,
            ..TelegramConfig::default()
        }
    }

    #[test]
    fn test_flag_wins() {
        let config = config_with(Some(TEST_TOKEN), Some(PathBuf::from("/etc/token")));

        let source = select_token_source(Some("/tmp/flag".to_string()), true, &config).unwrap();
        assert_eq!(source, TokenSource::File(PathBuf::from("/tmp/flag")));
    }

    #[test]
    fn test_env_before_config() {
        let config = config_with(Some(TEST_TOKEN), Some(PathBuf::from("/etc/token")));

        assert_eq!(
            select_token_source(None, true, &config).unwrap(),
            TokenSource::EnvVar
        );
    }

    #[test]
    fn test_config_file_before_inline_token() {
        let config = config_with(Some(TEST_TOKEN), Some(PathBuf::from("/etc/token")));
        assert_eq!(
            select_token_source(None, false, &config).unwrap(),
            TokenSource::File(PathBuf::from("/etc/token"))
        );

        let config = config_with(Some(TEST_TOKEN), None);
        assert_eq!(
            select_token_source(None, false, &config).unwrap(),
            TokenSource::Config
        );
    }

    #[test]
    fn test_no_token_anywhere() {
        let config = config_with(None, None);
        let err = select_token_source(None, false, &config).unwrap_err();
        assert!(err.to_string().contains(TOKEN_ENV_VAR));
    }

    #[test]
    fn test_read_token_file_trims() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token");
        fs::write(&path, format!("  {}\n", TEST_TOKEN)).unwrap();

        let token = read_token(TokenSource::File(path), &config_with(None, None)).unwrap();
        assert_eq!(token.as_str(), TEST_TOKEN);
    }

    #[test]
    fn test_missing_token_file() {
        let result = read_token(
            TokenSource::File(PathBuf::from("/nonexistent/veilpost/token")),
            &config_with(None, None),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        assert!(validate_token(TEST_TOKEN).is_ok());
        assert!(validate_token("").is_err());
        assert!(validate_token("no-colon").is_err());
        assert!(validate_token("abc:secret").is_err());
        assert!(validate_token("123:").is_err());
    }

    #[test]
    fn test_inline_config_token() {
        let token = read_token(TokenSource::Config, &config_with(Some(TEST_TOKEN), None)).unwrap();
        assert_eq!(token.as_str(), TEST_TOKEN);
    }
}
