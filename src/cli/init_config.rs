use super::config::{default_config_path, VeilpostConfig};
use std::path::PathBuf;

/// Write a commented default configuration file
pub fn execute(path: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = path.map(PathBuf::from).unwrap_or_else(default_config_path);

    if path.exists() && !force {
        return Err(format!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    VeilpostConfig::create_default(&path)?;

    println!("📝 Created: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set the recipient and admin user ids");
    println!("  2. Provide the bot token (--token-file or VEILPOST_BOT_TOKEN)");
    println!("  3. Start the bot: veilpost run --config {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_config_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("veilpost").join("config.toml");

        execute(Some(path.to_string_lossy().to_string()), false).unwrap();

        assert!(VeilpostConfig::load(&path).is_ok());
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "# hand-edited\n").unwrap();

        assert!(execute(Some(path.to_string_lossy().to_string()), false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hand-edited\n");

        execute(Some(path.to_string_lossy().to_string()), true).unwrap();
        assert!(VeilpostConfig::load(&path).is_ok());
    }
}
