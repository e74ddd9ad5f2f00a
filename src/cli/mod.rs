use clap::{Parser, Subcommand};

pub mod config;
pub mod init_config;
pub mod run;
pub mod token;
pub mod version;

#[derive(Parser)]
#[command(name = "veilpost")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Anonymous relay and join verification bot for Telegram", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot service
    Run {
        /// Path to config file (default: ~/.config/veilpost/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Path to file containing the bot token (container-native)
        #[arg(long)]
        token_file: Option<String>,
    },

    /// Write a commented default config file
    InitConfig {
        /// Where to write it (default: ~/.config/veilpost/config.toml)
        #[arg(long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

/// Run the selected command, returning the process exit code
pub async fn execute(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { config, token_file } => run::execute(config, token_file).await,
        Commands::InitConfig { path, force } => {
            init_config::execute(path, force)?;
            Ok(0)
        }
        Commands::Version => {
            version::execute();
            Ok(0)
        }
    }
}
