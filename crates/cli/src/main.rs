//! meshbridge CLI: the main entry point.
//!
//! Commands:
//! - `listen`: Answer text messages arriving from the radio bridge
//! - `monitor`: Print text messages on a channel without answering
//! - `models`: List the models the configured backend offers
//! - `chat`: Talk to the configured model from the terminal
//! - `config`: Print the default, effective or path of the configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "meshbridge",
    about = "meshbridge: answer mesh radio text messages with a language model",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.meshbridge/config.toml)
    #[arg(long, global = true, env = "MESHBRIDGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer text messages from the radio bridge on stdin
    Listen {
        /// Channel index to answer on, -1 for all channels
        #[arg(short, long, allow_negative_numbers = true)]
        channel: Option<i64>,
    },

    /// Print incoming text messages without answering
    Monitor {
        /// Channel index to watch, -1 for all channels
        #[arg(short, long, allow_negative_numbers = true)]
        channel: Option<i64>,
    },

    /// List the models the configured backend offers
    Models,

    /// Chat with the configured model from the terminal
    Chat {
        /// Send the radio system prompt with every message
        #[arg(long)]
        with_system_prompt: bool,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: Option<commands::config_cmd::ConfigAction>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the stdio transport
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Listen { channel } => {
            let config = commands::load_config(config_path, channel)?;
            commands::listen::run(config).await?
        }
        Commands::Monitor { channel } => {
            let config = commands::load_config(config_path, channel)?;
            commands::monitor::run(config).await?
        }
        Commands::Models => {
            let config = commands::load_config(config_path, None)?;
            commands::models::run(config).await?
        }
        Commands::Chat { with_system_prompt } => {
            let config = commands::load_config(config_path, None)?;
            commands::chat::run(config, with_system_prompt).await?
        }
        Commands::Config { action } => commands::config_cmd::run(action, config_path)?,
    }

    Ok(())
}
