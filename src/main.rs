mod attachment;
mod commands;
mod config;
mod controller;
mod error;
mod events;
mod session;
mod storage;
mod transport;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "chatterbox")]
#[command(version)]
#[command(about = "Chat with a remote bot from your terminal", long_about = None)]
struct Cli {
    /// Override the chat service base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Send {
        message: String,
        /// Attach a PNG, JPEG or plain text file
        #[arg(long, short)]
        file: Option<PathBuf>,
    },
    /// Show the persisted session id
    Session,
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config.toml
    Init,
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.home).context("Failed to create .chatterbox directory")?;
    let log_file = fs::File::create(config.log_path()).context("Failed to create log file")?;

    let filter =
        EnvFilter::try_from_env("CHATTERBOX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.set_base_url(url);
    }
    init_logging(&config)?;

    match cli.command {
        None => ui::app::run(config).await,
        Some(Commands::Send { message, file }) => {
            commands::send_message(&config, &message, file).await
        }
        Some(Commands::Session) => commands::show_session(&config),
        Some(Commands::Config {
            action: ConfigAction::Init,
        }) => commands::init_config(&config),
    }
}
