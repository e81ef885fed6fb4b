use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::attachment::Attachment;
use crate::config::Config;
use crate::controller::ConversationController;
use crate::events::Sender;
use crate::session::SessionStore;
use crate::storage::FileStore;
use crate::transport::HttpTransport;

pub fn open_session(config: &Config) -> Arc<SessionStore> {
    let backing = Arc::new(FileStore::new(config.storage_path()));
    Arc::new(SessionStore::new(backing))
}

/// Run a single exchange and print the reply
pub async fn send_message(config: &Config, message: &str, file: Option<PathBuf>) -> Result<()> {
    let session = open_session(config);
    let transport = HttpTransport::new(config).context("Failed to set up transport")?;

    let mut controller = ConversationController::new(session);
    controller
        .init_session()
        .context("Failed to load session id")?;

    if let Some(path) = file {
        let attachment = Attachment::from_path(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        if let Err(e) = controller.stage_attachment(attachment) {
            println!("❌ {}", e);
            return Ok(());
        }
    }

    if let Err(rejection) = controller.send(message, &transport).await {
        println!("❌ {}", rejection);
        return Ok(());
    }

    for entry in controller.transcript().messages() {
        if entry.sender == Sender::Bot {
            println!("{}", entry.text);
        }
    }

    Ok(())
}

/// Print the persisted session id, creating one if needed
pub fn show_session(config: &Config) -> Result<()> {
    let session = open_session(config);
    let id = session
        .get_or_create()
        .context("Failed to load session id")?;

    println!("🔑 Session: {}", id);
    println!("📍 Stored in: {}", config.storage_path().display());
    Ok(())
}

/// Write the current configuration to disk
pub fn init_config(config: &Config) -> Result<()> {
    let path = config.config_path();
    if path.exists() {
        println!("⚙️  Config already exists at {}", path.display());
        return Ok(());
    }

    config.save()?;
    println!("✨ Wrote {}", path.display());
    Ok(())
}
