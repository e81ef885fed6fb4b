use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::open_session;
use crate::config::Config;
use crate::controller::ConversationController;
use crate::transport::HttpTransport;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use crate::ui::tui::{self, EventHandler, TuiEvent};

/// Run the interactive chat until the user quits
pub async fn run(config: Config) -> Result<()> {
    let transport = HttpTransport::new(&config).context("Failed to set up transport")?;
    info!(url = transport.url(), "starting interactive chat");

    let mut controller = ConversationController::new(open_session(&config));
    if let Err(e) = controller.init_session() {
        // The controller keeps rejecting submissions and shows a notice.
        warn!(error = %e, "starting without a session");
    }

    let mut manager = ConversationManager::new(
        controller,
        Arc::new(transport),
        config.ui.show_session_id,
    );

    tui::install_panic_hook();
    let mut terminal = tui::init().context("Failed to initialize terminal")?;
    let mut events = EventHandler::new();

    let result = async {
        loop {
            terminal.draw(|frame| manager.render(frame))?;

            match events.next().await {
                Some(TuiEvent::Key(key)) => {
                    if manager.handle_key(key).await? == ConversationAction::Exit {
                        break;
                    }
                }
                Some(TuiEvent::Tick) => manager.on_tick(),
                Some(TuiEvent::Resize) => {}
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    info!("interactive chat closed");
    result
}
