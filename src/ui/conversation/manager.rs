use crate::attachment::Attachment;
use crate::controller::{ConversationController, ExchangeOutcome, ExchangeState, PendingExchange};
use crate::error::ChatError;
use crate::transport::ChatTransport;
use crate::ui::conversation::{
    get_help_text, Composer, ComposerResult, ParsedCommand, SlashCommand, TranscriptView,
};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

const SPINNER: [&str; 4] = ["⠋", "⠙", "⠸", "⠴"];

/// Actions that can be requested by the conversation manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    Exit,
}

/// Glues the controller to the terminal: keys in, frames out. Exchanges run
/// on a spawned task and report back through a channel.
pub struct ConversationManager {
    controller: ConversationController,
    composer: Composer,
    transport: Arc<dyn ChatTransport>,
    outcome_rx: Option<mpsc::UnboundedReceiver<ExchangeOutcome>>,
    scroll_back: u16,
    spinner_frame: usize,
    show_session_id: bool,
}

impl ConversationManager {
    pub fn new(
        controller: ConversationController,
        transport: Arc<dyn ChatTransport>,
        show_session_id: bool,
    ) -> Self {
        Self {
            controller,
            composer: Composer::new("Type your message…"),
            transport,
            outcome_rx: None,
            scroll_back: 0,
            spinner_frame: 0,
            show_session_id,
        }
    }

    pub fn controller(&self) -> &ConversationController {
        &self.controller
    }

    /// Handle key input
    pub async fn handle_key(&mut self, key: KeyEvent) -> Result<ConversationAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(ConversationAction::Exit);
        }

        match key.code {
            KeyCode::PageUp => {
                self.scroll_back = self.scroll_back.saturating_add(5);
                return Ok(ConversationAction::None);
            }
            KeyCode::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(5);
                return Ok(ConversationAction::None);
            }
            _ => {}
        }

        let result = self.composer.handle_key(key);
        self.controller.set_input(self.composer.content());

        match result {
            ComposerResult::Submitted(_) => {
                self.submit();
                Ok(ConversationAction::None)
            }
            ComposerResult::Command(command) => self.handle_slash_command(command).await,
            ComposerResult::None => Ok(ConversationAction::None),
        }
    }

    /// Called on every tick: advance the spinner and collect finished exchanges
    pub fn on_tick(&mut self) {
        if self.controller.is_pending() {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER.len();
        }
        self.poll_exchange();
    }

    fn submit(&mut self) {
        // On rejection the controller has already set a notice where one is useful.
        if let Ok(exchange) = self.controller.submit_input() {
            self.composer.clear();
            self.scroll_back = 0;
            self.spawn_exchange(exchange);
        }
    }

    fn spawn_exchange(&mut self, exchange: PendingExchange) {
        debug!(
            session_id = exchange.session_id(),
            attachment = exchange.attachment().map(|a| a.name.as_str()),
            "spawning exchange"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let transport = self.transport.clone();
        let reader = *self.controller.reader();

        tokio::spawn(async move {
            let outcome = exchange.run(&reader, transport.as_ref()).await;
            let _ = tx.send(outcome);
        });

        self.outcome_rx = Some(rx);
    }

    /// Apply the outcome of the in-flight exchange, if it has arrived
    pub fn poll_exchange(&mut self) {
        let Some(rx) = self.outcome_rx.as_mut() else {
            return;
        };

        match rx.try_recv() {
            Ok(outcome) => {
                self.controller.finish(outcome);
                self.outcome_rx = None;
            }
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => {
                error!("exchange task ended without reporting an outcome");
                self.controller.finish(ExchangeOutcome::SendFailed(ChatError::transport(
                    "exchange task ended unexpectedly",
                    None,
                )));
                self.outcome_rx = None;
            }
        }
    }

    /// Handle slash commands
    async fn handle_slash_command(&mut self, command: ParsedCommand) -> Result<ConversationAction> {
        if self.controller.is_pending() && !command.command.available_while_pending() {
            self.controller
                .set_notice(format!("/{} is unavailable while waiting for a reply", command.command.command()));
            return Ok(ConversationAction::None);
        }

        match command.command {
            SlashCommand::Attach => {
                let Some(path) = command.argument() else {
                    self.controller.set_notice("Usage: /attach <path>");
                    return Ok(ConversationAction::None);
                };
                let path = expand_home(path);
                match Attachment::from_path(&path).await {
                    // A rejection leaves its own notice.
                    Ok(attachment) => {
                        let _ = self.controller.stage_attachment(attachment);
                    }
                    Err(e) => self.controller.set_notice(e.to_string()),
                }
            }
            SlashCommand::Detach => match self.controller.remove_attachment() {
                Some(attachment) => self
                    .controller
                    .set_notice(format!("Removed {}", attachment.name)),
                None => self.controller.set_notice("No file attached"),
            },
            SlashCommand::Session => {
                let notice = match self.controller.session_id() {
                    Some(id) => format!("Session: {}", id),
                    None => "No session yet".to_string(),
                };
                self.controller.set_notice(notice);
            }
            SlashCommand::Help => {
                self.controller.set_notice(get_help_text().replace('\n', "  "));
            }
            SlashCommand::Quit => return Ok(ConversationAction::Exit),
        }

        Ok(ConversationAction::None)
    }

    /// Render the conversation UI components
    pub fn render(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),    // Transcript
                Constraint::Length(1), // Status line
                Constraint::Length(3), // Composer
            ])
            .split(frame.size());

        let view = TranscriptView::new(self.controller.transcript().messages())
            .pending(self.controller.is_pending())
            .scroll_back(self.scroll_back);
        frame.render_widget(view, chunks[0]);
        frame.render_widget(Paragraph::new(self.status_line()), chunks[1]);
        frame.render_widget(&self.composer, chunks[2]);
    }

    fn status_line(&self) -> Line<'static> {
        let mut spans = Vec::new();

        match self.controller.state() {
            ExchangeState::Pending => spans.push(Span::styled(
                format!("{} waiting for reply  ", SPINNER[self.spinner_frame]),
                Style::default().fg(Color::Yellow),
            )),
            ExchangeState::Error => spans.push(Span::styled(
                "⚠ last message failed  ",
                Style::default().fg(Color::Red),
            )),
            ExchangeState::Idle => {}
        }
        if let Some(attachment) = self.controller.staged_attachment() {
            spans.push(Span::styled(
                format!("📎 {} ({} bytes)  ", attachment.name, attachment.size_bytes),
                Style::default().fg(Color::Magenta),
            ));
        }
        if let Some(notice) = self.controller.notice() {
            spans.push(Span::styled(
                format!("{}  ", notice),
                Style::default().fg(Color::LightBlue),
            ));
        }
        if self.show_session_id {
            if let Some(id) = self.controller.session_id() {
                spans.push(Span::styled(id, Style::default().fg(Color::DarkGray)));
            }
        }

        Line::from(spans)
    }
}

fn expand_home(path: &str) -> std::path::PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| std::path::PathBuf::from(path)),
        None => std::path::PathBuf::from(path),
    }
}
