//! The exchange state machine.
//!
//! A submission moves the controller from `Idle` (or `Error`) to `Pending`.
//! The user's message is recorded before anything leaves the process, so a
//! failed exchange only ever adds a bot-side error entry. The work done while
//! pending lives in [`PendingExchange`], which owns everything it needs and
//! can run on another task while the UI keeps accepting input.

use crate::attachment::{Attachment, AttachmentReader, MimeCategory};
use crate::error::ChatError;
use crate::events::{Message, Transcript};
use crate::session::SessionStore;
use crate::transport::{ChatTransport, ExchangePayload, ExchangeReply};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const READ_ERROR_TEXT: &str = "Sorry, I couldn't read the attached file.";
pub const CONNECTION_ERROR_TEXT: &str =
    "Sorry, I'm having trouble connecting right now. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Pending,
    /// The last exchange failed. Behaves like `Idle` for new submissions.
    Error,
}

/// Why a submission was not accepted. The transcript is untouched in every case.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejection {
    #[error("Type a message or attach a file first")]
    Empty,
    #[error("Session is not ready yet")]
    SessionUnavailable,
    #[error("Please wait for the current reply")]
    AlreadyPending,
}

/// Result of running a [`PendingExchange`]
#[derive(Debug)]
pub enum ExchangeOutcome {
    Replied(ExchangeReply),
    /// The attachment could not be read; nothing was sent
    ReadFailed(ChatError),
    /// Transport or protocol failure
    SendFailed(ChatError),
}

/// Everything one in-flight exchange needs, detached from the controller.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    text: String,
    session_id: String,
    attachment: Option<Attachment>,
}

impl PendingExchange {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Read the attachment (if any), then send the payload. Never retries.
    pub async fn run(
        self,
        reader: &AttachmentReader,
        transport: &dyn ChatTransport,
    ) -> ExchangeOutcome {
        let (file_content, file_mime_type) = match &self.attachment {
            Some(attachment) => match reader.read(attachment).await {
                Ok(content) => (Some(content), Some(attachment.mime_type.clone())),
                Err(e) => {
                    warn!(error = %e, "attachment read failed, exchange aborted");
                    return ExchangeOutcome::ReadFailed(e);
                }
            },
            None => (None, None),
        };

        let payload = ExchangePayload {
            message: self.text,
            session_id: self.session_id,
            file_content,
            file_mime_type,
        };

        match transport.send(&payload).await {
            Ok(reply) => ExchangeOutcome::Replied(reply),
            Err(e) => {
                warn!(error = %e, status = ?e.status(), "exchange failed");
                ExchangeOutcome::SendFailed(e)
            }
        }
    }
}

/// Owns the transcript, the pending flag, the input buffer and the single
/// staged-attachment slot.
pub struct ConversationController {
    session: Arc<SessionStore>,
    reader: AttachmentReader,
    transcript: Transcript,
    state: ExchangeState,
    staged: Option<Attachment>,
    input: String,
    notice: Option<String>,
}

impl ConversationController {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self {
            session,
            reader: AttachmentReader::new(),
            transcript: Transcript::new(),
            state: ExchangeState::Idle,
            staged: None,
            input: String::new(),
            notice: None,
        }
    }

    /// Load or create the session id. Submissions are rejected until this succeeds.
    pub fn init_session(&mut self) -> Result<String, ChatError> {
        match self.session.get_or_create() {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!(error = %e, "could not obtain a session id");
                self.notice = Some("Could not start a chat session".to_string());
                Err(e)
            }
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == ExchangeState::Pending
    }

    pub fn session_id(&self) -> Option<String> {
        self.session.current()
    }

    pub fn staged_attachment(&self) -> Option<&Attachment> {
        self.staged.as_ref()
    }

    pub fn reader(&self) -> &AttachmentReader {
        &self.reader
    }

    #[allow(dead_code)]
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Transient message for the status line; never part of the transcript.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = Some(notice.into());
    }

    /// Stage a file for the next submission, replacing any previous one.
    /// Unsupported types are discarded with a notice and leave the slot alone.
    pub fn stage_attachment(&mut self, attachment: Attachment) -> Result<(), ChatError> {
        if self.is_pending() {
            let err = ChatError::validation("Wait for the current reply before attaching a file");
            self.notice = Some(err.to_string());
            return Err(err);
        }

        if self.reader.validate(&attachment.mime_type) == MimeCategory::Unsupported {
            debug!(mime = %attachment.mime_type, "rejected attachment");
            let err = ChatError::validation(format!(
                "Unsupported file type ({}). Only PNG, JPEG and plain text files can be attached.",
                attachment.mime_type
            ));
            self.notice = Some(err.to_string());
            return Err(err);
        }

        self.notice = Some(format!("Attached {}", attachment.name));
        self.staged = Some(attachment);
        Ok(())
    }

    /// Drop the staged attachment, if any.
    pub fn remove_attachment(&mut self) -> Option<Attachment> {
        self.staged.take()
    }

    /// Submit whatever is in the input buffer.
    pub fn submit_input(&mut self) -> Result<PendingExchange, SubmitRejection> {
        let text = self.input.clone();
        self.submit(&text)
    }

    /// Validate and record a submission, entering `Pending`.
    ///
    /// The returned exchange must be run and its outcome handed to
    /// [`ConversationController::finish`] to get back to `Idle`.
    pub fn submit(&mut self, text: &str) -> Result<PendingExchange, SubmitRejection> {
        let rejection = if self.is_pending() {
            Some(SubmitRejection::AlreadyPending)
        } else if text.trim().is_empty() && self.staged.is_none() {
            Some(SubmitRejection::Empty)
        } else if self.session.current().is_none() {
            Some(SubmitRejection::SessionUnavailable)
        } else {
            None
        };
        if let Some(rejection) = rejection {
            debug!(?rejection, "submission rejected");
            if rejection != SubmitRejection::Empty {
                self.notice = Some(rejection.to_string());
            }
            return Err(rejection);
        }

        let session_id = self
            .session
            .current()
            .ok_or(SubmitRejection::SessionUnavailable)?;
        let text = text.trim().to_string();
        let attachment = self.staged.take();

        let shown = match (&attachment, text.is_empty()) {
            (Some(file), true) => file.placeholder(),
            _ => text.clone(),
        };
        self.transcript.push(Message::user(shown));
        self.input.clear();
        self.notice = None;
        self.state = ExchangeState::Pending;

        info!(
            session_id = %session_id,
            attachment = attachment.as_ref().map(|a| a.name.as_str()),
            "exchange started"
        );

        Ok(PendingExchange {
            text,
            session_id,
            attachment,
        })
    }

    /// Apply the outcome of a pending exchange and leave `Pending`.
    pub fn finish(&mut self, outcome: ExchangeOutcome) {
        // The attachment moved into the exchange; nothing may stay staged.
        self.staged = None;

        match outcome {
            ExchangeOutcome::Replied(reply) => {
                self.transcript.push(Message::bot(reply.response_text));
                if self.session.current().as_deref() != Some(reply.session_id.as_str()) {
                    if let Err(e) = self.session.rotate(&reply.session_id) {
                        warn!(error = %e, "failed to rotate session");
                    }
                }
                self.state = ExchangeState::Idle;
                info!("exchange completed");
            }
            ExchangeOutcome::ReadFailed(e) => {
                debug!(error = %e, "recording read failure");
                self.transcript.push(Message::bot(READ_ERROR_TEXT));
                self.state = ExchangeState::Error;
            }
            ExchangeOutcome::SendFailed(e) => {
                debug!(error = %e, remote = e.is_remote(), "recording send failure");
                self.transcript.push(Message::bot(CONNECTION_ERROR_TEXT));
                self.state = ExchangeState::Error;
            }
        }
    }

    /// Submit, run and finish one exchange in place.
    pub async fn send(
        &mut self,
        text: &str,
        transport: &dyn ChatTransport,
    ) -> Result<(), SubmitRejection> {
        let exchange = self.submit(text)?;
        let outcome = exchange.run(&self.reader, transport).await;
        self.finish(outcome);
        Ok(())
    }
}
