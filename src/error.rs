//! Error types shared by the exchange core.

use thiserror::Error;

/// Every way an exchange (or one of its collaborators) can fail.
///
/// Only `Validation` is reported back to the user verbatim, as a transient
/// notice. The other variants are logged and replaced by a fixed bot message.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Unsupported attachment type, empty submission and similar input problems
    #[error("{0}")]
    Validation(String),

    /// The staged attachment could not be read
    #[error("Failed to read attachment '{path}': {message}")]
    Read { path: String, message: String },

    /// Network failure or non-success status from the chat service
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// Response body did not have the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Persistent key-value storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    pub fn read(path: impl Into<String>, message: impl Into<String>) -> Self {
        ChatError::Read {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        ChatError::Transport {
            message: message.into(),
            status,
        }
    }

    /// HTTP status of a transport failure, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the failure happened on the way to or from the chat service.
    pub fn is_remote(&self) -> bool {
        matches!(self, ChatError::Transport { .. } | ChatError::Protocol(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        ChatError::transport(e.to_string(), status)
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
