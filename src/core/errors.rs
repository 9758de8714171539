//! Domain error types
//!
//! These errors represent chat-lifecycle failures, distinct from the typed
//! transport errors in `crate::llm`. Using thiserror for ergonomic error
//! handling with proper Display implementations.

use thiserror::Error;

/// Errors surfaced by the thread engine's operations
#[derive(Debug, Error)]
pub enum ChatError {
    /// A previous turn failed and `prevent_send` is still set; the caller
    /// must clear it (enable_send) before submitting again.
    #[error("sending is blocked until the previous error is cleared")]
    SendBlocked,

    /// Transport failure (wraps the typed transport error as text)
    #[error("transport error: {0}")]
    Transport(String),

    /// History store failure
    #[error("history error: {0}")]
    History(String),

    /// Other error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Errors from the chat history collaborator
#[derive(Debug, Error)]
pub enum HistoryError {
    /// No saved chat with this id
    #[error("chat not found: {0}")]
    NotFound(String),

    /// Storage error (wraps infrastructure errors)
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for HistoryError {
    fn from(err: std::io::Error) -> Self {
        HistoryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Storage(err.to_string())
    }
}

impl From<HistoryError> for ChatError {
    fn from(err: HistoryError) -> Self {
        ChatError::History(err.to_string())
    }
}
