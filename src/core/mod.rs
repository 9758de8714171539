//! Core domain model: message and thread types plus domain errors

pub mod errors;
pub mod types;

pub use errors::{ChatError, HistoryError};
pub use types::{ChatMessage, ChatThread, ContextFile, ToolCall, ToolDefinition, ToolFunction};
