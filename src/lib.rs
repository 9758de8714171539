//! ripple: streaming chat-thread engine for AI coding assistant front ends
//!
//! This library provides:
//! - An SSE decoder turning model response bytes into discrete frames
//! - A merger folding streamed deltas into structured chat messages
//! - A pure-reducer thread store with caching of backgrounded threads
//! - An async orchestrator with submit/retry/abort and automatic
//!   tool-call continuation
//! - A reqwest transport for the assistant daemon and JSON-file history

pub mod chat;
pub mod config;
pub mod core;
pub mod history;
pub mod llm;

pub use chat::{ChatAction, ChatEngine, ChatEvent, ChatState, ChatStore, ToolResolver};
pub use config::Config;
pub use history::{ChatHistory, FileHistory, MemoryHistory};
pub use llm::{ChatRequest, ChatTransport, HttpTransport, TransportError};
// `crate::` needed here: a bare `core::` path would hit the built-in crate
pub use crate::core::{ChatError, ChatMessage, ChatThread, ToolCall, ToolDefinition};
