//! Engine notifications
//!
//! Async events sent from the engine to the front end over an injected
//! mpsc channel, so embedders observe turn progress without polling and
//! without any shared global bus. State itself is read through the store's
//! selectors; these events only say *when* to look.

use crate::core::ToolCall;
use tokio::sync::mpsc::UnboundedSender;

/// Events emitted by the engine while a turn is in flight
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A request was issued for the thread
    QuestionAsked { thread_id: String },

    /// A response payload was merged; selectors reflect the new content
    ResponseMerged { thread_id: String },

    /// The stream settled (success, failure, and abort alike)
    StreamDone { thread_id: String },

    /// The turn failed; the store carries the error text too
    StreamError { thread_id: String, message: String },

    /// The active thread was replaced (new chat or restore)
    ThreadReplaced { thread_id: String },

    /// The turn ended in unexecuted tool calls; the engine is about to
    /// auto-continue
    ToolCallsPending {
        thread_id: String,
        calls: Vec<ToolCall>,
    },
}

/// Sender half handed to the engine at construction
pub type EventSender = UnboundedSender<ChatEvent>;
