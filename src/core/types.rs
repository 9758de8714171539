//! Canonical type definitions for the chat domain
//!
//! This module contains the single source of truth for types used across
//! multiple modules (store, merge, transport, history) to prevent type drift.
//!
//! All other modules should `pub use` these types rather than defining their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message in a conversation thread, tagged by role on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    /// Result of a tool call. `tool_call_id` must reference a call id
    /// emitted by the immediately preceding assistant message.
    Tool {
        content: String,
        tool_call_id: String,
    },
    /// Files the server attached when expanding a user query
    ContextFile {
        content: Vec<ContextFile>,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Wire-format role string
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
            Self::ContextFile { .. } => "context_file",
        }
    }

    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant { .. })
    }

    /// Tool calls carried by an assistant message, if any
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        match self {
            Self::Assistant {
                tool_calls: Some(calls),
                ..
            } => Some(calls),
            _ => None,
        }
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: ToolFunction,
}

/// Function name and raw argument text of a tool call
///
/// Arguments stay a string: they stream in as fragments and are only
/// valid JSON once the turn is complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    pub arguments: String,
}

/// Definition of a tool advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A file attached to the conversation by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFile {
    pub file_name: String,
    pub file_content: String,
    pub line1: usize,
    pub line2: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usefulness: Option<f64>,
}

/// One conversation with a stable id and ordered message list
///
/// The id is generated once at creation and never changes; it is the
/// correlation key for every asynchronous event belonging to the thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChatThread {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            model: String::new(),
            title: String::new(),
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

impl Default for ChatThread {
    fn default() -> Self {
        Self::new()
    }
}
