//! Wire payload types for the model response stream
//!
//! Each `data:` frame body is one of:
//! - an OpenAI-style delta batch: `{"choices":[{"delta":{...}}]}`
//! - a server-echoed user or context-file message: `{"role":"...","content":"..."}`
//! - an error record carrying a `detail` field
//!
//! Parsing fails closed: anything unrecognized decodes to an empty delta
//! batch so one bad frame never kills the stream.

use serde::Deserialize;

/// One parsed frame payload
#[derive(Debug, Clone)]
pub enum ChatResponse {
    /// Assistant delta batch
    Choices(ChoicesResponse),
    /// Server-echoed user or context-file message
    User(UserMessageResponse),
}

impl ChatResponse {
    /// Parse one frame payload, substituting an empty delta batch when the
    /// body is not recognizable. Lenient on purpose: the backend is allowed
    /// to interleave frames this client version does not know about.
    pub fn parse_or_empty(payload: &str) -> ChatResponse {
        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("unparseable stream payload, substituting empty delta: {}", err);
                return Self::empty();
            }
        };

        if value.get("choices").is_some() {
            match serde_json::from_value::<ChoicesResponse>(value) {
                Ok(choices) => ChatResponse::Choices(choices),
                Err(err) => {
                    tracing::warn!("malformed delta batch, substituting empty delta: {}", err);
                    Self::empty()
                }
            }
        } else if value.get("role").is_some() {
            match serde_json::from_value::<UserMessageResponse>(value) {
                Ok(user) => ChatResponse::User(user),
                Err(err) => {
                    tracing::warn!("malformed user-message payload, substituting empty delta: {}", err);
                    Self::empty()
                }
            }
        } else {
            Self::empty()
        }
    }

    pub fn empty() -> ChatResponse {
        ChatResponse::Choices(ChoicesResponse {
            choices: Vec::new(),
        })
    }

    pub fn is_user_message(&self) -> bool {
        matches!(self, ChatResponse::User(_))
    }
}

/// A batch of assistant deltas
#[derive(Debug, Clone, Deserialize)]
pub struct ChoicesResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One incremental fragment of a streaming assistant turn
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallFragment>>,
}

/// A tool-call fragment; fragments sharing an index belong to one call
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: FunctionFragment,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionFragment {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// A user or context-file message echoed back by the server
///
/// For `context_file` the content is itself a JSON string holding the file
/// list; the merger decodes it defensively.
#[derive(Debug, Clone, Deserialize)]
pub struct UserMessageResponse {
    pub role: String,
    pub content: String,
}

/// Extract the error text of a `detail`-carrying payload, if any
pub fn extract_detail(payload: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(payload).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
