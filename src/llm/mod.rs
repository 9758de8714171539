//! Model-invocation transport
//!
//! The engine only requires a byte stream in the SSE framing of
//! [`SseDecoder`]; everything about how that stream is obtained lives
//! behind the [`ChatTransport`] trait so tests can script turns and
//! alternative backends can be plugged in.

mod error;
mod http;
mod sse;

pub use error::TransportError;
pub use http::HttpTransport;
pub use sse::{SseDecoder, StreamFrame};

use crate::core::{ChatMessage, ToolDefinition};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

/// Raw response byte stream; chunks arrive in order for one request
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Outbound model-invocation request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    pub stream: bool,
}

/// Trait for opening a streaming model invocation
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open the response stream for one request
    ///
    /// Returns an error for request-level failures (connection refused,
    /// non-OK HTTP status). Failures after the stream is open surface as
    /// `Err` items on the stream itself.
    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, TransportError>;
}
