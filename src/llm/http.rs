//! HTTP transport for the assistant daemon's chat endpoint

use super::{ByteStream, ChatRequest, ChatTransport, TransportError};
use async_trait::async_trait;
use futures::StreamExt;

const CHAT_URL: &str = "/v1/chat";

/// reqwest-backed transport POSTing to the daemon's `/v1/chat` endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Build with a preconfigured client (timeouts, proxies, etc.)
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, TransportError> {
        let url = format!("{}{}", self.base_url, CHAT_URL);
        tracing::debug!(model = %request.model, messages = request.messages.len(), "opening chat stream");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(TransportError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TransportError::from_http_status(status, error_text));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from_network_error));

        Ok(stream.boxed())
    }
}
