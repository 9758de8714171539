//! Server-Sent Events decoding for the model response stream
//!
//! Buffers incoming bytes and extracts complete `data:` frames, handling
//! events split across chunks, multiple events in one chunk, and a final
//! event without a trailing newline.

/// One decoded frame of the response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Frame body to be parsed as a response payload
    Delta(String),
    /// `[DONE]` sentinel: the turn completed
    Done,
    /// `[ERROR]` sentinel: the server aborted the turn
    Error,
}

/// Buffered SSE decoder
///
/// # Example
/// ```
/// use ripple_chat::llm::{SseDecoder, StreamFrame};
///
/// let mut decoder = SseDecoder::new();
///
/// let frames = decoder.push(b"data: {\"choices\":[]}\n\n");
/// assert_eq!(frames, vec![StreamFrame::Delta("{\"choices\":[]}".to_string())]);
///
/// // Split event stays buffered until completed
/// assert!(decoder.push(b"data: [DO").is_empty());
/// assert_eq!(decoder.push(b"NE]\n"), vec![StreamFrame::Done]);
/// ```
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push incoming bytes and extract complete frames
    ///
    /// Incomplete events remain buffered for the next `push()` or `finish()`.
    /// Non-empty lines without the `data:` prefix are malformed: they are
    /// logged and skipped, never fatal.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        // Lossy UTF-8 conversion for robustness
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut frames = Vec::new();

        // Process complete lines (ending in \n); blank lines are event separators
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim().to_string();
            self.buffer = self.buffer[newline_pos + 1..].to_string();

            if line.is_empty() {
                continue;
            }

            match Self::classify(&line) {
                Some(frame) => frames.push(frame),
                None => tracing::warn!("unexpected data in streaming buffer: {}", line),
            }
        }

        frames
    }

    /// Flush any remaining buffered content
    ///
    /// Call this when the byte stream ends to extract a final event that
    /// arrived without a trailing newline.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();

        for line in self.buffer.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match Self::classify(line) {
                Some(frame) => frames.push(frame),
                None => tracing::warn!("unexpected data in streaming buffer: {}", line),
            }
        }

        self.buffer.clear();

        frames
    }

    fn classify(line: &str) -> Option<StreamFrame> {
        let payload = line.strip_prefix("data:")?.trim();
        Some(match payload {
            "[DONE]" => StreamFrame::Done,
            "[ERROR]" => StreamFrame::Error,
            _ => StreamFrame::Delta(payload.to_string()),
        })
    }
}
