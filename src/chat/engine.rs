//! Stream orchestrator
//!
//! Owns the request lifecycle for the active thread: composes outgoing
//! messages, opens the transport stream, drives bytes through the decoder
//! and dispatches every decoded payload into the store, then inspects the
//! settled state for unexecuted tool calls and auto-continues the turn.
//!
//! Per engine there is at most one open stream; issuing a new send aborts
//! the previous one through its cancellation token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::chat::events::{ChatEvent, EventSender};
use crate::chat::response::{extract_detail, ChatResponse};
use crate::chat::store::{ChatAction, ChatStore};
use crate::core::{ChatError, ChatMessage, ToolCall, ToolDefinition};
use crate::history::ChatHistory;
use crate::llm::{ChatRequest, ChatTransport, SseDecoder, StreamFrame, TransportError};

/// Supplies tool-result messages for calls the model requested
///
/// The front end implements this to actually run tools. When absent (or
/// when it returns nothing) the engine resends the unchanged message list,
/// which retries until the calls are resolved or the continuation bound is
/// reached.
#[async_trait::async_trait]
pub trait ToolResolver: Send + Sync {
    async fn resolve(&self, calls: &[ToolCall]) -> Vec<ChatMessage>;
}

enum TurnProgress {
    Continue,
    Finished,
}

struct CancelSlot {
    seq: u64,
    token: CancellationToken,
}

/// The async control loop that drives one conversation thread
pub struct ChatEngine {
    store: Arc<ChatStore>,
    transport: Arc<dyn ChatTransport>,
    history: Arc<dyn ChatHistory>,
    tool_resolver: Option<Arc<dyn ToolResolver>>,
    tools: Vec<ToolDefinition>,
    events: Option<EventSender>,
    cancel: Mutex<Option<CancelSlot>>,
    send_seq: AtomicU64,
    max_auto_continuations: usize,
}

impl ChatEngine {
    pub fn new(
        store: Arc<ChatStore>,
        transport: Arc<dyn ChatTransport>,
        history: Arc<dyn ChatHistory>,
    ) -> Self {
        Self {
            store,
            transport,
            history,
            tool_resolver: None,
            tools: Vec::new(),
            events: None,
            cancel: Mutex::new(None),
            send_seq: AtomicU64::new(0),
            max_auto_continuations: 10,
        }
    }

    /// Attach the notification channel
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Attach the collaborator that executes tool calls
    pub fn with_tool_resolver(mut self, resolver: Arc<dyn ToolResolver>) -> Self {
        self.tool_resolver = Some(resolver);
        self
    }

    /// Set the tool definitions advertised on outgoing requests
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Bound the retry-until-resolved continuation loop
    pub fn with_max_auto_continuations(mut self, max: usize) -> Self {
        self.max_auto_continuations = max;
        self
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    /// Submit a user question on the active thread
    ///
    /// Rejected while `prevent_send` is set: a failed turn must be
    /// acknowledged (`enable_send`) before the next manual submit.
    pub async fn submit(&self, question: &str) -> Result<(), ChatError> {
        let snapshot = self.store.snapshot();
        if snapshot.prevent_send {
            return Err(ChatError::SendBlocked);
        }

        let mut messages = snapshot.thread.messages;
        if messages.is_empty() {
            if let Some(prompt) = &snapshot.system_prompt {
                messages.push(ChatMessage::system(prompt.clone()));
            }
        }
        messages.push(ChatMessage::user(question));

        self.send_messages(messages).await
    }

    /// Re-send an edited message list (the retry path)
    pub async fn retry(&self, messages: Vec<ChatMessage>) -> Result<(), ChatError> {
        self.send_messages(messages).await
    }

    /// Abort the in-flight request, if any. Idempotent: cancelling twice or
    /// with nothing in flight is a no-op.
    pub fn abort(&self) {
        let slot = self.cancel.lock().unwrap();
        if let Some(active) = slot.as_ref() {
            active.token.cancel();
        }
    }

    /// Park the active thread (if streaming) and start a fresh one
    pub fn new_chat(&self) {
        let id = self.store.thread_id();
        self.store.dispatch(ChatAction::NewChat { id });
        self.emit(ChatEvent::ThreadReplaced {
            thread_id: self.store.thread_id(),
        });
    }

    /// Replace the active thread with one restored from the cache or history
    ///
    /// A parked thread wins over its saved copy (it may hold deltas that
    /// arrived after the last save) and leaves the cache on restore.
    pub fn restore_chat(&self, id: &str) -> Result<(), ChatError> {
        let thread = match self.store.cached_thread(id) {
            Some(thread) => {
                self.store.dispatch(ChatAction::RemoveFromCache {
                    id: id.to_string(),
                });
                thread
            }
            None => self.history.restore_chat(id)?,
        };
        let active = self.store.thread_id();
        self.store.dispatch(ChatAction::RestoreChat {
            id: active,
            thread,
        });
        self.emit(ChatEvent::ThreadReplaced {
            thread_id: self.store.thread_id(),
        });
        Ok(())
    }

    /// Clear the prevent-send gate after a failed turn
    pub fn enable_send(&self) {
        let id = self.store.thread_id();
        self.store.dispatch(ChatAction::EnableSend { id });
    }

    pub fn set_model(&self, model: impl Into<String>) {
        let id = self.store.thread_id();
        self.store.dispatch(ChatAction::SetModel {
            id,
            model: model.into(),
        });
    }

    pub fn set_system_prompt(&self, prompt: Option<String>) {
        self.store.dispatch(ChatAction::SetSystemPrompt { prompt });
    }

    pub fn set_use_tools(&self, enabled: bool) {
        self.store.dispatch(ChatAction::SetUseTools { enabled });
    }

    /// Send a full message list and drive the turn to a settled state,
    /// following up on tool calls until the thread no longer ends in one
    async fn send_messages(&self, messages: Vec<ChatMessage>) -> Result<(), ChatError> {
        let mut outgoing = messages;
        let mut continuations = 0usize;

        loop {
            self.send_once(outgoing.clone()).await;

            let state = self.store.snapshot();
            if state.streaming || state.error.is_some() || state.prevent_send {
                break;
            }
            let Some(calls) = pending_tool_calls(&state.thread.messages) else {
                break;
            };
            if continuations >= self.max_auto_continuations {
                tracing::warn!(
                    "stopping after {} automatic continuations with tool calls still unresolved",
                    continuations
                );
                break;
            }
            continuations += 1;

            self.emit(ChatEvent::ToolCallsPending {
                thread_id: state.thread.id.clone(),
                calls: calls.clone(),
            });

            let mut next = state.thread.messages;
            if let Some(resolver) = &self.tool_resolver {
                next.extend(resolver.resolve(&calls).await);
            }
            outgoing = next;
        }

        Ok(())
    }

    /// One request lifecycle: backup, ask, stream, settle
    async fn send_once(&self, messages: Vec<ChatMessage>) {
        let snapshot = self.store.snapshot();
        let thread_id = snapshot.thread.id.clone();
        let model = snapshot.thread.model.clone();

        // Replace any outstanding request before opening a new stream
        let token = CancellationToken::new();
        let seq = self.send_seq.fetch_add(1, Ordering::SeqCst);
        {
            let mut slot = self.cancel.lock().unwrap();
            if let Some(previous) = slot.take() {
                previous.token.cancel();
            }
            *slot = Some(CancelSlot {
                seq,
                token: token.clone(),
            });
        }

        self.store.dispatch(ChatAction::BackUpMessages {
            id: thread_id.clone(),
            messages: messages.clone(),
        });
        self.store.dispatch(ChatAction::AskedQuestion {
            id: thread_id.clone(),
        });
        self.emit(ChatEvent::QuestionAsked {
            thread_id: thread_id.clone(),
        });

        let tools = if snapshot.use_tools && !self.tools.is_empty() {
            Some(self.tools.clone())
        } else {
            None
        };
        let request = ChatRequest {
            messages,
            model,
            tools,
            stream: true,
        };

        let result = self.stream_turn(&thread_id, request, &token).await;

        if let Err(err) = result {
            let message = err.to_string();
            tracing::warn!(thread = %thread_id, "turn failed: {}", message);
            self.store.dispatch(ChatAction::Error {
                id: thread_id.clone(),
                message: message.clone(),
            });
            self.emit(ChatEvent::StreamError {
                thread_id: thread_id.clone(),
                message,
            });
        }

        // done must always fire, error or not, to release the streaming flag
        self.store.dispatch(ChatAction::DoneStreaming {
            id: thread_id.clone(),
        });
        self.emit(ChatEvent::StreamDone {
            thread_id: thread_id.clone(),
        });

        // Clear the handle on settle unless a newer send already took over
        {
            let mut slot = self.cancel.lock().unwrap();
            if slot.as_ref().map(|s| s.seq) == Some(seq) {
                *slot = None;
            }
        }

        self.save_thread(&thread_id);
    }

    /// Consume one response stream, dispatching every decoded payload
    ///
    /// Cancellation is re-checked after every chunk read so a straggling
    /// chunk from an aborted stream never reaches the store.
    async fn stream_turn(
        &self,
        thread_id: &str,
        request: ChatRequest,
        token: &CancellationToken,
    ) -> Result<(), TransportError> {
        let mut stream = self.transport.open_stream(request).await?;
        let mut decoder = SseDecoder::new();

        loop {
            let chunk = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let bytes = chunk?;
            if token.is_cancelled() {
                return Ok(());
            }

            for frame in decoder.push(&bytes) {
                if let TurnProgress::Finished = self.handle_frame(thread_id, frame)? {
                    return Ok(());
                }
            }
        }

        // The stream closed without a [DONE]; flush whatever is buffered
        for frame in decoder.finish() {
            if let TurnProgress::Finished = self.handle_frame(thread_id, frame)? {
                return Ok(());
            }
        }

        Ok(())
    }

    fn handle_frame(
        &self,
        thread_id: &str,
        frame: StreamFrame,
    ) -> Result<TurnProgress, TransportError> {
        match frame {
            StreamFrame::Done => Ok(TurnProgress::Finished),
            StreamFrame::Error => Err(TransportError::Upstream(
                "stream aborted by server".to_string(),
            )),
            StreamFrame::Delta(payload) => {
                if let Some(detail) = extract_detail(&payload) {
                    return Err(TransportError::Upstream(detail));
                }
                self.store.dispatch(ChatAction::Response {
                    id: thread_id.to_string(),
                    payload: ChatResponse::parse_or_empty(&payload),
                });
                self.emit(ChatEvent::ResponseMerged {
                    thread_id: thread_id.to_string(),
                });
                Ok(TurnProgress::Continue)
            }
        }
    }

    /// Persist the thread the settled request belonged to, wherever it
    /// lives now (it may have been parked mid-stream). Best effort: the
    /// thread stays in memory if the save fails.
    fn save_thread(&self, thread_id: &str) {
        let state = self.store.snapshot();
        let thread = if state.thread.id == thread_id {
            Some(&state.thread)
        } else {
            state.cache.get(thread_id)
        };
        if let Some(thread) = thread {
            if let Err(err) = self.history.save_chat(thread) {
                tracing::warn!(thread = %thread_id, "failed to save chat: {}", err);
            }
        }
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(events) = &self.events {
            // The receiver may be gone during shutdown; that is fine
            let _ = events.send(event);
        }
    }
}

/// Tool calls of the trailing assistant message, if the thread ends in one
fn pending_tool_calls(messages: &[ChatMessage]) -> Option<Vec<ToolCall>> {
    match messages.last() {
        Some(message) => match message.tool_calls() {
            Some(calls) if !calls.is_empty() => Some(calls.to_vec()),
            _ => None,
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolFunction;

    #[test]
    fn test_pending_tool_calls_requires_trailing_assistant() {
        assert!(pending_tool_calls(&[]).is_none());
        assert!(pending_tool_calls(&[ChatMessage::user("hi")]).is_none());
        assert!(pending_tool_calls(&[ChatMessage::assistant("plain")]).is_none());

        let with_calls = vec![ChatMessage::Assistant {
            content: String::new(),
            tool_calls: Some(vec![ToolCall {
                id: "t1".to_string(),
                function: ToolFunction {
                    name: "search".to_string(),
                    arguments: "{}".to_string(),
                },
            }]),
        }];
        assert_eq!(pending_tool_calls(&with_calls).unwrap().len(), 1);

        // a tool result after the assistant message resolves the turn
        let resolved = vec![
            with_calls[0].clone(),
            ChatMessage::tool_result("t1", "42"),
        ];
        assert!(pending_tool_calls(&resolved).is_none());
    }

    #[test]
    fn test_empty_tool_call_list_is_not_pending() {
        let messages = vec![ChatMessage::Assistant {
            content: "done".to_string(),
            tool_calls: Some(Vec::new()),
        }];
        assert!(pending_tool_calls(&messages).is_none());
    }
}
