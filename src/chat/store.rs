//! Thread state store
//!
//! All thread state lives in [`ChatState`] and changes only through
//! [`reduce`], a pure function over discrete [`ChatAction`]s. Network
//! responses arrive asynchronously and the user may switch or create
//! threads mid-flight, so every transition is id-guarded: an action
//! addressed to a thread that is neither active nor parked leaves the
//! state untouched. That guard is the correctness backbone against
//! cross-thread corruption.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::chat::merge::merge_response;
use crate::chat::response::ChatResponse;
use crate::core::{ChatMessage, ChatThread};

/// Full engine state: one active thread plus parked threads
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    /// A response stream is currently being consumed
    pub streaming: bool,
    /// The active thread
    pub thread: ChatThread,
    /// Terminal error of the last turn, if any
    pub error: Option<String>,
    /// Set on failure; blocks manual submit and auto-continuation until
    /// explicitly cleared
    pub prevent_send: bool,
    /// Splice point: where the next server-echoed user message replaces the
    /// client-side placeholder
    pub previous_message_length: usize,
    /// A request was issued but no delta has arrived yet
    pub waiting_for_response: bool,
    /// Parked threads keyed by id, still receiving async updates
    pub cache: HashMap<String, ChatThread>,
    /// Non-default system prompt to lead empty threads with
    pub system_prompt: Option<String>,
    /// Whether tool definitions are attached to outgoing requests
    pub use_tools: bool,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            streaming: false,
            thread: ChatThread::new(),
            error: None,
            prevent_send: false,
            previous_message_length: 0,
            waiting_for_response: false,
            cache: HashMap::new(),
            system_prompt: None,
            use_tools: true,
        }
    }
}

/// Discrete state transitions
#[derive(Debug, Clone)]
pub enum ChatAction {
    /// A request was issued for the thread
    AskedQuestion { id: String },
    /// Snapshot the outgoing message list before the stream opens
    BackUpMessages {
        id: String,
        messages: Vec<ChatMessage>,
    },
    /// One decoded response payload arrived
    Response { id: String, payload: ChatResponse },
    /// The turn failed
    Error { id: String, message: String },
    /// The stream settled (fires on success, failure, and abort alike)
    DoneStreaming { id: String },
    /// Park the active thread (when streaming) and start a fresh one
    NewChat { id: String },
    /// Replace the active thread with one restored from history
    RestoreChat { id: String, thread: ChatThread },
    /// Clear the prevent-send gate after a failure
    EnableSend { id: String },
    /// Clear the displayed error
    ClearError { id: String },
    /// Evict a parked thread
    RemoveFromCache { id: String },
    /// Change the active thread's model
    SetModel { id: String, model: String },
    /// Change the configured system prompt
    SetSystemPrompt { prompt: Option<String> },
    /// Toggle tool attachment on outgoing requests
    SetUseTools { enabled: bool },
}

impl ChatAction {
    /// Name used in trace logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::AskedQuestion { .. } => "asked_question",
            Self::BackUpMessages { .. } => "back_up_messages",
            Self::Response { .. } => "response",
            Self::Error { .. } => "error",
            Self::DoneStreaming { .. } => "done_streaming",
            Self::NewChat { .. } => "new_chat",
            Self::RestoreChat { .. } => "restore_chat",
            Self::EnableSend { .. } => "enable_send",
            Self::ClearError { .. } => "clear_error",
            Self::RemoveFromCache { .. } => "remove_from_cache",
            Self::SetModel { .. } => "set_model",
            Self::SetSystemPrompt { .. } => "set_system_prompt",
            Self::SetUseTools { .. } => "set_use_tools",
        }
    }
}

/// Apply one transition. Pure: no side effects, returns the next state.
pub fn reduce(mut state: ChatState, action: ChatAction) -> ChatState {
    match action {
        ChatAction::AskedQuestion { id } => {
            if state.thread.id != id {
                return state;
            }
            state.waiting_for_response = true;
            state.streaming = true;
            state
        }

        ChatAction::BackUpMessages { id, messages } => {
            if state.thread.id != id {
                return state;
            }
            state.error = None;
            state.previous_message_length = messages.len().saturating_sub(1);
            state.thread.messages = messages;
            state
        }

        ChatAction::Response { id, payload } => {
            if id != state.thread.id && !state.cache.contains_key(&id) {
                tracing::debug!(thread = %id, "dropping response for unknown thread");
                return state;
            }

            // Out-of-band update for a parked thread: write back to the
            // cache entry only, the active thread stays untouched
            if let Some(parked) = state.cache.get_mut(&id) {
                let messages = std::mem::take(&mut parked.messages);
                parked.messages = merge_response(messages, &payload);
                return state;
            }

            let mut current = std::mem::take(&mut state.thread.messages);
            if payload.is_user_message() {
                // Replace the client-side placeholder with the echoed message
                current.truncate(state.previous_message_length);
            }
            let messages = merge_response(current, &payload);

            state.streaming = true;
            state.waiting_for_response = false;
            state.previous_message_length = messages.len();
            state.thread.messages = messages;
            state
        }

        ChatAction::Error { id, message } => {
            if state.thread.id != id {
                tracing::debug!(thread = %id, "dropping error for unknown thread: {}", message);
                return state;
            }
            state.streaming = false;
            state.prevent_send = true;
            state.waiting_for_response = false;
            state.error = Some(message);
            state
        }

        ChatAction::DoneStreaming { id } => {
            if state.thread.id != id {
                return state;
            }
            state.streaming = false;
            state
        }

        ChatAction::NewChat { id } => {
            if state.thread.id != id {
                return state;
            }
            let mut cache = std::mem::take(&mut state.cache);
            if state.streaming {
                cache.insert(state.thread.id.clone(), state.thread.clone());
            }
            // Carry the model over only when the old thread was actually used
            let model = if state.thread.messages.is_empty() {
                String::new()
            } else {
                state.thread.model.clone()
            };
            let mut next = ChatState {
                cache,
                system_prompt: state.system_prompt.clone(),
                use_tools: state.use_tools,
                ..ChatState::default()
            };
            next.thread.model = model;
            next
        }

        ChatAction::RestoreChat { id, thread } => {
            if state.thread.id != id {
                return state;
            }
            if state.streaming {
                state
                    .cache
                    .insert(state.thread.id.clone(), state.thread.clone());
                state.streaming = false;
            }
            state.error = None;
            state.waiting_for_response = false;
            state.previous_message_length = thread.messages.len();
            state.thread = thread;
            state
        }

        ChatAction::EnableSend { id } => {
            if state.thread.id != id {
                return state;
            }
            state.prevent_send = false;
            state
        }

        ChatAction::ClearError { id } => {
            if state.thread.id != id {
                return state;
            }
            state.error = None;
            state
        }

        ChatAction::RemoveFromCache { id } => {
            if !state.cache.contains_key(&id) {
                return state;
            }
            state.cache.remove(&id);
            state
        }

        ChatAction::SetModel { id, model } => {
            if state.thread.id != id {
                return state;
            }
            state.thread.model = model;
            state
        }

        ChatAction::SetSystemPrompt { prompt } => {
            state.system_prompt = prompt;
            state
        }

        ChatAction::SetUseTools { enabled } => {
            state.use_tools = enabled;
            state
        }
    }
}

/// Serialized dispatch around [`reduce`] plus read-only selectors
///
/// The mutex is held only for the synchronous reducer application, never
/// across an await point, so dispatches apply in call order.
pub struct ChatStore {
    state: Mutex<ChatState>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::with_state(ChatState::default())
    }

    pub fn with_state(state: ChatState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn dispatch(&self, action: ChatAction) {
        let mut guard = self.state.lock().unwrap();
        tracing::trace!(action = action.name(), "dispatch");
        let state = std::mem::take(&mut *guard);
        *guard = reduce(state, action);
    }

    /// Clone of the full state
    pub fn snapshot(&self) -> ChatState {
        self.state.lock().unwrap().clone()
    }

    pub fn thread_id(&self) -> String {
        self.state.lock().unwrap().thread.id.clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().unwrap().thread.messages.clone()
    }

    pub fn model(&self) -> String {
        self.state.lock().unwrap().thread.model.clone()
    }

    pub fn streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }

    pub fn waiting_for_response(&self) -> bool {
        self.state.lock().unwrap().waiting_for_response
    }

    pub fn prevent_send(&self) -> bool {
        self.state.lock().unwrap().prevent_send
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().unwrap().error.clone()
    }

    pub fn cached_thread(&self, id: &str) -> Option<ChatThread> {
        self.state.lock().unwrap().cache.get(id).cloned()
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}
