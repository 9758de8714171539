//! End-to-end tests for the stream orchestrator
//!
//! A scripted transport replays canned SSE turns; a channel transport
//! hands the test direct control over chunk timing for the mid-stream
//! scenarios (backgrounding, abort).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use ripple_chat::chat::{ChatEngine, ChatEvent, ChatStore, ToolResolver};
use ripple_chat::core::{ChatError, ChatMessage, ToolCall};
use ripple_chat::history::{ChatHistory, MemoryHistory};
use ripple_chat::llm::{ByteStream, ChatRequest, ChatTransport, TransportError};

type Chunk = Result<Bytes, TransportError>;

fn frame(payload: &str) -> Chunk {
    Ok(Bytes::from(format!("data: {}\n\n", payload)))
}

/// Replays one canned chunk list per request, recording every request
struct ScriptedTransport {
    turns: Mutex<VecDeque<Vec<Chunk>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn push_turn(&self, chunks: Vec<Chunk>) {
        self.turns.lock().unwrap().push_back(chunks);
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn open_stream(&self, request: ChatRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().unwrap().push(request);
        let chunks = self.turns.lock().unwrap().pop_front().unwrap_or_default();
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Streams whatever the test feeds through an unbounded channel
struct ChannelTransport {
    stream: Mutex<Option<futures::channel::mpsc::UnboundedReceiver<Chunk>>>,
}

impl ChannelTransport {
    fn new(stream: futures::channel::mpsc::UnboundedReceiver<Chunk>) -> Self {
        Self {
            stream: Mutex::new(Some(stream)),
        }
    }
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn open_stream(&self, _request: ChatRequest) -> Result<ByteStream, TransportError> {
        let stream = self
            .stream
            .lock()
            .unwrap()
            .take()
            .expect("channel transport supports a single request");
        Ok(stream.boxed())
    }
}

struct StaticResolver {
    results: Vec<ChatMessage>,
}

#[async_trait]
impl ToolResolver for StaticResolver {
    async fn resolve(&self, _calls: &[ToolCall]) -> Vec<ChatMessage> {
        self.results.clone()
    }
}

fn engine_with(transport: Arc<dyn ChatTransport>) -> (Arc<ChatStore>, ChatEngine) {
    let store = Arc::new(ChatStore::new());
    let engine = ChatEngine::new(store.clone(), transport, Arc::new(MemoryHistory::new()));
    (store, engine)
}

/// Poll until the condition holds; panics after two seconds
async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within two seconds");
}

#[tokio::test]
async fn round_trip_streams_one_assistant_message() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![
        frame(r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"hi"}}]}"#),
        frame(r#"{"choices":[{"index":0,"delta":{"content":" there"}}]}"#),
        frame("[DONE]"),
    ]);
    let (store, engine) = engine_with(transport.clone());

    engine.submit("hello").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages, vec![ChatMessage::user("hello")]);
    assert_eq!(requests[0].model, "");
    assert!(requests[0].stream);

    let state = store.snapshot();
    assert!(!state.streaming);
    assert!(!state.waiting_for_response);
    assert_eq!(state.error, None);
    // fragments concatenated into exactly one assistant message
    assert_eq!(state.thread.messages.len(), 2);
    assert_eq!(
        state.thread.messages[1],
        ChatMessage::Assistant {
            content: "hi there".to_string(),
            tool_calls: None
        }
    );
}

#[tokio::test]
async fn chunks_split_mid_frame_still_decode() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![
        Ok(Bytes::from("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"con")),
        Ok(Bytes::from("tent\":\"split\"}}]}\n\ndata: [DONE]\n\n")),
    ]);
    let (store, engine) = engine_with(transport);

    engine.submit("hello").await.unwrap();

    assert_eq!(
        store.messages().last(),
        Some(&ChatMessage::assistant("split"))
    );
}

#[tokio::test]
async fn system_prompt_leads_an_empty_thread() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![frame("[DONE]")]);
    let (_store, engine) = engine_with(transport.clone());
    engine.set_system_prompt(Some("You are terse.".to_string()));

    engine.submit("hello").await.unwrap();

    let requests = transport.requests();
    assert_eq!(
        requests[0].messages,
        vec![
            ChatMessage::system("You are terse."),
            ChatMessage::user("hello"),
        ]
    );
}

#[tokio::test]
async fn tool_calls_auto_continue_with_results() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![
        frame(
            r#"{"choices":[{"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"t1","function":{"name":"lookup","arguments":"{}"}}]}}]}"#,
        ),
        frame("[DONE]"),
    ]);
    transport.push_turn(vec![
        frame(r#"{"choices":[{"delta":{"role":"assistant","content":"All done"}}]}"#),
        frame("[DONE]"),
    ]);

    let (store, engine) = engine_with(transport.clone());
    let engine = engine.with_tool_resolver(Arc::new(StaticResolver {
        results: vec![ChatMessage::tool_result("t1", "42")],
    }));

    engine.submit("hello").await.unwrap();

    // the engine re-invoked the transport on its own
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(
        requests[1].messages[2],
        ChatMessage::tool_result("t1", "42")
    );

    let messages = store.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3], ChatMessage::assistant("All done"));
    assert!(!store.streaming());
}

#[tokio::test]
async fn unresolved_tool_calls_retry_up_to_the_bound() {
    let transport = Arc::new(ScriptedTransport::new());
    let turn = || {
        vec![
            frame(
                r#"{"choices":[{"delta":{"role":"assistant","tool_calls":[{"index":0,"id":"t1","function":{"name":"lookup","arguments":"{}"}}]}}]}"#,
            ),
            frame("[DONE]"),
        ]
    };
    for _ in 0..5 {
        transport.push_turn(turn());
    }

    let (store, engine) = engine_with(transport.clone());
    let engine = engine.with_max_auto_continuations(2);

    engine.submit("hello").await.unwrap();

    // initial send plus two bounded retries, then the engine gives up
    assert_eq!(transport.requests().len(), 3);
    assert!(!store.streaming());
}

#[tokio::test]
async fn error_sentinel_blocks_resend_until_enabled() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![frame("[ERROR]")]);
    let (store, engine) = engine_with(transport.clone());

    engine.submit("hello").await.unwrap();

    let state = store.snapshot();
    assert!(!state.streaming);
    assert!(state.prevent_send);
    assert_eq!(state.error.as_deref(), Some("stream aborted by server"));
    // prior messages stay intact for inspection and resend
    assert_eq!(state.thread.messages, vec![ChatMessage::user("hello")]);

    // a second submit is rejected and reaches no transport
    assert!(matches!(
        engine.submit("again").await,
        Err(ChatError::SendBlocked)
    ));
    assert_eq!(transport.requests().len(), 1);

    // clearing the gate makes submit work again
    engine.enable_send();
    transport.push_turn(vec![
        frame(r#"{"choices":[{"delta":{"role":"assistant","content":"recovered"}}]}"#),
        frame("[DONE]"),
    ]);
    engine.submit("again").await.unwrap();
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(
        store.messages().last(),
        Some(&ChatMessage::assistant("recovered"))
    );
}

#[tokio::test]
async fn detail_payload_surfaces_as_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![frame(r#"{"detail":"model quota exhausted"}"#)]);
    let (store, engine) = engine_with(transport);

    engine.submit("hello").await.unwrap();

    let state = store.snapshot();
    assert_eq!(state.error.as_deref(), Some("model quota exhausted"));
    assert!(state.prevent_send);
}

#[tokio::test]
async fn transport_failure_maps_to_error_transition() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![
        frame(r#"{"choices":[{"delta":{"role":"assistant","content":"par"}}]}"#),
        Err(TransportError::Network("connection reset".to_string())),
    ]);
    let (store, engine) = engine_with(transport);

    engine.submit("hello").await.unwrap();

    let state = store.snapshot();
    assert!(!state.streaming);
    assert!(state.prevent_send);
    assert_eq!(
        state.error.as_deref(),
        Some("Network error: connection reset")
    );
    // the partial answer is kept, not rolled back
    assert_eq!(
        state.thread.messages.last(),
        Some(&ChatMessage::assistant("par"))
    );
}

#[tokio::test]
async fn done_always_fires_after_error() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![frame("[ERROR]")]);
    let store = Arc::new(ChatStore::new());
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = ChatEngine::new(store.clone(), transport, Arc::new(MemoryHistory::new()))
        .with_events(events_tx);

    engine.submit("hello").await.unwrap();
    drop(engine);

    let mut kinds = Vec::new();
    while let Some(event) = events_rx.recv().await {
        kinds.push(match event {
            ChatEvent::QuestionAsked { .. } => "asked",
            ChatEvent::ResponseMerged { .. } => "merged",
            ChatEvent::StreamError { .. } => "error",
            ChatEvent::StreamDone { .. } => "done",
            ChatEvent::ThreadReplaced { .. } => "replaced",
            ChatEvent::ToolCallsPending { .. } => "pending",
        });
    }
    assert_eq!(kinds, vec!["asked", "error", "done"]);
}

#[tokio::test]
async fn backgrounded_thread_keeps_receiving_its_stream() {
    let (feed, stream) = futures::channel::mpsc::unbounded();
    let transport = Arc::new(ChannelTransport::new(stream));
    let store = Arc::new(ChatStore::new());
    let engine = Arc::new(ChatEngine::new(
        store.clone(),
        transport,
        Arc::new(MemoryHistory::new()),
    ));
    let first_id = store.thread_id();

    let submit = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit("hello").await })
    };

    feed.unbounded_send(frame(
        r#"{"choices":[{"delta":{"role":"assistant","content":"first"}}]}"#,
    ))
    .unwrap();
    {
        let store = store.clone();
        wait_until(move || store.messages().len() == 2).await;
    }

    // user starts a new chat while the old thread is still streaming
    engine.new_chat();
    let second_id = store.thread_id();
    assert_ne!(second_id, first_id);
    assert!(store.messages().is_empty());
    let parked = store.cached_thread(&first_id).expect("old thread parked");
    assert_eq!(parked.messages.len(), 2);

    // late deltas for the old id land in the cache, not the active thread
    feed.unbounded_send(frame(r#"{"choices":[{"delta":{"content":" and more"}}]}"#))
        .unwrap();
    feed.unbounded_send(frame("[DONE]")).unwrap();
    drop(feed);
    submit.await.unwrap().unwrap();

    let cached = store.cached_thread(&first_id).unwrap();
    assert_eq!(
        cached.messages[1],
        ChatMessage::assistant("first and more")
    );
    assert!(store.messages().is_empty());
    assert_eq!(store.thread_id(), second_id);
}

#[tokio::test]
async fn abort_stops_merging_and_is_idempotent() {
    let (feed, stream) = futures::channel::mpsc::unbounded();
    let transport = Arc::new(ChannelTransport::new(stream));
    let store = Arc::new(ChatStore::new());
    let engine = Arc::new(ChatEngine::new(
        store.clone(),
        transport,
        Arc::new(MemoryHistory::new()),
    ));

    // aborting with nothing in flight is a no-op
    engine.abort();

    let submit = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit("hello").await })
    };

    feed.unbounded_send(frame(
        r#"{"choices":[{"delta":{"role":"assistant","content":"first"}}]}"#,
    ))
    .unwrap();
    {
        let store = store.clone();
        wait_until(move || store.messages().len() == 2).await;
    }

    engine.abort();
    engine.abort();

    // a straggling chunk must not mutate the thread
    let _ = feed.unbounded_send(frame(r#"{"choices":[{"delta":{"content":" second"}}]}"#));
    submit.await.unwrap().unwrap();

    let state = store.snapshot();
    assert!(!state.streaming);
    assert_eq!(state.error, None);
    assert_eq!(
        state.thread.messages.last(),
        Some(&ChatMessage::assistant("first"))
    );
}

#[tokio::test]
async fn settled_threads_are_saved_to_history() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_turn(vec![
        frame(r#"{"choices":[{"delta":{"role":"assistant","content":"hi"}}]}"#),
        frame("[DONE]"),
    ]);
    let history = Arc::new(MemoryHistory::new());
    let store = Arc::new(ChatStore::new());
    let engine = ChatEngine::new(store.clone(), transport, history.clone());

    engine.submit("hello").await.unwrap();

    let saved = history.restore_chat(&store.thread_id()).unwrap();
    assert_eq!(saved.messages.len(), 2);
}

#[tokio::test]
async fn restore_chat_swaps_in_the_saved_thread() {
    let transport = Arc::new(ScriptedTransport::new());
    let history = Arc::new(MemoryHistory::new());

    let mut saved = ripple_chat::core::ChatThread::new();
    saved.messages = vec![
        ChatMessage::user("old question"),
        ChatMessage::assistant("old answer"),
    ];
    history.save_chat(&saved).unwrap();

    let store = Arc::new(ChatStore::new());
    let engine = ChatEngine::new(store.clone(), transport, history);

    engine.restore_chat(&saved.id).unwrap();
    assert_eq!(store.thread_id(), saved.id);
    assert_eq!(store.messages().len(), 2);

    assert!(matches!(
        engine.restore_chat("missing"),
        Err(ChatError::History(_))
    ));
}

#[tokio::test]
async fn restoring_a_parked_thread_evicts_it_from_the_cache() {
    let (feed, stream) = futures::channel::mpsc::unbounded();
    let transport = Arc::new(ChannelTransport::new(stream));
    let store = Arc::new(ChatStore::new());
    let engine = Arc::new(ChatEngine::new(
        store.clone(),
        transport,
        Arc::new(MemoryHistory::new()),
    ));
    let first_id = store.thread_id();

    let submit = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.submit("hello").await })
    };
    feed.unbounded_send(frame(
        r#"{"choices":[{"delta":{"role":"assistant","content":"parked answer"}}]}"#,
    ))
    .unwrap();
    {
        let store = store.clone();
        wait_until(move || store.messages().len() == 2).await;
    }

    engine.new_chat();
    drop(feed);
    submit.await.unwrap().unwrap();
    assert!(store.cached_thread(&first_id).is_some());

    // navigating back restores the parked copy and clears the cache entry
    engine.restore_chat(&first_id).unwrap();
    assert_eq!(store.thread_id(), first_id);
    assert_eq!(store.messages().len(), 2);
    assert!(store.cached_thread(&first_id).is_none());
}
