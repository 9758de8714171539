//! Folds decoded response payloads into a thread's message list
//!
//! Two shapes of update:
//! - assistant deltas either continue the trailing assistant message
//!   (content concatenation, tool-call fragment accumulation by index) or
//!   open a new assistant turn;
//! - server-echoed user/context-file messages are appended as-is (the store
//!   has already cut the list back to the splice point).

use crate::chat::response::{ChatResponse, Delta, ToolCallFragment, UserMessageResponse};
use crate::core::{ChatMessage, ToolCall};

/// Fold one parsed payload into the message list
pub fn merge_response(mut messages: Vec<ChatMessage>, response: &ChatResponse) -> Vec<ChatMessage> {
    match response {
        ChatResponse::User(user) => {
            messages.push(user_to_message(user));
            messages
        }
        ChatResponse::Choices(batch) => {
            for choice in &batch.choices {
                apply_delta(&mut messages, &choice.delta);
            }
            messages
        }
    }
}

fn user_to_message(response: &UserMessageResponse) -> ChatMessage {
    if response.role == "context_file" {
        // The file list arrives as a JSON string inside the content field
        let files = serde_json::from_str(&response.content).unwrap_or_else(|err| {
            tracing::warn!("undecodable context_file payload, attaching no files: {}", err);
            Vec::new()
        });
        ChatMessage::ContextFile { content: files }
    } else {
        ChatMessage::User {
            content: response.content.clone(),
        }
    }
}

fn apply_delta(messages: &mut Vec<ChatMessage>, delta: &Delta) {
    match messages.last_mut() {
        // Same turn: the trailing assistant message absorbs the fragment
        Some(ChatMessage::Assistant {
            content,
            tool_calls,
        }) => {
            if let Some(text) = &delta.content {
                content.push_str(text);
            }
            if let Some(fragments) = &delta.tool_calls {
                accumulate_fragments(tool_calls, fragments);
            }
        }
        // First delta after a user message opens a new assistant turn
        _ => {
            messages.push(ChatMessage::Assistant {
                content: delta.content.clone().unwrap_or_default(),
                tool_calls: None,
            });
            if let Some(fragments) = &delta.tool_calls {
                if let Some(ChatMessage::Assistant { tool_calls, .. }) = messages.last_mut() {
                    accumulate_fragments(tool_calls, fragments);
                }
            }
        }
    }
}

/// Accumulate tool-call fragments into the call slot at their index
///
/// `id` and `name` land once on the first fragment of a call; `arguments`
/// text concatenates across fragments.
fn accumulate_fragments(calls: &mut Option<Vec<ToolCall>>, fragments: &[ToolCallFragment]) {
    let calls = calls.get_or_insert_with(Vec::new);
    for fragment in fragments {
        while calls.len() <= fragment.index {
            calls.push(ToolCall::default());
        }
        let call = &mut calls[fragment.index];
        if let Some(id) = &fragment.id {
            if !id.is_empty() {
                call.id = id.clone();
            }
        }
        if let Some(name) = &fragment.function.name {
            if !name.is_empty() {
                call.function.name = name.clone();
            }
        }
        if let Some(arguments) = &fragment.function.arguments {
            call.function.arguments.push_str(arguments);
        }
    }
}
