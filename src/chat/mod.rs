//! The streaming chat-thread state machine
//!
//! Layering, leaf to root: response payload parsing ([`response`]), delta
//! folding ([`merge`]), the pure-reducer state store ([`store`]), and the
//! async orchestrator ([`engine`]) that drives a turn end to end.

mod engine;
mod events;
mod merge;
mod response;
mod store;

pub use engine::{ChatEngine, ToolResolver};
pub use events::{ChatEvent, EventSender};
pub use merge::merge_response;
pub use response::{
    ChatResponse, Choice, ChoicesResponse, Delta, FunctionFragment, ToolCallFragment,
    UserMessageResponse,
};
pub use store::{reduce, ChatAction, ChatState, ChatStore};
