//! Conversational session engine for FloodSafe.
//!
//! Owns the in-memory conversation, assembles the flood-safety system
//! directive, calls the chat-completion service, and splits each reply into
//! renderable content plus suggested follow-up questions.

pub mod completion;
pub mod directive;
pub mod engine;
pub mod error;
pub mod location;
pub mod parser;
pub mod sanitize;
pub mod types;

pub use completion::{
    ChatTurn, CompletionRequest, CompletionService, OpenAiCompletionClient, ScriptedCompletion,
};
pub use engine::{ChatEngine, FALLBACK_REPLY};
pub use error::ChatError;
pub use location::{locate_once, NominatimGeocoder, ReverseGeocoder, StaticGeocoder};
pub use parser::{parse_reply, split_follow_ups, FollowUpFormatError, ParsedReply};
pub use types::{
    ChatSnapshot, InputSource, Rejection, RenderedMessage, SubmitOutcome, QUICK_ACTIONS,
};
