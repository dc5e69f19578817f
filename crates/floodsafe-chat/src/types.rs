//! Engine-facing types: submission outcomes and the render snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use floodsafe_core::types::{LocationContext, Role};

/// Pre-canned questions offered before any conversation has started.
pub const QUICK_ACTIONS: [&str; 5] = [
    "What should I do during a flood?",
    "Emergency contact numbers",
    "How to prepare for floods?",
    "First aid during floods",
    "Safe evacuation routes",
];

/// How a message entered the engine.
///
/// Typed input is trimmed before it is recorded; suggested prompts are
/// replayed verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Typed,
    FollowUp,
    QuickAction,
}

/// Why a submission was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Input was empty or whitespace only.
    EmptyInput,
    /// Another submission is still waiting on the chat-completion service.
    InFlight,
    /// Quick actions are only offered before the first message.
    ConversationStarted,
}

/// Result of a call to `ChatEngine::submit` and its sugar variants.
///
/// Accepted submissions always end as `Answered` or `Fallback`; errors
/// from the service never escape the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The service replied; an assistant message with the cleaned content
    /// was appended and the follow-up set replaced.
    Answered,
    /// The call failed; the fixed fallback reply was appended.
    Fallback,
    /// Nothing changed.
    Ignored(Rejection),
}

/// A message prepared for display. `html` is already sanitized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub role: Role,
    pub html: String,
    pub created_at: DateTime<Utc>,
}

/// Everything a presentation layer needs to draw the chat widget.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    pub messages: Vec<RenderedMessage>,
    pub follow_ups: Vec<String>,
    pub busy: bool,
    /// Populated only while the conversation is empty.
    pub quick_actions: Vec<String>,
    pub location: Option<LocationContext>,
}
