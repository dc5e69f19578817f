//! The conversational session engine.
//!
//! One [`ChatEngine`] owns one conversation. At most one submission is in
//! flight at a time; a second submission while busy is ignored. Every
//! accepted submission appends the user message immediately and exactly one
//! assistant message when it resolves, whether the service answered, failed,
//! timed out, or the caller dropped the future mid-request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use floodsafe_core::types::{LocationContext, Message, Role};

use crate::completion::{CompletionRequest, CompletionService};
use crate::directive::build_directive;
use crate::error::ChatError;
use crate::parser::parse_reply;
use crate::sanitize::{escape_text, sanitize_html};
use crate::types::{
    ChatSnapshot, InputSource, Rejection, RenderedMessage, SubmitOutcome, QUICK_ACTIONS,
};

/// Assistant reply appended when the service call fails.
pub const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble connecting right now. \
Please try again later or contact emergency services directly if this is urgent.";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct SessionState {
    messages: Vec<Message>,
    location: Option<LocationContext>,
    follow_ups: Vec<String>,
    busy: bool,
}

/// In-memory chat session bound to a completion service.
pub struct ChatEngine {
    service: Arc<dyn CompletionService>,
    request_timeout: Duration,
    state: Mutex<SessionState>,
}

/// Resolves an accepted submission with the fallback if it is dropped
/// before the service call completes.
struct InFlight<'a> {
    engine: &'a ChatEngine,
    armed: bool,
}

impl InFlight<'_> {
    fn complete(mut self, result: Result<String, ChatError>) -> SubmitOutcome {
        self.armed = false;
        self.engine.resolve(result)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!("Submission dropped before the service replied");
            self.engine
                .resolve(Err(ChatError::Transport("submission cancelled".to_string())));
        }
    }
}

impl ChatEngine {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Bound each service call. A call that runs longer resolves to the
    /// fallback reply.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submit typed input. Surrounding whitespace is trimmed.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        self.submit_as(text, InputSource::Typed).await
    }

    /// Replay a suggested follow-up question as the next user turn.
    pub async fn select_follow_up(&self, question: &str) -> SubmitOutcome {
        self.submit_as(question, InputSource::FollowUp).await
    }

    /// Send a pre-canned quick action as the next user turn. Only accepted
    /// while the conversation is empty.
    pub async fn select_quick_action(&self, action: &str) -> SubmitOutcome {
        self.submit_as(action, InputSource::QuickAction).await
    }

    /// Submit `text` on behalf of `source`.
    pub async fn submit_as(&self, text: &str, source: InputSource) -> SubmitOutcome {
        let prompt = match source {
            InputSource::Typed => text.trim(),
            InputSource::FollowUp | InputSource::QuickAction => text,
        };
        if prompt.trim().is_empty() {
            tracing::debug!(?source, "Ignoring empty submission");
            return SubmitOutcome::Ignored(Rejection::EmptyInput);
        }

        let request = {
            let mut state = self.lock();
            if state.busy {
                tracing::debug!(?source, "Ignoring submission while a request is in flight");
                return SubmitOutcome::Ignored(Rejection::InFlight);
            }
            if source == InputSource::QuickAction && !state.messages.is_empty() {
                tracing::debug!("Ignoring quick action after the conversation started");
                return SubmitOutcome::Ignored(Rejection::ConversationStarted);
            }
            let request = CompletionRequest {
                system: build_directive(state.location.as_ref()),
                history: state.messages.clone(),
                prompt: prompt.to_string(),
            };
            state.messages.push(Message::user(prompt));
            state.busy = true;
            state.follow_ups.clear();
            request
        };

        tracing::info!(
            ?source,
            history = request.history.len(),
            located = self.location_context().is_some(),
            "Submitting chat turn"
        );

        let guard = InFlight {
            engine: self,
            armed: true,
        };
        let result =
            match tokio::time::timeout(self.request_timeout, self.service.complete(&request)).await
            {
                Ok(result) => result,
                Err(_) => Err(ChatError::Timeout(self.request_timeout)),
            };
        guard.complete(result)
    }

    /// Append the assistant message for the in-flight submission and go idle.
    fn resolve(&self, result: Result<String, ChatError>) -> SubmitOutcome {
        let mut state = self.lock();
        let outcome = match result {
            Ok(raw) => {
                let parsed = parse_reply(&raw);
                tracing::info!(follow_ups = parsed.follow_ups.len(), "Chat turn answered");
                state.messages.push(Message::assistant(parsed.content));
                state.follow_ups = parsed.follow_ups;
                SubmitOutcome::Answered
            }
            Err(e) => {
                tracing::warn!("Chat completion failed: {}", e);
                state.messages.push(Message::assistant(FALLBACK_REPLY));
                state.follow_ups.clear();
                SubmitOutcome::Fallback
            }
        };
        state.busy = false;
        outcome
    }

    // =========================================================================
    // Location
    // =========================================================================

    /// Set the location context. The first call wins; later calls are
    /// ignored and return `false`.
    pub fn set_location_context(&self, ctx: LocationContext) -> bool {
        let mut state = self.lock();
        if state.location.is_some() {
            tracing::debug!("Location context already set; ignoring update");
            return false;
        }
        tracing::info!(place = %ctx.place(), "Location context set");
        state.location = Some(ctx);
        true
    }

    pub fn location_context(&self) -> Option<LocationContext> {
        self.lock().location.clone()
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Messages in submission order, assistant content unsanitized.
    pub fn messages(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn follow_ups(&self) -> Vec<String> {
        self.lock().follow_ups.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Render-ready view of the session.
    ///
    /// Assistant HTML is passed through the allow-list sanitizer and user
    /// text is escaped. Quick actions are offered only before the first
    /// message.
    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.lock();
        let messages = state
            .messages
            .iter()
            .map(|m| RenderedMessage {
                role: m.role,
                html: match m.role {
                    Role::Assistant => sanitize_html(&m.content),
                    Role::User => escape_text(&m.content),
                },
                created_at: m.created_at,
            })
            .collect();
        let quick_actions = if state.messages.is_empty() {
            QUICK_ACTIONS.iter().map(|a| a.to_string()).collect()
        } else {
            Vec::new()
        };

        ChatSnapshot {
            messages,
            follow_ups: state.follow_ups.clone(),
            busy: state.busy,
            quick_actions,
            location: state.location.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
