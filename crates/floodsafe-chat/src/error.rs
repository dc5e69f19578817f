//! Error types for the chat engine's external collaborators.

use std::time::Duration;

/// Errors from the chat-completion and reverse-geocoding services.
///
/// None of these reach callers of `ChatEngine::submit`; the engine turns
/// them into the fallback reply.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("geocoding error: {0}")]
    Geocoding(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ChatError::MalformedPayload(err.to_string())
        } else {
            ChatError::Transport(err.to_string())
        }
    }
}
