//! FloodSafe API crate - axum HTTP host for chat sessions and flood status.
//!
//! Exposes the rendered chat surface (messages, follow-ups, busy flag, quick
//! actions) per session, one-shot location binding, and the flood-prediction
//! lookup for a browser UI.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
