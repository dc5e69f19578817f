//! Application state shared across all route handlers.
//!
//! AppState holds the external service clients and the live chat sessions.
//! It is passed to handlers via axum's State extractor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

use floodsafe_chat::{ChatEngine, CompletionService, ReverseGeocoder};
use floodsafe_core::FloodSafeConfig;
use floodsafe_forecast::FloodPredictor;

/// A live session and when it was last touched.
pub struct SessionEntry {
    pub engine: Arc<ChatEngine>,
    pub last_active: Instant,
}

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<FloodSafeConfig>,
    /// Live chat sessions keyed by id. Each engine owns its own conversation.
    pub sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
    /// Chat-completion service shared by every session.
    pub completion: Arc<dyn CompletionService>,
    /// One-shot reverse geocoder for location binding.
    pub geocoder: Arc<dyn ReverseGeocoder>,
    /// Flood-prediction service.
    pub predictor: Arc<dyn FloodPredictor>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: FloodSafeConfig,
        completion: Arc<dyn CompletionService>,
        geocoder: Arc<dyn ReverseGeocoder>,
        predictor: Arc<dyn FloodPredictor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            completion,
            geocoder,
            predictor,
            start_time: Instant::now(),
        }
    }

    /// Start a new session bound to the shared completion service.
    ///
    /// Idle sessions with nothing in flight are evicted first. Returns `None`
    /// when the live session count is still at `server.max_sessions`.
    pub fn create_session(&self) -> Option<(Uuid, Arc<ChatEngine>)> {
        let idle = Duration::from_secs(self.config.server.session_idle_secs);
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);

        let before = sessions.len();
        sessions.retain(|_, entry| {
            entry.engine.is_busy() || entry.last_active.elapsed() < idle
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, "Evicted idle sessions");
        }

        if sessions.len() >= self.config.server.max_sessions {
            tracing::warn!(
                live = sessions.len(),
                max = self.config.server.max_sessions,
                "Session limit reached"
            );
            return None;
        }

        let id = Uuid::new_v4();
        let timeout = Duration::from_secs(self.config.chat.request_timeout_secs.max(1));
        let engine = Arc::new(
            ChatEngine::new(Arc::clone(&self.completion)).with_request_timeout(timeout),
        );
        sessions.insert(
            id,
            SessionEntry {
                engine: Arc::clone(&engine),
                last_active: Instant::now(),
            },
        );
        tracing::info!(session_id = %id, "Session created");
        Some((id, engine))
    }

    /// Look up a session and mark it active.
    pub fn session(&self, id: Uuid) -> Option<Arc<ChatEngine>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions.get_mut(&id)?;
        entry.last_active = Instant::now();
        Some(Arc::clone(&entry.engine))
    }

    /// Forget a session. A submission still in flight keeps its engine alive
    /// until it resolves.
    pub fn remove_session(&self, id: Uuid) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            tracing::info!(session_id = %id, "Session closed");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
