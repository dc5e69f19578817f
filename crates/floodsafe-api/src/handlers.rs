//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path, query and body parameters via axum
//! extractors, works against AppState, and returns JSON responses.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use floodsafe_chat::{locate_once, ChatEngine, ChatSnapshot, SubmitOutcome, QUICK_ACTIONS};
use floodsafe_core::types::{Coordinates, FloodStatus, LocationContext};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct FloodStatusParams {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct QuickActionRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub latitude: f64,
    pub longitude: f64,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuickActionsResponse {
    pub quick_actions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FloodStatusResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub status: FloodStatus,
    /// The service's label, e.g. "Flooded".
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub snapshot: ChatSnapshot,
}

/// `{"outcome": "answered" | "fallback" | "ignored", "reason"?: .., "snapshot": ..}`
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
    pub snapshot: ChatSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LocationResponse {
    /// Whether this call set the session's location.
    pub applied: bool,
    /// The session's location after the call.
    pub location: Option<LocationContext>,
}

// =============================================================================
// Helpers
// =============================================================================

fn find_session(state: &AppState, id: Uuid) -> Result<Arc<ChatEngine>, ApiError> {
    state
        .session(id)
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", id)))
}

/// Run a submission on its own task so it resolves even if the client
/// goes away, then report the outcome with a fresh snapshot.
async fn run_submission<F, Fut>(
    engine: Arc<ChatEngine>,
    submit: F,
) -> Result<Json<SubmitResponse>, ApiError>
where
    F: FnOnce(Arc<ChatEngine>) -> Fut,
    Fut: Future<Output = SubmitOutcome> + Send + 'static,
{
    let outcome = tokio::spawn(submit(Arc::clone(&engine)))
        .await
        .map_err(|e| ApiError::Internal(format!("submission task failed: {}", e)))?;

    Ok(Json(SubmitResponse {
        outcome,
        snapshot: engine.snapshot(),
    }))
}

// =============================================================================
// Service endpoints
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.session_count(),
    })
}

/// GET /quick-actions - the pre-canned opening questions.
pub async fn quick_actions() -> Json<QuickActionsResponse> {
    Json(QuickActionsResponse {
        quick_actions: QUICK_ACTIONS.iter().map(|a| a.to_string()).collect(),
    })
}

/// GET /flood-status?lat=..&lon=.. - flood prediction for a point.
pub async fn flood_status(
    State(state): State<AppState>,
    Query(params): Query<FloodStatusParams>,
) -> Result<Json<FloodStatusResponse>, ApiError> {
    let (Some(lat), Some(lon)) = (params.lat, params.lon) else {
        return Err(ApiError::BadRequest(
            "query parameters 'lat' and 'lon' are required".to_string(),
        ));
    };
    let coordinates = Coordinates::new(lat, lon)?;

    let status = state.predictor.predict(coordinates).await?;
    Ok(Json(FloodStatusResponse {
        latitude: coordinates.latitude,
        longitude: coordinates.longitude,
        label: status.label().to_string(),
        status,
    }))
}

// =============================================================================
// Sessions
// =============================================================================

/// POST /sessions - start a new conversation.
///
/// Refused with 503 while the server holds its maximum number of sessions.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let (id, engine) = state.create_session().ok_or_else(|| {
        ApiError::ServiceUnavailable("session limit reached, try again later".to_string())
    })?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            id,
            snapshot: engine.snapshot(),
        }),
    ))
}

/// GET /sessions/{id} - current render snapshot.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, ApiError> {
    let engine = find_session(&state, id)?;
    Ok(Json(SessionResponse {
        id,
        snapshot: engine.snapshot(),
    }))
}

/// DELETE /sessions/{id} - discard a conversation.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.remove_session(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("session {} not found", id)))
    }
}

/// POST /sessions/{id}/messages - submit typed input.
pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let engine = find_session(&state, id)?;
    run_submission(engine, move |engine| async move { engine.submit(&body.text).await }).await
}

/// POST /sessions/{id}/follow-ups - replay a suggested follow-up.
pub async fn post_follow_up(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<FollowUpRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let engine = find_session(&state, id)?;
    run_submission(engine, move |engine| async move {
        engine.select_follow_up(&body.question).await
    })
    .await
}

/// POST /sessions/{id}/quick-actions - send one of the pre-canned questions.
///
/// 422 for an unknown action or once the conversation has messages.
pub async fn post_quick_action(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<QuickActionRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    if !QUICK_ACTIONS.contains(&body.action.as_str()) {
        return Err(ApiError::UnprocessableEntity(format!(
            "'{}' is not a quick action",
            body.action
        )));
    }
    let engine = find_session(&state, id)?;
    if !engine.messages().is_empty() {
        return Err(ApiError::UnprocessableEntity(
            "quick actions are only available before the conversation starts".to_string(),
        ));
    }
    run_submission(engine, move |engine| async move {
        engine.select_quick_action(&body.action).await
    })
    .await
}

/// PUT /sessions/{id}/location - bind the session to a location.
///
/// Runs the reverse-geocode lookup once. A session that already has a
/// location keeps it; a failed lookup leaves the session unlocated.
pub async fn put_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<LocationRequest>,
) -> Result<Json<LocationResponse>, ApiError> {
    let engine = find_session(&state, id)?;
    let coordinates = Coordinates::new(body.latitude, body.longitude)?;

    if let Some(existing) = engine.location_context() {
        tracing::debug!(session_id = %id, "Location already bound");
        return Ok(Json(LocationResponse {
            applied: false,
            location: Some(existing),
        }));
    }

    let applied = match locate_once(state.geocoder.as_ref(), coordinates).await {
        Some(ctx) => engine.set_location_context(ctx),
        None => false,
    };

    Ok(Json(LocationResponse {
        applied,
        location: engine.location_context(),
    }))
}
