//! Integration tests for the FloodSafe API.
//!
//! Each test drives its own router over fresh in-memory state with scripted
//! chat replies and static geocoding/prediction services.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use floodsafe_api::handlers::{HealthResponse, QuickActionsResponse, SessionResponse};
use floodsafe_api::{create_router, AppState};
use floodsafe_chat::{
    CompletionService, ReverseGeocoder, ScriptedCompletion, StaticGeocoder, FALLBACK_REPLY,
};
use floodsafe_core::config::PredictionConfig;
use floodsafe_core::types::{Coordinates, FloodStatus, LocationContext};
use floodsafe_core::FloodSafeConfig;
use floodsafe_forecast::{FloodPredictor, PredictionClient, StaticPredictor};

// =============================================================================
// Helpers
// =============================================================================

const REPLY_WITH_FOLLOW_UPS: &str = "<h3>Stay safe</h3><p>Move to higher ground.</p>\
<div class=\"follow-up-section\"><h4>You might also want to know:</h4>\
<ul class=\"follow-up-questions\"><li>Where are shelters?</li><li>What to pack?</li></ul></div>";

fn mumbai() -> LocationContext {
    LocationContext {
        city: Some("Mumbai".to_string()),
        state: Some("Maharashtra".to_string()),
        country: Some("India".to_string()),
        coordinates: Coordinates::new(19.076, 72.8777).unwrap(),
    }
}

fn make_state_with(
    completion: Arc<ScriptedCompletion>,
    geocoder: StaticGeocoder,
    predictor: Arc<dyn FloodPredictor>,
) -> AppState {
    AppState::new(
        FloodSafeConfig::default(),
        completion as Arc<dyn CompletionService>,
        Arc::new(geocoder) as Arc<dyn ReverseGeocoder>,
        predictor,
    )
}

/// Fresh state with the given scripted service, a Mumbai geocoder and a
/// predictor that always answers "Flooded".
fn make_state(completion: ScriptedCompletion) -> (AppState, Arc<ScriptedCompletion>) {
    let completion = Arc::new(completion);
    let state = make_state_with(
        Arc::clone(&completion),
        StaticGeocoder::new(Some(mumbai())),
        Arc::new(StaticPredictor::new(FloodStatus::Flooded)),
    );
    (state, completion)
}

fn make_app(completion: ScriptedCompletion) -> axum::Router {
    create_router(make_state(completion).0)
}

/// Router over default services with custom session limits.
fn make_app_with_limits(max_sessions: usize, session_idle_secs: u64) -> axum::Router {
    let mut config = FloodSafeConfig::default();
    config.server.max_sessions = max_sessions;
    config.server.session_idle_secs = session_idle_secs;
    create_router(AppState::new(
        config,
        Arc::new(ScriptedCompletion::new()) as Arc<dyn CompletionService>,
        Arc::new(StaticGeocoder::default()) as Arc<dyn ReverseGeocoder>,
        Arc::new(StaticPredictor::new(FloodStatus::Flooded)),
    ))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn put_json(uri: &str, json: &str) -> Request<Body> {
    Request::put(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

/// Create a session and return its id.
async fn new_session(app: &axum::Router) -> Uuid {
    let resp = app.clone().oneshot(post_empty("/sessions")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let session: SessionResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    session.id
}

// =============================================================================
// Service endpoints
// =============================================================================

#[tokio::test]
async fn test_health_happy_path() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_sessions, 0);
}

#[tokio::test]
async fn test_quick_actions_listed() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app.oneshot(get("/quick-actions")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: QuickActionsResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.quick_actions.len(), 5);
    assert_eq!(body.quick_actions[1], "Emergency contact numbers");
}

#[tokio::test]
async fn test_flood_status_happy_path() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app
        .oneshot(get("/flood-status?lat=19.07&lon=72.87"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["label"], "Flooded");
    assert_eq!(body["status"], "flooded");
}

#[tokio::test]
async fn test_flood_status_missing_params_returns_400() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app.oneshot(get("/flood-status?lat=19.07")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_flood_status_out_of_range_returns_400() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app
        .oneshot(get("/flood-status?lat=123&lon=10"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_flood_status_upstream_down_returns_503() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);

    let predictor = PredictionClient::new(&PredictionConfig {
        base_url: format!("http://{}", addr),
        timeout_secs: 2,
    })
    .unwrap();
    let state = make_state_with(
        Arc::new(ScriptedCompletion::new()),
        StaticGeocoder::default(),
        Arc::new(predictor),
    );

    let resp = create_router(state)
        .oneshot(get("/flood-status?lat=1&lon=1"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "service_unavailable");
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_create_session_offers_quick_actions() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app.oneshot(post_empty("/sessions")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    let session: SessionResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(session.snapshot.messages.is_empty());
    assert_eq!(session.snapshot.quick_actions.len(), 5);
    assert!(!session.snapshot.busy);
    assert!(session.snapshot.location.is_none());
}

#[tokio::test]
async fn test_get_unknown_session_returns_404() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app
        .oneshot(get(&format!("/sessions/{}", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_get_session_bad_id_returns_400() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app.oneshot(get("/sessions/not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_session() {
    let app = make_app(ScriptedCompletion::new());
    let id = new_session(&app).await;

    let resp = app
        .clone()
        .oneshot(
            Request::delete(format!("/sessions/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .oneshot(get(&format!("/sessions/{}", id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_session_at_limit_returns_503() {
    let app = make_app_with_limits(2, 3600);
    new_session(&app).await;
    new_session(&app).await;

    let resp = app.clone().oneshot(post_empty("/sessions")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "service_unavailable");

    let resp = app.oneshot(get("/health")).await.unwrap();
    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.active_sessions, 2);
}

#[tokio::test]
async fn test_idle_session_evicted_when_new_one_created() {
    let app = make_app_with_limits(10, 0);
    let first = new_session(&app).await;
    let second = new_session(&app).await;

    let resp = app
        .clone()
        .oneshot(get(&format!("/sessions/{}", first)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(get(&format!("/sessions/{}", second)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// =============================================================================
// Submissions
// =============================================================================

#[tokio::test]
async fn test_post_message_answered_with_follow_ups() {
    let app = make_app(ScriptedCompletion::new().reply(REPLY_WITH_FOLLOW_UPS));
    let id = new_session(&app).await;

    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/messages", id),
            r#"{"text": "What should I do during a flood?"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["outcome"], "answered");
    let snapshot = &body["snapshot"];
    assert_eq!(snapshot["messages"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["busy"], false);
    assert_eq!(
        snapshot["follow_ups"],
        serde_json::json!(["Where are shelters?", "What to pack?"])
    );
    assert!(snapshot["quick_actions"].as_array().unwrap().is_empty());

    let assistant = snapshot["messages"][1]["html"].as_str().unwrap();
    assert!(!assistant.contains("follow-up-section"));
}

#[tokio::test]
async fn test_post_blank_message_is_ignored() {
    let (state, completion) = make_state(ScriptedCompletion::new().reply("unused"));
    let app = create_router(state);
    let id = new_session(&app).await;

    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/messages", id),
            r#"{"text": "   "}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["reason"], "empty_input");
    assert!(body["snapshot"]["messages"].as_array().unwrap().is_empty());
    assert!(completion.requests().is_empty());
}

#[tokio::test]
async fn test_post_message_service_failure_returns_fallback() {
    let app = make_app(ScriptedCompletion::new().fail("connection refused"));
    let id = new_session(&app).await;

    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/messages", id),
            r#"{"text": "Help"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body_json(resp).await;
    assert_eq!(body["outcome"], "fallback");
    let html = body["snapshot"]["messages"][1]["html"].as_str().unwrap();
    // Apostrophes pass through the sanitizer untouched.
    assert_eq!(html, FALLBACK_REPLY);
    assert!(body["snapshot"]["follow_ups"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_post_message_to_unknown_session_returns_404() {
    let app = make_app(ScriptedCompletion::new());
    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/messages", Uuid::new_v4()),
            r#"{"text": "hi"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_follow_up_replayed_as_user_turn() {
    let (state, completion) = make_state(
        ScriptedCompletion::new()
            .reply(REPLY_WITH_FOLLOW_UPS)
            .reply("<p>Nearest shelter is the school.</p>"),
    );
    let app = create_router(state);
    let id = new_session(&app).await;

    app.clone()
        .oneshot(post_json(
            &format!("/sessions/{}/messages", id),
            r#"{"text": "flood!"}"#,
        ))
        .await
        .unwrap();

    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/follow-ups", id),
            r#"{"question": "Where are shelters?"}"#,
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["outcome"], "answered");
    assert_eq!(body["snapshot"]["messages"].as_array().unwrap().len(), 4);
    assert!(body["snapshot"]["follow_ups"].as_array().unwrap().is_empty());

    let requests = completion.requests();
    assert_eq!(requests[1].prompt, "Where are shelters?");
    assert_eq!(requests[1].history.len(), 2);
}

#[tokio::test]
async fn test_quick_action_happy_path() {
    let app = make_app(ScriptedCompletion::new().reply("<p>Call 112.</p>"));
    let id = new_session(&app).await;

    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/quick-actions", id),
            r#"{"action": "Emergency contact numbers"}"#,
        ))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["outcome"], "answered");
    assert_eq!(
        body["snapshot"]["messages"][0]["html"],
        "Emergency contact numbers"
    );
}

#[tokio::test]
async fn test_unknown_quick_action_returns_422() {
    let app = make_app(ScriptedCompletion::new());
    let id = new_session(&app).await;

    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/quick-actions", id),
            r#"{"action": "Tell me a joke"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_quick_action_after_conversation_started_returns_422() {
    let (state, completion) = make_state(ScriptedCompletion::new().reply("<p>hi</p>"));
    let app = create_router(state.clone());
    let id = new_session(&app).await;

    let resp = app
        .clone()
        .oneshot(post_json(
            &format!("/sessions/{}/messages", id),
            r#"{"text": "hello"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(post_json(
            &format!("/sessions/{}/quick-actions", id),
            r#"{"action": "Emergency contact numbers"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "unprocessable_entity");

    assert_eq!(state.session(id).unwrap().messages().len(), 2);
    assert_eq!(completion.requests().len(), 1);
}

#[tokio::test]
async fn test_second_message_while_in_flight_is_ignored() {
    let (state, completion) = make_state(ScriptedCompletion::gated().reply("<p>first</p>"));
    let app = create_router(state.clone());
    let id = new_session(&app).await;
    let uri = format!("/sessions/{}/messages", id);

    let first = {
        let app = app.clone();
        let uri = uri.clone();
        tokio::spawn(async move {
            app.oneshot(post_json(&uri, r#"{"text": "first"}"#))
                .await
                .unwrap()
        })
    };

    let engine = state.session(id).unwrap();
    while !engine.is_busy() {
        tokio::task::yield_now().await;
    }

    let resp = app
        .clone()
        .oneshot(post_json(&uri, r#"{"text": "second"}"#))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["outcome"], "ignored");
    assert_eq!(body["reason"], "in_flight");
    assert_eq!(body["snapshot"]["busy"], true);
    assert_eq!(body["snapshot"]["messages"].as_array().unwrap().len(), 1);

    completion.release();
    let body = body_json(first.await.unwrap()).await;
    assert_eq!(body["outcome"], "answered");
    assert_eq!(body["snapshot"]["messages"].as_array().unwrap().len(), 2);
    assert_eq!(completion.requests().len(), 1);
}

#[tokio::test]
async fn test_client_disconnect_mid_request_still_resolves() {
    let (state, completion) = make_state(ScriptedCompletion::gated().reply("<p>late</p>"));
    let app = create_router(state.clone());
    let id = new_session(&app).await;

    let request = {
        let app = app.clone();
        let uri = format!("/sessions/{}/messages", id);
        tokio::spawn(async move { app.oneshot(post_json(&uri, r#"{"text": "hello"}"#)).await })
    };

    let engine = state.session(id).unwrap();
    while !engine.is_busy() {
        tokio::task::yield_now().await;
    }

    // The client goes away while the service call is held.
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());

    completion.release();
    while engine.is_busy() {
        tokio::task::yield_now().await;
    }

    let messages = engine.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].content, "<p>late</p>");
    assert!(!engine.is_busy());
}

// =============================================================================
// Location
// =============================================================================

#[tokio::test]
async fn test_location_first_writer_wins() {
    let (state, completion) = make_state(ScriptedCompletion::new().reply("<p>ok</p>"));
    let app = create_router(state);
    let id = new_session(&app).await;
    let uri = format!("/sessions/{}/location", id);

    let resp = app
        .clone()
        .oneshot(put_json(&uri, r#"{"latitude": 19.076, "longitude": 72.8777}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["applied"], true);
    assert_eq!(body["location"]["city"], "Mumbai");

    let resp = app
        .clone()
        .oneshot(put_json(&uri, r#"{"latitude": 18.52, "longitude": 73.85}"#))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["applied"], false);
    assert_eq!(body["location"]["coordinates"]["latitude"], 19.076);

    app.oneshot(post_json(
        &format!("/sessions/{}/messages", id),
        r#"{"text": "Who do I call?"}"#,
    ))
    .await
    .unwrap();
    assert!(completion.requests()[0]
        .system
        .contains("The user is located in Mumbai, Maharashtra, India."));
}

#[tokio::test]
async fn test_location_lookup_failure_leaves_session_unlocated() {
    let state = make_state_with(
        Arc::new(ScriptedCompletion::new()),
        StaticGeocoder::default(),
        Arc::new(StaticPredictor::new(FloodStatus::NotFlooded)),
    );
    let app = create_router(state);
    let id = new_session(&app).await;

    let resp = app
        .oneshot(put_json(
            &format!("/sessions/{}/location", id),
            r#"{"latitude": 10.0, "longitude": 10.0}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["applied"], false);
    assert!(body["location"].is_null());
}

#[tokio::test]
async fn test_location_invalid_coordinates_returns_400() {
    let app = make_app(ScriptedCompletion::new());
    let id = new_session(&app).await;

    let resp = app
        .oneshot(put_json(
            &format!("/sessions/{}/location", id),
            r#"{"latitude": 95.0, "longitude": 10.0}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
