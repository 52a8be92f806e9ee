//! HTTP API tests.
//!
//! Requests go straight into the router with `oneshot`; no socket is bound.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use session_planner::catalog::Catalog;
use session_planner::health::HealthState;
use session_planner::plan::{MemorySnapshotStore, SnapshotStore};
use session_planner::{AppState, create_router};

use crate::common::manager_with;

struct TestApp {
    router: Router,
    store: Arc<MemorySnapshotStore>,
    health: Arc<HealthState>,
}

fn app(sessions: u16) -> TestApp {
    let store = Arc::new(MemorySnapshotStore::new());
    let health = Arc::new(HealthState::new());
    let manager = manager_with(Catalog::builtin(), sessions).with_unit_price(5000);
    let state = AppState::new(manager, store.clone(), Some(health.clone()));
    TestApp {
        router: create_router(Arc::new(state)),
        store,
        health,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_get_catalog() {
    let app = app(5);
    let (status, body) = send(&app, Method::GET, "/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topics"].as_array().unwrap().len(), 4);
    assert_eq!(body["session_packs"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_get_empty_plan() {
    let app = app(5);
    let (status, body) = send(&app, Method::GET, "/plan", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots"].as_array().unwrap().len(), 5);
    assert_eq!(body["usage"]["free"], 5);
    assert_eq!(body["price"]["total_minor"], 22500);
    assert_eq!(body["next_free"], 0);
}

#[tokio::test]
async fn test_add_topic_commits_and_persists() {
    let app = app(5);
    let (status, body) = send(
        &app,
        Method::POST,
        "/plan/topics",
        Some(json!({"key": "portfolio-film"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "committed");
    assert_eq!(body["change"]["events"][0]["kind"], "placed");
    assert_eq!(body["plan"]["usage"]["occupied"], 2);
    assert_eq!(body["plan"]["slots"][1]["occupancy"]["offset"], 1);
    assert_eq!(body["plan"]["slots"][1]["occupancy"]["total_sessions"], 2);

    let saved = app.store.load().unwrap().unwrap();
    assert_eq!(saved.state.occupied_count(), 2);

    let metrics = app.health.metrics.encode();
    assert!(metrics.contains("session_planner_slots_occupied 2"));
}

#[tokio::test]
async fn test_duplicate_topic_conflict() {
    let app = app(5);
    let body = json!({"key": "fmod-basics"});
    send(&app, Method::POST, "/plan/topics", Some(body.clone())).await;
    let (status, error) = send(&app, Method::POST, "/plan/topics", Some(body)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "duplicate_topic");
    assert!(error["message"].as_str().unwrap().contains("fmod-basics"));

    let metrics = app.health.metrics.encode();
    assert!(metrics.contains("outcome=\"duplicate_topic\""));
}

#[tokio::test]
async fn test_invalid_and_unknown_keys() {
    let app = app(5);
    let (status, error) = send(
        &app,
        Method::POST,
        "/plan/topics",
        Some(json!({"key": "Not A Key"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], "invalid_key");

    let (status, error) = send(
        &app,
        Method::POST,
        "/plan/topics",
        Some(json!({"key": "orchestration-101"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "unknown_topic");
}

#[tokio::test]
async fn test_repeatable_confirmation_flow() {
    let app = app(5);
    let feedback = json!({"key": "feedback-session"});
    send(&app, Method::POST, "/plan/topics", Some(feedback.clone())).await;

    let (status, body) = send(&app, Method::POST, "/plan/topics", Some(feedback)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "needs_confirmation");
    assert_eq!(body["existing"], 1);
    assert_eq!(body["plan"]["pending_confirmation"], "feedback-session");

    let (status, body) = send(&app, Method::POST, "/plan/topics/confirm", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"]["usage"]["occupied"], 2);

    let (status, error) = send(&app, Method::POST, "/plan/topics/cancel", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "no_pending_confirmation");
}

#[tokio::test]
async fn test_toggle_round_trip() {
    let app = app(5);
    let body = json!({"key": "spotting-a-film"});

    let (_, added) = send(&app, Method::POST, "/plan/toggle", Some(body.clone())).await;
    assert_eq!(added["action"], "proposed");
    assert_eq!(added["outcome"]["status"], "committed");

    let (_, removed) = send(&app, Method::POST, "/plan/toggle", Some(body)).await;
    assert_eq!(removed["action"], "removed");
    assert_eq!(removed["plan"]["usage"]["occupied"], 0);
}

#[tokio::test]
async fn test_instance_routes() {
    let app = app(5);
    send(
        &app,
        Method::POST,
        "/plan/pathway",
        Some(json!({"name": "Film Portfolio"})),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/plan/instances/1/move",
        Some(json!({"to": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"]["slots"][3]["occupancy"]["topic"], "portfolio-film");

    let (status, body) = send(
        &app,
        Method::POST,
        "/plan/swap",
        Some(json!({"a": 0, "b": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"]["slots"][0]["occupancy"]["topic"], "portfolio-film");
    assert_eq!(body["plan"]["slots"][3]["occupancy"]["topic"], "spotting-a-film");
    assert!(body["plan"]["slots"][4]["occupancy"].is_null());

    let (status, _) = send(&app, Method::DELETE, "/plan/instances/3", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, error) = send(&app, Method::DELETE, "/plan/instances/3", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "instance_not_found");
}

#[tokio::test]
async fn test_pathway_too_large_is_unprocessable() {
    let app = app(1);
    let (status, error) = send(
        &app,
        Method::POST,
        "/plan/pathway",
        Some(json!({"name": "Film Portfolio"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"], "pathway_exceeds_capacity");
}

#[tokio::test]
async fn test_select_pack_and_reset() {
    let app = app(5);
    let (status, body) = send(
        &app,
        Method::PUT,
        "/plan/pack",
        Some(json!({"sessions": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["capacity"]["to"], 10);
    assert_eq!(body["plan"]["price"]["total_minor"], 40000);

    let (status, error) = send(
        &app,
        Method::PUT,
        "/plan/pack",
        Some(json!({"sessions": 3})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "unknown_session_pack");

    send(
        &app,
        Method::POST,
        "/plan/pathway",
        Some(json!({"name": "Entrance Exam Prep"})),
    )
    .await;
    let (status, body) = send(&app, Method::POST, "/plan/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"]["usage"]["occupied"], 0);
    assert!(body["plan"]["pathway"].is_null());
}
