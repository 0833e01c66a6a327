//! Local HTTP server tests

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use shipcheck::app::options::AppOptions;
use shipcheck::app::state::AppState;
use shipcheck::server::serve::router;
use shipcheck::server::state::ServerState;

use crate::common::{api_spec, fast_health, ports_for, project_dir, spawn_service, FakeEngine, FakeRepair, RecordingSink};

fn app(app_port: u16) -> (Router, Arc<AppState>) {
    let mut options = AppOptions::default();
    options.ports = ports_for(app_port);
    options.health = fast_health();
    options.controller.service_host = "127.0.0.1".to_string();
    options.controller.verifier_timeout = Duration::from_secs(2);

    let state = AppState::with_parts(
        &options,
        Arc::new(FakeEngine::default()),
        Arc::new(FakeRepair::new(5)),
        Arc::new(RecordingSink::default()),
    )
    .unwrap();
    let state = Arc::new(state);
    let server_state = Arc::new(ServerState::new(state.orchestrator.clone()));
    (router(server_state), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_and_version() {
    let (app, _state) = app(8001);

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "shipcheck");

    let (status, body) = send(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_stop_unknown_deployment() {
    let (app, _state) = app(8001);

    let (status, _) = send(&app, Method::DELETE, "/deployments/nope", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, "/deployments", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_verification_round_trip() {
    let service = spawn_service().await;
    let (app, _state) = app(service.port());
    let project = project_dir();

    let request = json!({
        "project_id": "web-1",
        "project_dir": project.path(),
        "api_spec": api_spec(true),
    });
    let (status, body) = send(&app, Method::POST, "/verifications", Some(request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["success"], true);
    assert_eq!(body["outcome"]["attempts"], 1);
    assert_eq!(body["outcome"]["report"]["results"][0]["test_name"], "health check");
    assert!(body.get("error").is_none());

    let events = body["events"].as_array().unwrap();
    assert_eq!(events[0]["phase"], "deploying");
    assert_eq!(events.last().unwrap()["phase"], "complete");
    assert!(events.iter().all(|e| e["project_id"] == "web-1"));

    let (_, body) = send(&app, Method::GET, "/deployments", None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["deployments"][0]["status"], "healthy");

    let (status, _) = send(&app, Method::DELETE, "/deployments/web-1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/deployments", None).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_exhausted_verification_reports_error_kind() {
    let service = spawn_service().await;
    service.flags.broken_create.store(true, Ordering::SeqCst);
    let (app, _state) = app(service.port());
    let project = project_dir();

    let request = json!({
        "project_id": "web-3",
        "project_dir": project.path(),
        "api_spec": api_spec(false),
    });
    let (status, body) = send(&app, Method::POST, "/verifications", Some(request)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["success"], false);
    assert_eq!(body["outcome"]["attempts"], 3);
    assert_eq!(body["error"]["kind"], "attempts_exhausted");
    assert_eq!(body["events"].as_array().unwrap().last().unwrap()["phase"], "complete");
}

#[tokio::test]
async fn test_verification_error_body() {
    let (app, _state) = app(8001);
    let empty = tempfile::tempdir().unwrap();

    let request = json!({
        "project_id": "web-2",
        "project_dir": empty.path(),
        "api_spec": {"entities": []},
    });
    let (status, body) = send(&app, Method::POST, "/verifications", Some(request)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "missing_manifest");
    assert!(body.get("outcome").is_none());
    assert_eq!(body["events"].as_array().unwrap().last().unwrap()["phase"], "error");
}
