//! Functional verifier tests

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;

use shipcheck::progress::{self, ProgressEvent};
use shipcheck::verify::verifier::FunctionalVerifier;

use crate::common::{api_spec, closed_port, spawn_service};

fn verifier(base_url: &str) -> FunctionalVerifier {
    FunctionalVerifier::new(base_url, Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_auth_flow_passes() {
    let service = spawn_service().await;
    let (sink, stream) = progress::channel("p1");

    let report = verifier(&service.base_url())
        .run_full_suite(&api_spec(true), &sink)
        .await;
    drop(sink);

    // health + register + login + create/list Item
    assert_eq!(report.results.len(), 5);
    assert!(report.passed, "{:?}", report.results);
    let names: Vec<_> = report.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["health check", "register", "login", "create Item", "list Item"]);

    // The login token reaches entity calls
    assert_eq!(
        service.flags.last_auth.lock().unwrap().as_deref(),
        Some("Bearer tok-123")
    );

    // verifying + test_complete per check
    let events: Vec<_> = stream.map(|r| r.event).collect().await;
    assert_eq!(events.len(), 10);
    assert!(matches!(&events[0], ProgressEvent::Verifying { index: 1, total: 5, .. }));
    assert!(matches!(
        &events[9],
        ProgressEvent::TestComplete { index: 5, total: 5, passed: true, .. }
    ));
}

#[tokio::test]
async fn test_without_auth_every_entity_is_checked() {
    let service = spawn_service().await;

    let report = verifier(&service.base_url())
        .run_full_suite(&api_spec(false), &progress::ProgressSink::discard("p1"))
        .await;

    // health + create/list for User and Item
    assert_eq!(report.results.len(), 5);
    assert!(!report.passed);

    let failed: Vec<_> = report.failed_checks().map(|r| r.endpoint.as_str()).collect();
    assert_eq!(failed, vec!["/users", "/users"]);
    let create_user = &report.results[1];
    assert_eq!(create_user.status_code, Some(404));
    assert!(create_user
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("expected status 201, got 404"));
}

#[tokio::test]
async fn test_status_mismatch_does_not_short_circuit() {
    let service = spawn_service().await;
    service.flags.broken_create.store(true, Ordering::SeqCst);

    let report = verifier(&service.base_url())
        .run_full_suite(&api_spec(true), &progress::ProgressSink::discard("p1"))
        .await;

    assert_eq!(report.results.len(), 5);
    assert_eq!(report.failed_count(), 1);
    let create = &report.results[3];
    assert_eq!(create.method, "POST");
    assert_eq!(create.endpoint, "/items");
    let message = create.error_message.as_deref().unwrap();
    assert!(message.contains("expected status 201, got 500"));
    assert!(message.contains("boom"));
    assert!(report.results[4].passed);
}

#[tokio::test]
async fn test_connection_failures() {
    let port = closed_port().await;

    let report = verifier(&format!("http://127.0.0.1:{}", port))
        .run_full_suite(&api_spec(true), &progress::ProgressSink::discard("p1"))
        .await;

    assert_eq!(report.results.len(), 5);
    assert_eq!(report.failed_count(), 5);
    for result in &report.results {
        assert!(result.status_code.is_none());
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("connection failed"));
    }
}
