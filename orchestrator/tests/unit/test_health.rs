//! Health prober tests

use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;

use shipcheck::deploy::health::HealthProber;
use shipcheck::errors::OrchestratorError;
use shipcheck::progress::{self, ProgressEvent};

use crate::common::{closed_port, fast_health, spawn_service};

#[tokio::test]
async fn test_healthy_on_first_attempt() {
    let service = spawn_service().await;
    let prober = HealthProber::new("127.0.0.1", fast_health()).unwrap();
    let (sink, stream) = progress::channel("p1");

    prober.wait(service.port(), &sink).await.unwrap();
    drop(sink);

    let events: Vec<_> = stream.map(|r| r.event).collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ProgressEvent::HealthChecking { attempt: 1, max_attempts: 3, .. }
    ));
}

#[tokio::test]
async fn test_non_2xx_is_not_healthy() {
    let service = spawn_service().await;
    service.flags.unhealthy.store(true, Ordering::SeqCst);
    let prober = HealthProber::new("127.0.0.1", fast_health()).unwrap();
    let (sink, stream) = progress::channel("p1");

    let err = prober
        .wait_for_health(service.port(), 2, Duration::from_millis(10), &sink)
        .await
        .unwrap_err();
    drop(sink);

    match err {
        OrchestratorError::HealthTimeout { url, attempts, .. } => {
            assert_eq!(attempts, 2);
            assert_eq!(url, format!("http://127.0.0.1:{}/health", service.port()));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stream.count().await, 2);
}

#[tokio::test]
async fn test_connection_refused_times_out() {
    let port = closed_port().await;
    let prober = HealthProber::new("127.0.0.1", fast_health()).unwrap();

    let err = prober
        .wait(port, &progress::ProgressSink::discard("p1"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::HealthTimeout { attempts: 3, .. }));
}

#[tokio::test]
async fn test_becomes_healthy_later() {
    let service = spawn_service().await;
    service.flags.unhealthy.store(true, Ordering::SeqCst);
    let flags = service.flags.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flags.unhealthy.store(false, Ordering::SeqCst);
    });

    let prober = HealthProber::new("127.0.0.1", fast_health()).unwrap();
    let elapsed = prober
        .wait_for_health(service.port(), 20, Duration::from_millis(20), &progress::ProgressSink::discard("p1"))
        .await
        .unwrap();
    assert!(elapsed >= Duration::from_millis(20));
}
