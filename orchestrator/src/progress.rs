//! Progress event channel
//!
//! A single ordered stream of lifecycle records per orchestration. The
//! stream is finite: it ends right after a `complete` or `error` record.

use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Phase-tagged progress event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// One line of build/start output
    Building { line: String },

    Starting { app_port: u16 },

    HealthChecking {
        attempt: u32,
        max_attempts: u32,
        elapsed_ms: u64,
        url: String,
    },

    Healthy { elapsed_ms: u64 },

    /// A deploy attempt begins
    Deploying {
        attempt: u32,
        max_attempts: u32,
        project_dir: PathBuf,
    },

    Verifying {
        index: usize,
        total: usize,
        name: String,
        method: String,
        endpoint: String,
    },

    TestComplete {
        index: usize,
        total: usize,
        name: String,
        passed: bool,
        status_code: Option<u16>,
        elapsed_ms: u64,
    },

    Error { kind: String, message: String },

    Complete { success: bool, attempts: u32 },
}

impl ProgressEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }

    /// Human-readable summary
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::Building { line } => line.clone(),
            ProgressEvent::Starting { app_port } => {
                format!("Containers started, app on port {}", app_port)
            }
            ProgressEvent::HealthChecking {
                attempt,
                max_attempts,
                elapsed_ms,
                ..
            } => format!(
                "Health check {}/{} ({}ms elapsed)",
                attempt, max_attempts, elapsed_ms
            ),
            ProgressEvent::Healthy { elapsed_ms } => format!("Service healthy after {}ms", elapsed_ms),
            ProgressEvent::Deploying {
                attempt,
                max_attempts,
                ..
            } => format!("Deploy attempt {}/{}", attempt, max_attempts),
            ProgressEvent::Verifying {
                index,
                total,
                name,
                ..
            } => format!("[{}/{}] {}", index, total, name),
            ProgressEvent::TestComplete {
                index,
                total,
                name,
                passed,
                ..
            } => format!(
                "[{}/{}] {} {}",
                index,
                total,
                name,
                if *passed { "passed" } else { "failed" }
            ),
            ProgressEvent::Error { message, .. } => message.clone(),
            ProgressEvent::Complete { success, attempts } => {
                if *success {
                    format!("Verified after {} attempt(s)", attempts)
                } else {
                    format!("Verification failed after {} attempt(s)", attempts)
                }
            }
        }
    }
}

/// An event stamped with its position in the stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub project_id: String,
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub message: String,
    #[serde(flatten)]
    pub event: ProgressEvent,
}

/// Sending half, cloned into every component of one orchestration
#[derive(Debug, Clone)]
pub struct ProgressSink {
    project_id: Arc<str>,
    seq: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<ProgressRecord>,
}

impl ProgressSink {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Append an event; a dropped consumer is not an error
    pub fn emit(&self, event: ProgressEvent) {
        let record = ProgressRecord {
            project_id: self.project_id.to_string(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            at: Utc::now(),
            message: event.message(),
            event,
        };
        let _ = self.tx.send(record);
    }

    /// A sink whose events go nowhere
    pub fn discard(project_id: &str) -> Self {
        let (sink, _stream) = channel(project_id);
        sink
    }
}

/// Receiving half; yields records until the terminal one
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<ProgressRecord>,
    finished: bool,
}

impl Stream for ProgressStream {
    type Item = ProgressRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(record)) => {
                if record.event.is_terminal() {
                    self.finished = true;
                    self.rx.close();
                }
                Poll::Ready(Some(record))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a progress channel for one project
pub fn channel(project_id: &str) -> (ProgressSink, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSink {
            project_id: Arc::from(project_id),
            seq: Arc::new(AtomicU64::new(0)),
            tx,
        },
        ProgressStream { rx, finished: false },
    )
}
