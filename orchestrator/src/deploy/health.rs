//! Health readiness prober

use std::time::{Duration, Instant};

use reqwest::Client;
use tracing::{debug, info};

use crate::errors::OrchestratorError;
use crate::progress::{ProgressEvent, ProgressSink};

/// Health polling settings
#[derive(Debug, Clone, Copy)]
pub struct HealthOptions {
    /// Polls before giving up
    pub max_attempts: u32,

    /// Spacing between polls
    pub interval: Duration,

    /// Timeout of a single poll
    pub request_timeout: Duration,
}

impl Default for HealthOptions {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Polls `GET /health` until it answers 2xx
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: Client,
    host: String,
    options: HealthOptions,
}

impl HealthProber {
    pub fn new(host: &str, options: HealthOptions) -> Result<Self, OrchestratorError> {
        let client = Client::builder().timeout(options.request_timeout).build()?;
        Ok(Self {
            client,
            host: host.to_string(),
            options,
        })
    }

    pub fn options(&self) -> &HealthOptions {
        &self.options
    }

    pub fn health_url(&self, port: u16) -> String {
        format!("http://{}:{}/health", self.host, port)
    }

    /// Wait using the configured attempt budget and interval
    pub async fn wait(&self, port: u16, progress: &ProgressSink) -> Result<Duration, OrchestratorError> {
        self.wait_for_health(port, self.options.max_attempts, self.options.interval, progress)
            .await
    }

    /// Wait until the service on `port` is healthy, returning the time it took
    pub async fn wait_for_health(
        &self,
        port: u16,
        max_attempts: u32,
        interval: Duration,
        progress: &ProgressSink,
    ) -> Result<Duration, OrchestratorError> {
        let url = self.health_url(port);
        let max_attempts = max_attempts.max(1);
        let started = Instant::now();

        for attempt in 1..=max_attempts {
            progress.emit(ProgressEvent::HealthChecking {
                attempt,
                max_attempts,
                elapsed_ms: started.elapsed().as_millis() as u64,
                url: url.clone(),
            });

            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let elapsed = started.elapsed();
                    info!("{} healthy after {} attempt(s), {:?}", url, attempt, elapsed);
                    return Ok(elapsed);
                }
                Ok(response) => {
                    debug!("{} answered {} (attempt {})", url, response.status(), attempt);
                }
                Err(e) => {
                    // Refused/reset while the container is still starting
                    debug!("{} not reachable (attempt {}): {}", url, attempt, e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        Err(OrchestratorError::HealthTimeout {
            url,
            attempts: max_attempts,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}
