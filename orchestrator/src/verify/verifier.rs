//! Functional verifier: runs the smoke suite against a deployed service

use std::time::{Duration, Instant};

use reqwest::{header, Client, Response};
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::models::api_spec::ApiSpec;
use crate::models::report::{CheckResult, VerificationReport};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::verify::plan::{plan_suite, CheckBody, CheckKind, PlannedCheck};

const BODY_SNIPPET_CHARS: usize = 200;

/// Why a check failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    Timeout { after: Duration },
    Connection(String),
    Request(String),
    StatusMismatch { expected: u16, actual: u16, body: String },
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckFailure::Timeout { after } => {
                write!(f, "timeout: no response within {}ms", after.as_millis())
            }
            CheckFailure::Connection(e) => write!(f, "connection failed: {}", e),
            CheckFailure::Request(e) => write!(f, "request failed: {}", e),
            CheckFailure::StatusMismatch {
                expected,
                actual,
                body,
            } => {
                if body.is_empty() {
                    write!(f, "expected status {}, got {}", expected, actual)
                } else {
                    write!(f, "expected status {}, got {}: {}", expected, actual, body)
                }
            }
        }
    }
}

/// Scripted HTTP smoke test of one deployed service
#[derive(Debug, Clone)]
pub struct FunctionalVerifier {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl FunctionalVerifier {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, OrchestratorError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run every planned check exactly once, in order, and report
    pub async fn run_full_suite(&self, spec: &ApiSpec, progress: &ProgressSink) -> VerificationReport {
        let plan = plan_suite(spec);
        let total = plan.len();
        let started = Instant::now();
        let mut bearer: Option<String> = None;
        let mut results = Vec::with_capacity(total);

        info!("Running {} checks against {}", total, self.base_url);

        for (i, check) in plan.iter().enumerate() {
            let index = i + 1;
            progress.emit(ProgressEvent::Verifying {
                index,
                total,
                name: check.name.clone(),
                method: check.method.to_string(),
                endpoint: check.endpoint.clone(),
            });

            let (result, token) = self.run_check(check, bearer.as_deref()).await;
            if let Some(token) = token {
                bearer = Some(token);
            }

            progress.emit(ProgressEvent::TestComplete {
                index,
                total,
                name: result.name.clone(),
                passed: result.passed,
                status_code: result.status_code,
                elapsed_ms: result.elapsed_ms,
            });
            results.push(result);
        }

        let report = VerificationReport::from_results(results, started.elapsed().as_millis() as u64);
        if report.passed {
            info!("All {} checks passed", total);
        } else {
            warn!("{} of {} checks failed", report.failed_count(), total);
        }
        report
    }

    /// Run one check; a successful login also yields its bearer token
    async fn run_check(&self, check: &PlannedCheck, bearer: Option<&str>) -> (CheckResult, Option<String>) {
        let url = format!("{}{}", self.base_url, check.endpoint);
        debug!("{} {}", check.method, url);

        let mut request = self.client.request(check.method.clone(), &url);
        if let (Some(token), CheckKind::Create | CheckKind::List) = (bearer, check.kind) {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        request = match &check.body {
            CheckBody::Empty => request,
            CheckBody::Json(body) => request.json(body),
            CheckBody::Form(fields) => request.form(fields),
        };

        let started = Instant::now();
        let outcome = request.send().await;
        let mut status_code = None;
        let mut token = None;

        let failure = match outcome {
            Ok(response) => {
                let status = response.status().as_u16();
                status_code = Some(status);
                if status == check.expected_status {
                    if check.kind == CheckKind::Login {
                        token = access_token(response).await;
                    }
                    None
                } else {
                    Some(CheckFailure::StatusMismatch {
                        expected: check.expected_status,
                        actual: status,
                        body: body_snippet(response).await,
                    })
                }
            }
            Err(e) if e.is_timeout() => Some(CheckFailure::Timeout {
                after: self.request_timeout,
            }),
            Err(e) if e.is_connect() => Some(CheckFailure::Connection(e.to_string())),
            Err(e) => Some(CheckFailure::Request(e.to_string())),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if let Some(failure) = &failure {
            debug!("{} failed: {}", check.name, failure);
        }

        let result = CheckResult {
            name: check.name.clone(),
            endpoint: check.endpoint.clone(),
            method: check.method.to_string(),
            passed: failure.is_none(),
            status_code,
            error_message: failure.map(|f| f.to_string()),
            elapsed_ms,
        };
        (result, token)
    }
}

async fn access_token(response: Response) -> Option<String> {
    let body: serde_json::Value = response.json().await.ok()?;
    body.get("access_token")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}

async fn body_snippet(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();
    if body.chars().count() > BODY_SNIPPET_CHARS {
        let cut: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{}...", cut)
    } else {
        body.to_string()
    }
}
