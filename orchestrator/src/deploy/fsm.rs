//! Finite State Machine for a project's container deployment

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Registered, nothing built yet
    NotStarted,

    /// Image build and container start in progress
    Building,

    /// Containers started, not yet probed
    Starting,

    /// Polling the health endpoint
    HealthChecking,

    /// Health endpoint answered
    Healthy,

    /// Functional checks running
    Verifying,

    /// Build, health or verification failed
    Failed,

    /// Containers torn down
    Stopped,
}

impl DeploymentStatus {
    /// Whether an operation currently owns the deployment
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Building
                | DeploymentStatus::Starting
                | DeploymentStatus::HealthChecking
                | DeploymentStatus::Verifying
        )
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Start build-and-up
    Build,

    /// Engine reported success
    BuildSucceeded,

    /// Engine reported failure
    BuildFailed(String),

    /// Start health polling
    ProbeHealth,

    /// Health endpoint answered 2xx
    HealthPassed,

    /// Health polling gave up
    HealthTimedOut(String),

    /// Start functional checks
    Verify,

    /// Every check passed
    VerifyPassed,

    /// At least one check failed
    VerifyFailed(String),

    /// Tear down
    Stop,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
    attempts: u32,
}

impl DeploymentFsm {
    /// Create a new FSM in the not-started state
    pub fn new() -> Self {
        Self {
            state: DeploymentStatus::NotStarted,
            error: None,
            attempts: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of builds started
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, String> {
        use DeploymentStatus as S;

        let new_state = match (self.state, &event) {
            // Any idle state may (re)build
            (S::NotStarted | S::Healthy | S::Failed | S::Stopped, DeploymentEvent::Build) => {
                self.error = None;
                self.attempts += 1;
                S::Building
            }

            // From Building
            (S::Building, DeploymentEvent::BuildSucceeded) => S::Starting,
            (S::Building, DeploymentEvent::BuildFailed(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            // From Starting
            (S::Starting, DeploymentEvent::ProbeHealth) => S::HealthChecking,

            // From HealthChecking
            (S::HealthChecking, DeploymentEvent::HealthPassed) => S::Healthy,
            (S::HealthChecking, DeploymentEvent::HealthTimedOut(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            // From Healthy
            (S::Healthy, DeploymentEvent::Verify) => S::Verifying,

            // From Verifying
            (S::Verifying, DeploymentEvent::VerifyPassed) => S::Healthy,
            (S::Verifying, DeploymentEvent::VerifyFailed(err)) => {
                self.error = Some(err.clone());
                S::Failed
            }

            // Teardown is always allowed
            (_, DeploymentEvent::Stop) => S::Stopped,

            // Invalid transitions
            (state, event) => {
                return Err(format!("{:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
