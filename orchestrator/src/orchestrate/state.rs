//! Retry/repair loop state machine

use serde::Serialize;

use crate::errors::OrchestratorError;

/// Deploy-verify-repair cycles per orchestration
pub const MAX_ATTEMPTS: u32 = 3;

/// Loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Attempt `n`, 1-based
    Attempt(u32),
    Succeeded,
    ExhaustedFailed,
}

/// What follows a verified (or unhealthy) attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Succeeded { attempts: u32 },
    /// Attempt `attempt` failed and a later one is still allowed
    NeedsRepair { attempt: u32 },
    Exhausted { attempts: u32 },
}

/// Bounded attempt counter with typed transitions
#[derive(Debug, Clone)]
pub struct RepairLoop {
    state: LoopState,
    max_attempts: u32,
}

impl RepairLoop {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: LoopState::Attempt(1),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Current attempt number
    pub fn attempt(&self) -> Result<u32, OrchestratorError> {
        match self.state {
            LoopState::Attempt(n) => Ok(n),
            state => Err(OrchestratorError::InvalidTransition(format!(
                "no attempt in progress ({:?})",
                state
            ))),
        }
    }

    /// Record the outcome of the current attempt
    pub fn record(&mut self, passed: bool) -> Result<Verdict, OrchestratorError> {
        let n = self.attempt()?;
        let verdict = if passed {
            self.state = LoopState::Succeeded;
            Verdict::Succeeded { attempts: n }
        } else if n >= self.max_attempts {
            self.state = LoopState::ExhaustedFailed;
            Verdict::Exhausted { attempts: n }
        } else {
            Verdict::NeedsRepair { attempt: n }
        };
        Ok(verdict)
    }

    /// Move to the next attempt once repaired code is available
    pub fn advance(&mut self) -> Result<u32, OrchestratorError> {
        match self.state {
            LoopState::Attempt(n) if n < self.max_attempts => {
                self.state = LoopState::Attempt(n + 1);
                Ok(n + 1)
            }
            state => Err(OrchestratorError::InvalidTransition(format!(
                "cannot advance from {:?}",
                state
            ))),
        }
    }
}
