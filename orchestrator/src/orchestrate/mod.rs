//! Retry/repair orchestration

pub mod controller;
pub mod guard;
pub mod state;

pub use controller::{ControllerOptions, Orchestrator, VerifyOutcome, VerifyRequest};
