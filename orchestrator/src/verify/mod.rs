//! Functional verification

pub mod plan;
pub mod verifier;
