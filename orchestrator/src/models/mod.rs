//! Data models

pub mod api_spec;
pub mod deployment;
pub mod repair;
pub mod report;
