//! shipcheck library
//!
//! Deploys generated backend projects with `docker compose`, verifies them
//! against their API specification and loops through an external repair
//! collaborator until they pass or the attempt budget is spent.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod models;
pub mod orchestrate;
pub mod progress;
pub mod repair;
pub mod server;
pub mod storage;
pub mod utils;
pub mod verify;
