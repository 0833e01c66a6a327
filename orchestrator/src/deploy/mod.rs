//! Container deployment

pub mod compose;
pub mod engine;
pub mod fsm;
pub mod health;
pub mod lifecycle;
pub mod registry;
