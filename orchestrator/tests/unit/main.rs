//! Unit test target

mod test_controller;
mod test_fsm;
mod test_health;
mod test_server;
mod test_verifier;
