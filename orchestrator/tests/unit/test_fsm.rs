//! FSM unit tests

use shipcheck::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentStatus};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentStatus::NotStarted);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.attempts(), 0);
}

#[test]
fn test_fsm_verified_flow() {
    let mut fsm = DeploymentFsm::new();

    // NotStarted -> Building -> Starting
    fsm.process(DeploymentEvent::Build).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Building);
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Starting);

    // Starting -> HealthChecking -> Healthy
    fsm.process(DeploymentEvent::ProbeHealth).unwrap();
    fsm.process(DeploymentEvent::HealthPassed).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Healthy);

    // Healthy -> Verifying -> Healthy
    fsm.process(DeploymentEvent::Verify).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Verifying);
    fsm.process(DeploymentEvent::VerifyPassed).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Healthy);
    assert_eq!(fsm.attempts(), 1);
}

#[test]
fn test_fsm_failed_verification_then_rebuild() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::Build).unwrap();
    fsm.process(DeploymentEvent::BuildSucceeded).unwrap();
    fsm.process(DeploymentEvent::ProbeHealth).unwrap();
    fsm.process(DeploymentEvent::HealthPassed).unwrap();
    fsm.process(DeploymentEvent::Verify).unwrap();
    fsm.process(DeploymentEvent::VerifyFailed("1 of 5 checks failed".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentStatus::Failed);
    assert_eq!(fsm.error(), Some("1 of 5 checks failed"));

    // Stop for repair, then rebuild
    fsm.process(DeploymentEvent::Stop).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Stopped);
    fsm.process(DeploymentEvent::Build).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Building);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.attempts(), 2);
}

#[test]
fn test_fsm_rejects_out_of_order_events() {
    let mut fsm = DeploymentFsm::new();
    assert!(fsm.process(DeploymentEvent::HealthPassed).is_err());
    assert!(fsm.process(DeploymentEvent::Verify).is_err());

    fsm.process(DeploymentEvent::Build).unwrap();
    assert!(fsm.process(DeploymentEvent::Build).is_err());
    assert_eq!(fsm.state(), DeploymentStatus::Building);
}

#[test]
fn test_fsm_stop_from_any_state() {
    let mut fsm = DeploymentFsm::new();
    fsm.process(DeploymentEvent::Build).unwrap();
    fsm.process(DeploymentEvent::Stop).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Stopped);
    assert!(!fsm.state().is_active());
}
