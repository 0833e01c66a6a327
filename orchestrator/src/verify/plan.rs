//! Smoke check plan derived from an API specification

use reqwest::Method;
use serde_json::{Map, Value};

use crate::models::api_spec::{ApiSpec, EntitySpec};

/// Synthetic account used for the auth flow
pub const TEST_EMAIL: &str = "smoke-test@example.com";
pub const TEST_PASSWORD: &str = "SmokeTest123!";

/// Value written into every non-identifier field
pub const PLACEHOLDER: &str = "test";

/// What a check exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    Health,
    Register,
    Login,
    Create,
    List,
}

/// Request body of a check
#[derive(Debug, Clone, PartialEq)]
pub enum CheckBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// A single planned request with its expected status
#[derive(Debug, Clone)]
pub struct PlannedCheck {
    pub name: String,
    pub kind: CheckKind,
    pub method: Method,
    pub endpoint: String,
    pub body: CheckBody,
    pub expected_status: u16,
}

/// Ordered suite: health, optional auth flow, create/list per entity
pub fn plan_suite(spec: &ApiSpec) -> Vec<PlannedCheck> {
    let mut checks = vec![PlannedCheck {
        name: "health check".to_string(),
        kind: CheckKind::Health,
        method: Method::GET,
        endpoint: "/health".to_string(),
        body: CheckBody::Empty,
        expected_status: 200,
    }];

    if spec.auth.enabled {
        checks.push(PlannedCheck {
            name: "register".to_string(),
            kind: CheckKind::Register,
            method: Method::POST,
            endpoint: spec.auth.register_path.clone(),
            body: CheckBody::Json(serde_json::json!({
                "email": TEST_EMAIL,
                "password": TEST_PASSWORD,
            })),
            expected_status: 201,
        });
        checks.push(PlannedCheck {
            name: "login".to_string(),
            kind: CheckKind::Login,
            method: Method::POST,
            endpoint: spec.auth.login_path.clone(),
            body: CheckBody::Form(vec![
                ("username".to_string(), TEST_EMAIL.to_string()),
                ("password".to_string(), TEST_PASSWORD.to_string()),
            ]),
            expected_status: 200,
        });
    }

    for entity in spec.tested_entities() {
        let path = entity.collection_path();
        checks.push(PlannedCheck {
            name: format!("create {}", entity.name),
            kind: CheckKind::Create,
            method: Method::POST,
            endpoint: path.clone(),
            body: CheckBody::Json(synthesize_payload(entity)),
            expected_status: 201,
        });
        checks.push(PlannedCheck {
            name: format!("list {}", entity.name),
            kind: CheckKind::List,
            method: Method::GET,
            endpoint: path,
            body: CheckBody::Empty,
            expected_status: 200,
        });
    }

    checks
}

/// Minimal creation payload: every non-identifier field set to the placeholder
pub fn synthesize_payload(entity: &EntitySpec) -> Value {
    let fields: Map<String, Value> = entity
        .fields
        .iter()
        .filter(|f| !f.is_identifier())
        .map(|f| (f.name.clone(), Value::String(PLACEHOLDER.to_string())))
        .collect();
    Value::Object(fields)
}
