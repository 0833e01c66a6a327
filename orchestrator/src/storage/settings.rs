//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to daily files under the storage directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Generation backend (repair and report submission)
    #[serde(default)]
    pub backend: BackendSettings,

    /// Host port reservations
    #[serde(default)]
    pub ports: PortSettings,

    /// Health polling
    #[serde(default)]
    pub health: HealthSettings,

    /// Smoke verification and the repair loop
    #[serde(default)]
    pub verification: VerificationSettings,

    /// Local HTTP server
    #[serde(default)]
    pub server: ServerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            backend: BackendSettings::default(),
            ports: PortSettings::default(),
            health: HealthSettings::default(),
            verification: VerificationSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

/// Backend API settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the backend API; without one repairs are unavailable
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token sent with every backend request
    #[serde(default)]
    pub api_token: Option<String>,

    /// Timeout of a backend request in seconds (repairs can be slow)
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: Option<u64>,
}

fn default_backend_timeout() -> Option<u64> {
    Some(600)
}

/// Host port reservations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSettings {
    #[serde(default = "default_app_port")]
    pub app_port: u16,

    #[serde(default = "default_db_port")]
    pub db_port: u16,
}

fn default_app_port() -> u16 {
    8001
}

fn default_db_port() -> u16 {
    5433
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            app_port: default_app_port(),
            db_port: default_db_port(),
        }
    }
}

/// Health polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_health_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_health_timeout")]
    pub request_timeout_secs: u64,
}

fn default_health_attempts() -> u32 {
    30
}

fn default_health_interval() -> u64 {
    2
}

fn default_health_timeout() -> u64 {
    5
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_health_attempts(),
            interval_secs: default_health_interval(),
            request_timeout_secs: default_health_timeout(),
        }
    }
}

/// Verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSettings {
    /// Deploy-verify-repair cycles, capped at 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout of a single smoke check in seconds
    #[serde(default = "default_check_timeout")]
    pub request_timeout_secs: u64,

    /// Host the deployed services are reached on
    #[serde(default = "default_service_host")]
    pub service_host: String,

    /// Directory under which repaired trees may be removed; system temp dir when unset
    #[serde(default)]
    pub temp_root: Option<String>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_check_timeout() -> u64 {
    10
}

fn default_service_host() -> String {
    "localhost".to_string()
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_check_timeout(),
            service_host: default_service_host(),
            temp_root: None,
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    7300
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
