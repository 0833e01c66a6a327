//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::compose::PortMap;
use crate::deploy::engine::DEFAULT_TAIL_BYTES;
use crate::deploy::health::HealthOptions;
use crate::orchestrate::ControllerOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Backend connection
    pub backend: BackendOptions,

    /// Host port reservations
    pub ports: PortMap,

    /// Health polling
    pub health: HealthOptions,

    /// Retry/repair loop
    pub controller: ControllerOptions,

    /// Bytes of build output kept for failure reports
    pub build_tail_bytes: usize,

    /// Server configuration
    pub server: ServerOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            backend: BackendOptions::default(),
            ports: PortMap::default(),
            health: HealthOptions::default(),
            controller: ControllerOptions::default(),
            build_tail_bytes: DEFAULT_TAIL_BYTES,
            server: ServerOptions::default(),
            layout: StorageLayout::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl AppOptions {
    /// Options derived from a settings file
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        let defaults = Self::default();
        Self {
            backend: BackendOptions {
                base_url: settings.backend.base_url.clone().filter(|url| !url.is_empty()),
                api_token: settings.backend.api_token.clone(),
                timeout: settings
                    .backend
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.backend.timeout),
            },
            ports: PortMap {
                app_port: settings.ports.app_port,
                db_port: settings.ports.db_port,
                ..defaults.ports
            },
            health: HealthOptions {
                max_attempts: settings.health.max_attempts.max(1),
                interval: Duration::from_secs(settings.health.interval_secs),
                request_timeout: Duration::from_secs(settings.health.request_timeout_secs),
            },
            controller: ControllerOptions {
                max_attempts: settings.verification.max_attempts,
                service_host: settings.verification.service_host.clone(),
                verifier_timeout: Duration::from_secs(settings.verification.request_timeout_secs),
                temp_root: settings
                    .verification
                    .temp_root
                    .as_ref()
                    .filter(|root| !root.is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| defaults.controller.temp_root.clone()),
            },
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            layout,
            ..defaults
        }
    }
}

/// Backend connection options
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Base URL; `None` runs without repair
    pub base_url: Option<String>,

    pub api_token: Option<String>,

    pub timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7300,
        }
    }
}
