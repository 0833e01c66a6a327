//! Composition descriptor discovery and host port patching

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::filesys::file::File;

/// Descriptor file names, in lookup order
pub const MANIFEST_NAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

const LOOPBACK_HOSTS: [&str; 4] = ["127.0.0.1", "localhost", "::1", "[::1]"];

/// Locate the composition descriptor of a project
pub async fn find_manifest(project_dir: &Path) -> Result<PathBuf, OrchestratorError> {
    for name in MANIFEST_NAMES {
        let file = File::new(project_dir.join(name));
        if file.exists().await {
            return Ok(file.path().to_path_buf());
        }
    }
    Err(OrchestratorError::MissingManifest {
        dir: project_dir.to_path_buf(),
    })
}

/// Fixed host port remapping of one orchestrator instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMap {
    pub default_app_port: u16,
    pub app_port: u16,
    pub default_db_port: u16,
    pub db_port: u16,
}

impl Default for PortMap {
    fn default() -> Self {
        Self {
            default_app_port: 8000,
            app_port: 8001,
            default_db_port: 5432,
            db_port: 5433,
        }
    }
}

/// Result of patching a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    pub text: String,
    pub app_bindings: usize,
    pub db_bindings: usize,
}

/// Which service port a binding belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    App,
    Db,
}

/// Rewrites default host port bindings to the reserved ports
#[derive(Debug, Clone)]
pub struct ComposePatcher {
    ports: PortMap,
}

impl ComposePatcher {
    pub fn new(ports: PortMap) -> Self {
        Self { ports }
    }

    pub fn ports(&self) -> &PortMap {
        &self.ports
    }

    /// Patch the descriptor file in place
    pub async fn patch_file(&self, path: &Path) -> Result<Patched, OrchestratorError> {
        let file = File::new(path);
        let original = file.read_string().await?;
        let patched = self.patch_str(&original, path)?;

        if patched.text != original {
            file.write_string(&patched.text).await?;
            info!(
                "Patched {} ({} app, {} db bindings)",
                path.display(),
                patched.app_bindings,
                patched.db_bindings
            );
        } else {
            debug!("{} already patched", path.display());
        }
        Ok(patched)
    }

    /// Patch descriptor text.
    ///
    /// Bindings whose host side is either the default or the reserved port are
    /// rewritten to the reserved port, so applying the patch twice is the same
    /// as applying it once. The application binding must be present.
    pub fn patch_str(&self, text: &str, source: &Path) -> Result<Patched, OrchestratorError> {
        let mut doc: Value = serde_yaml::from_str(text)?;
        let mut app_bindings = 0;
        let mut db_bindings = 0;

        if let Some(services) = doc.get_mut("services").and_then(Value::as_mapping_mut) {
            for (name, service) in services.iter_mut() {
                let Some(ports) = service.get_mut("ports").and_then(Value::as_sequence_mut) else {
                    continue;
                };
                for entry in ports.iter_mut() {
                    match self.patch_entry(entry) {
                        Some(Role::App) => app_bindings += 1,
                        Some(Role::Db) => db_bindings += 1,
                        None => {}
                    }
                }
                debug!("Service {:?}: ports {:?}", name.as_str(), ports);
            }
        }

        if app_bindings == 0 {
            return Err(OrchestratorError::PortBindingNotFound {
                file: source.to_path_buf(),
                port: self.ports.default_app_port,
            });
        }
        if db_bindings == 0 {
            warn!(
                "No {}:{} binding in {}, database port left unpublished",
                self.ports.default_db_port,
                self.ports.default_db_port,
                source.display()
            );
        }

        Ok(Patched {
            text: serde_yaml::to_string(&doc)?,
            app_bindings,
            db_bindings,
        })
    }

    fn classify(&self, host: u16, container: u16) -> Option<Role> {
        let p = &self.ports;
        if container == p.default_app_port && (host == p.default_app_port || host == p.app_port) {
            Some(Role::App)
        } else if container == p.default_db_port && (host == p.default_db_port || host == p.db_port) {
            Some(Role::Db)
        } else {
            None
        }
    }

    fn patch_entry(&self, entry: &mut Value) -> Option<Role> {
        match entry {
            Value::String(binding) => {
                let (patched, role) = self.patch_short(binding)?;
                *binding = patched;
                Some(role)
            }
            Value::Mapping(long) => self.patch_long(long),
            _ => None,
        }
    }

    /// `[ip:]host:container[/proto]`
    fn patch_short(&self, binding: &str) -> Option<(String, Role)> {
        let (spec, proto) = match binding.split_once('/') {
            Some((spec, proto)) => (spec, Some(proto)),
            None => (binding, None),
        };

        let mut parts = spec.rsplitn(3, ':');
        let container: u16 = parts.next()?.trim().parse().ok()?;
        let host: u16 = parts.next()?.trim().parse().ok()?;
        let ip = parts.next();

        let role = self.classify(host, container)?;
        let proto = proto.map(|p| format!("/{}", p)).unwrap_or_default();
        let patched = match (role, ip) {
            (Role::App, Some(ip)) => format!("{}:{}:{}{}", ip, self.ports.app_port, container, proto),
            (Role::App, None) => format!("{}:{}{}", self.ports.app_port, container, proto),
            // Never pinned to a host address
            (Role::Db, _) => format!("{}:{}{}", self.ports.db_port, container, proto),
        };
        Some((patched, role))
    }

    /// `{target, published, host_ip}`
    fn patch_long(&self, long: &mut Mapping) -> Option<Role> {
        let container = port_value(long.get("target")?)?;
        let published = long.get("published")?;
        let host = port_value(published)?;
        let role = self.classify(host, container)?;

        let new_port = match role {
            Role::App => self.ports.app_port,
            Role::Db => self.ports.db_port,
        };
        let value = match published {
            Value::String(_) => Value::String(new_port.to_string()),
            _ => Value::Number(new_port.into()),
        };
        long.insert(Value::String("published".to_string()), value);

        if role == Role::Db {
            let loopback = long
                .get("host_ip")
                .and_then(Value::as_str)
                .is_some_and(|ip| LOOPBACK_HOSTS.contains(&ip));
            if loopback {
                long.remove("host_ip");
            }
        }
        Some(role)
    }
}

fn port_value(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
