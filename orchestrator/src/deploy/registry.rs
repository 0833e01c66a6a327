//! Registry of deployments keyed by project id
//!
//! Each project id owns one slot. Work on a slot happens under a lease; a
//! second lease for the same id is refused while the first is held, so
//! operations on one project are serialized while distinct projects proceed
//! independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::deploy::compose::PortMap;
use crate::deploy::fsm::{DeploymentEvent, DeploymentStatus};
use crate::errors::OrchestratorError;
use crate::models::deployment::{Deployment, DeploymentSnapshot};

struct Slot {
    gate: Arc<Mutex<()>>,
    deployment: RwLock<Deployment>,
}

/// Exclusive access to one project's deployment
pub struct DeploymentLease {
    project_id: String,
    slot: Arc<Slot>,
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for DeploymentLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentLease")
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl DeploymentLease {
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub async fn status(&self) -> DeploymentStatus {
        self.slot.deployment.read().await.status()
    }

    pub async fn transition(&self, event: DeploymentEvent) -> Result<DeploymentStatus, OrchestratorError> {
        let mut deployment = self.slot.deployment.write().await;
        let status = deployment.transition(event)?;
        debug!("{} -> {:?}", self.project_id, status);
        Ok(status)
    }

    pub async fn snapshot(&self) -> DeploymentSnapshot {
        self.slot.deployment.read().await.snapshot()
    }

    /// Read a value out of the deployment
    pub async fn read<R>(&self, f: impl FnOnce(&Deployment) -> R) -> R {
        f(&*self.slot.deployment.read().await)
    }

    /// Mutate the deployment record
    pub async fn update(&self, f: impl FnOnce(&mut Deployment)) {
        f(&mut *self.slot.deployment.write().await)
    }
}

/// Process-lifetime registry of deployments
pub struct DeploymentRegistry {
    slots: RwLock<HashMap<String, Arc<Slot>>>,
    ports: PortMap,
}

impl DeploymentRegistry {
    pub fn new(ports: PortMap) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ports,
        }
    }

    /// Lease a project's slot, creating it on first use.
    ///
    /// Fails with `DeploymentBusy` while another lease is held.
    pub async fn acquire(&self, project_id: &str) -> Result<DeploymentLease, OrchestratorError> {
        let slot = {
            let mut slots = self.slots.write().await;
            slots
                .entry(project_id.to_string())
                .or_insert_with(|| {
                    Arc::new(Slot {
                        gate: Arc::new(Mutex::new(())),
                        deployment: RwLock::new(Deployment::new(
                            project_id,
                            self.ports.app_port,
                            self.ports.db_port,
                        )),
                    })
                })
                .clone()
        };

        let guard = slot
            .gate
            .clone()
            .try_lock_owned()
            .map_err(|_| OrchestratorError::DeploymentBusy(project_id.to_string()))?;

        Ok(DeploymentLease {
            project_id: project_id.to_string(),
            slot,
            _guard: guard,
        })
    }

    /// Wait for the lease of an existing slot.
    ///
    /// `None` for unknown ids, and when the slot was released while waiting.
    pub async fn acquire_existing(&self, project_id: &str) -> Option<DeploymentLease> {
        let slot = self.slots.read().await.get(project_id).cloned()?;
        let guard = slot.gate.clone().lock_owned().await;

        let current = self
            .slots
            .read()
            .await
            .get(project_id)
            .is_some_and(|registered| Arc::ptr_eq(registered, &slot));
        if !current {
            debug!("{} was released while waiting for its lease", project_id);
            return None;
        }

        Some(DeploymentLease {
            project_id: project_id.to_string(),
            slot,
            _guard: guard,
        })
    }

    /// Drop the lease and remove the slot from the registry
    pub async fn release(&self, lease: DeploymentLease) {
        let mut slots = self.slots.write().await;
        let same_slot = slots
            .get(lease.project_id())
            .is_some_and(|slot| Arc::ptr_eq(slot, &lease.slot));
        if same_slot {
            slots.remove(lease.project_id());
        }
        drop(lease);
    }

    pub async fn contains(&self, project_id: &str) -> bool {
        self.slots.read().await.contains_key(project_id)
    }

    /// Snapshots of every registered deployment
    pub async fn snapshots(&self) -> Vec<DeploymentSnapshot> {
        let slots: Vec<Arc<Slot>> = self.slots.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.deployment.read().await.snapshot());
        }
        out.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        out
    }
}
