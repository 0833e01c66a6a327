//! Cleanup of an orchestration that is dropped before it finishes

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::deploy::lifecycle::LifecycleManager;
use crate::filesys::dir::Dir;

/// Armed while an orchestration is in flight.
///
/// Dropping it armed (caller gone, Ctrl-C, HTTP client disconnected) spawns a
/// best-effort stop of the project and removes the temporary tree it owns.
pub struct CleanupGuard {
    lifecycle: Arc<LifecycleManager>,
    project_id: String,
    temp_dir: Option<PathBuf>,
    armed: bool,
}

impl CleanupGuard {
    pub fn new(lifecycle: Arc<LifecycleManager>, project_id: &str) -> Self {
        Self {
            lifecycle,
            project_id: project_id.to_string(),
            temp_dir: None,
            armed: true,
        }
    }

    /// Track the temporary tree currently in use
    pub fn set_temp_dir(&mut self, dir: Option<PathBuf>) {
        self.temp_dir = dir;
    }

    /// The orchestration finished; leave everything as it is
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to clean up {}", self.project_id);
            return;
        };

        let lifecycle = self.lifecycle.clone();
        let project_id = std::mem::take(&mut self.project_id);
        let temp_dir = self.temp_dir.take();
        info!("Orchestration of {} abandoned, cleaning up", project_id);

        runtime.spawn(async move {
            if let Err(e) = lifecycle.stop(&project_id).await {
                warn!("Cleanup stop of {} failed: {}", project_id, e);
            }
            if let Some(dir) = temp_dir {
                if let Err(e) = Dir::new(&dir).delete().await {
                    warn!("Removing {} failed: {}", dir.display(), e);
                }
            }
        });
    }
}
