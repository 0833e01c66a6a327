//! Container engine driven through the `docker compose` CLI

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::OrchestratorError;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::utils::sha256_hash;

/// Bytes of combined output kept for build failure diagnostics
pub const DEFAULT_TAIL_BYTES: usize = 8 * 1024;

/// A compose project as the engine sees it
#[derive(Debug, Clone)]
pub struct ComposeProject {
    /// Engine-level project name, derived from the project id
    pub name: String,

    /// Build context
    pub dir: PathBuf,

    /// Patched descriptor
    pub file: PathBuf,
}

/// Outcome of a build-and-start
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub tail: String,
}

/// Control surface of the external container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Build images and start containers detached, streaming output lines
    async fn up(
        &self,
        project: &ComposeProject,
        progress: &ProgressSink,
    ) -> Result<EngineOutput, OrchestratorError>;

    /// Stop and remove containers, anonymous volumes and networks
    async fn down(&self, name: &str, file: Option<&Path>) -> Result<(), OrchestratorError>;
}

/// Engine-safe compose project name for a project id.
///
/// Sanitizing folds case and punctuation, so a digest of the raw id keeps
/// distinct ids on distinct compose projects.
pub fn compose_project_name(project_id: &str) -> String {
    let sanitized: String = project_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let digest = sha256_hash(project_id.as_bytes());
    let sanitized = sanitized.trim_matches('-');
    if sanitized.is_empty() {
        format!("shipcheck-{}", &digest[..8])
    } else {
        format!("shipcheck-{}-{}", sanitized, &digest[..8])
    }
}

/// How compose is invoked on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose`
    Plugin,
    /// `docker-compose`
    Standalone,
}

/// `docker compose` backed engine
#[derive(Debug, Clone)]
pub struct DockerCompose {
    flavor: ComposeFlavor,
    tail_bytes: usize,
}

impl DockerCompose {
    pub fn new(flavor: ComposeFlavor, tail_bytes: usize) -> Self {
        Self { flavor, tail_bytes }
    }

    /// Prefer the compose plugin, fall back to the standalone binary
    pub async fn detect(tail_bytes: usize) -> Self {
        let plugin = Command::new("docker")
            .args(["compose", "version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);

        let flavor = if plugin {
            ComposeFlavor::Plugin
        } else {
            debug!("'docker compose' unavailable, using 'docker-compose'");
            ComposeFlavor::Standalone
        };
        Self::new(flavor, tail_bytes)
    }

    fn command(&self) -> Command {
        match self.flavor {
            ComposeFlavor::Plugin => {
                let mut cmd = Command::new("docker");
                cmd.arg("compose");
                cmd
            }
            ComposeFlavor::Standalone => Command::new("docker-compose"),
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerCompose {
    async fn up(
        &self,
        project: &ComposeProject,
        progress: &ProgressSink,
    ) -> Result<EngineOutput, OrchestratorError> {
        info!("Building and starting {} in {}", project.name, project.dir.display());

        let mut child = self
            .command()
            .current_dir(&project.dir)
            .arg("-p")
            .arg(&project.name)
            .arg("-f")
            .arg(&project.file)
            .args(["up", "-d", "--build"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OrchestratorError::EngineError(format!("Failed to run compose up: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::EngineError("compose stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| OrchestratorError::EngineError("compose stderr unavailable".to_string()))?;

        let mut stdout = BufReader::new(stdout);
        let mut stderr = BufReader::new(stderr);
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let mut tail = OutputTail::new(self.tail_bytes);
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            let line = tokio::select! {
                line = next_lossy_line(&mut stdout, &mut out_buf), if !out_done => {
                    let line = line?;
                    out_done = line.is_none();
                    line
                }
                line = next_lossy_line(&mut stderr, &mut err_buf), if !err_done => {
                    let line = line?;
                    err_done = line.is_none();
                    line
                }
            };
            if let Some(line) = line {
                progress.emit(ProgressEvent::Building { line: line.clone() });
                tail.push(line);
            }
        }

        let status = child.wait().await?;
        debug!("compose up for {} exited with {}", project.name, status);

        Ok(EngineOutput {
            success: status.success(),
            exit_code: status.code(),
            tail: tail.into_string(),
        })
    }

    async fn down(&self, name: &str, file: Option<&Path>) -> Result<(), OrchestratorError> {
        debug!("Tearing down compose project {}", name);

        let mut cmd = self.command();
        cmd.arg("-p").arg(name);
        if let Some(file) = file {
            cmd.arg("-f").arg(file);
        }
        let output = cmd
            .args(["down", "--volumes", "--remove-orphans"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OrchestratorError::EngineError(format!("Failed to run compose down: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("compose down for {} failed: {}", name, stderr.trim());
            return Err(OrchestratorError::EngineError(format!(
                "compose down failed for {}: {}",
                name,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Next output line, with invalid UTF-8 replaced.
///
/// Partial reads stay in `buf`, so a call abandoned by `select!` resumes where
/// it left off.
async fn next_lossy_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\n', '\r'])
        .to_string();
    buf.clear();
    Ok(Some(line))
}

/// Bounded tail of combined output lines
#[derive(Debug)]
pub struct OutputTail {
    lines: VecDeque<String>,
    bytes: usize,
    max_bytes: usize,
}

impl OutputTail {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            max_bytes,
        }
    }

    pub fn push(&mut self, line: String) {
        self.bytes += line.len() + 1;
        self.lines.push_back(line);
        while self.bytes > self.max_bytes && self.lines.len() > 1 {
            if let Some(old) = self.lines.pop_front() {
                self.bytes -= old.len() + 1;
            }
        }
    }

    pub fn into_string(self) -> String {
        Vec::from(self.lines).join("\n")
    }
}
