use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CommandExecutor, CommandOutput, LinkError};

const RUNTIME_BIN: &str = "docker";

/// The set of running services declared by one compose definition. Owns the
/// environment lifecycle: started once, stopped exactly once per run.
pub struct ComposeEnvironment {
    compose_file: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    stopped: bool,
}

impl std::fmt::Debug for ComposeEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposeEnvironment")
            .field("compose_file", &self.compose_file)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl ComposeEnvironment {
    /// Launches every service in the compose definition and blocks until the
    /// runtime reports them reachable.
    pub fn start(
        compose_file: &Path,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self, LinkError> {
        let file = compose_file.to_string_lossy().to_string();
        info!("Starting compose from file {}", file);
        let output = executor
            .execute(
                RUNTIME_BIN,
                &["compose", "-f", &file, "up", "-d", "--wait"],
            )
            .map_err(|e| LinkError::EnvironmentStart {
                compose_file: file.clone(),
                detail: e.to_string(),
            })?;

        if !output.success() {
            return Err(LinkError::EnvironmentStart {
                compose_file: file,
                detail: format!("exit code {}: {}", output.status, output.stderr.trim()),
            });
        }

        Ok(Self {
            compose_file: compose_file.to_path_buf(),
            executor,
            stopped: false,
        })
    }

    /// Resolves a service name to a handle on its running container. Absent
    /// services yield `None` so callers can skip optional steps.
    pub fn resolve_service(&self, name: &str) -> Option<ContainerHandle> {
        let file = self.compose_file.to_string_lossy().to_string();
        let output = self
            .executor
            .execute(RUNTIME_BIN, &["compose", "-f", &file, "ps", "-q", name]);

        match output {
            Ok(out) if out.success() => {
                let id = out.stdout.lines().next().unwrap_or("").trim().to_string();
                if id.is_empty() {
                    debug!("Service {} is not part of this environment", name);
                    None
                } else {
                    Some(ContainerHandle {
                        id,
                        executor: Arc::clone(&self.executor),
                    })
                }
            }
            Ok(out) => {
                debug!(
                    "Service {} could not be resolved (exit code {}): {}",
                    name,
                    out.status,
                    out.stderr.trim()
                );
                None
            }
            Err(e) => {
                warn!("Service lookup for {} failed: {}", name, e);
                None
            }
        }
    }

    /// Tears the environment down. Idempotent; a failure is logged but never
    /// escalated since the run's assertions have already completed.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let file = self.compose_file.to_string_lossy().to_string();
        match self
            .executor
            .execute(RUNTIME_BIN, &["compose", "-f", &file, "down", "--volumes"])
        {
            Ok(out) if out.success() => info!("Stopped environment from {}", file),
            Ok(out) => warn!(
                "Environment stop returned exit code {}: {}",
                out.status,
                out.stderr.trim()
            ),
            Err(e) => warn!("Environment stop failed: {}", e),
        }
    }
}

/// Capability-scoped view into one running container: copy a file in, copy a
/// file out, exec a command. Never owns the container lifecycle.
#[derive(Clone)]
pub struct ContainerHandle {
    id: String,
    executor: Arc<dyn CommandExecutor>,
}

impl ContainerHandle {
    pub fn container_id(&self) -> &str {
        &self.id
    }

    pub fn copy_in(&self, host_path: &Path, container_path: &str) -> Result<(), LinkError> {
        let source = host_path.to_string_lossy().to_string();
        let target = format!("{}:{}", self.id, container_path);
        self.copy(&source, &target)
    }

    pub fn copy_out(&self, container_path: &str, host_path: &Path) -> Result<(), LinkError> {
        let source = format!("{}:{}", self.id, container_path);
        let target = host_path.to_string_lossy().to_string();
        self.copy(&source, &target)
    }

    fn copy(&self, source: &str, target: &str) -> Result<(), LinkError> {
        let output = self
            .executor
            .execute(RUNTIME_BIN, &["cp", source, target])
            .map_err(|e| LinkError::Copy {
                source_path: source.to_string(),
                target: target.to_string(),
                detail: e.to_string(),
            })?;

        if !output.success() {
            return Err(LinkError::Copy {
                source_path: source.to_string(),
                target: target.to_string(),
                detail: format!("exit code {}: {}", output.status, output.stderr.trim()),
            });
        }
        Ok(())
    }

    /// Runs a command inside the container and returns its exit code and
    /// captured streams. A non-zero exit code is reported through the output,
    /// not as an error; only a spawn failure errors.
    pub fn exec(&self, command: &[&str]) -> Result<CommandOutput, LinkError> {
        let mut args = vec!["exec", self.id.as_str()];
        args.extend_from_slice(command);
        self.executor
            .execute(RUNTIME_BIN, &args)
            .map_err(|e| LinkError::Exec {
                container: self.id.clone(),
                detail: e.to_string(),
            })
    }
}
