use anyhow::{Context, Result};
use std::process::Command;
use std::sync::Mutex;

pub mod compose;

pub use compose::{ComposeEnvironment, ContainerHandle};

/// Abstraction over spawning the container runtime binary so tests can
/// substitute a deterministic executor.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to launch environment from {compose_file}: {detail}")]
    EnvironmentStart { compose_file: String, detail: String },

    #[error("Failed to copy {source_path} to {target}: {detail}")]
    Copy {
        source_path: String,
        target: String,
        detail: String,
    },

    #[error("Failed to exec in container {container}: {detail}")]
    Exec { container: String, detail: String },
}

pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute command: {} {:?}", program, args))?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn contains(&self, needle: &str) -> bool {
        self.args.iter().any(|arg| arg == needle)
    }
}

type Responder = Box<dyn Fn(&str, &[&str]) -> CommandOutput + Send + Sync>;

/// Deterministic command executor used in tests where shelling out is
/// undesirable. Records every invocation for later assertions.
pub struct ScriptedCommandExecutor {
    responder: Responder,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedCommandExecutor {
    pub fn success(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self::with_responder(move |_, _| CommandOutput {
            status: 0,
            stdout: stdout.clone(),
            stderr: String::new(),
        })
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        let stderr = stderr.into();
        Self::with_responder(move |_, _| CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: stderr.clone(),
        })
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str, &[&str]) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CommandExecutor for ScriptedCommandExecutor {
    fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        self.invocations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Invocation {
                program: program.to_string(),
                args: args.iter().map(|arg| arg.to_string()).collect(),
            });
        Ok((self.responder)(program, args))
    }
}
