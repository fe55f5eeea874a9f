//! Notebook process launching and lifecycle states.
//!
//! The client never touches `tokio::process` directly. It asks a
//! [`ProcessLauncher`] for a [`LaunchedProcess`]: two pipes, an exit signal
//! and a kill switch. [`CommandLauncher`] is the real implementation; tests
//! plug in an in-memory one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::config::NotebookConfig;
use crate::error::{ClientError, ClientResult};
use crate::mcp::transport::{BoxedReader, BoxedWriter};

/// Lifecycle of the notebook session.
///
/// ```text
/// NotStarted → Starting → Handshaking → Discovering → Ready
///                                            ↑          │
///                                            └──────────┘ (re-discovery)
/// any state → Dead (unexpected exit; left only via restart)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No process has been launched.
    NotStarted,
    /// The process is being launched.
    Starting,
    /// Waiting for the `initialize` response.
    Handshaking,
    /// Looking for a notebook to use.
    Discovering,
    /// Accepting calls.
    Ready,
    /// The process exited unexpectedly.
    Dead,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Handshaking => "handshaking",
            Self::Discovering => "discovering",
            Self::Ready => "ready",
            Self::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// A running notebook process, as seen by the client.
pub struct LaunchedProcess {
    /// OS process ID, if known.
    pub pid: Option<u32>,
    /// The process's stdin.
    pub stdin: BoxedWriter,
    /// The process's stdout.
    pub stdout: BoxedReader,
    /// Resolves with the exit code once the process has exited.
    pub exit: oneshot::Receiver<Option<i32>>,
    /// Sending on, or dropping, this kills the process.
    pub kill: oneshot::Sender<()>,
}

/// Something that can start a notebook process.
pub trait ProcessLauncher: Send + Sync {
    /// Starts a new process.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Spawn`] if the process cannot be started.
    fn launch(&self) -> ClientResult<LaunchedProcess>;
}

/// Launches the notebook server as an OS child process.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
}

impl CommandLauncher {
    /// Creates a launcher for `program` with `args`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: HashMap::new(),
        }
    }

    /// Creates a launcher from the `notebook` configuration section.
    #[must_use]
    pub fn from_config(config: &NotebookConfig) -> Self {
        Self {
            program: config.command.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
        }
    }

    /// The program this launcher runs.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

fn missing_pipe(name: &str) -> ClientError {
    ClientError::Io(Arc::new(std::io::Error::other(format!(
        "child process has no {name} pipe"
    ))))
}

impl ProcessLauncher for CommandLauncher {
    fn launch(&self) -> ClientResult<LaunchedProcess> {
        tracing::info!(program = %self.program, args = ?self.args, "Spawning notebook process");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| ClientError::Spawn {
            program: self.program.clone(),
            source: Arc::new(e),
        })?;
        let pid = child.id();

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(?pid, "[notebook stderr] {line}");
            }
        });

        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!(?pid, error = %e, "Failed to kill notebook process");
                    }
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(?pid, error = %e, "Failed to wait for notebook process");
                    None
                }
            };
            let _ = exit_tx.send(code);
        });

        tracing::debug!(?pid, "Notebook process spawned");

        Ok(LaunchedProcess {
            pid,
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            exit: exit_rx,
            kill: kill_tx,
        })
    }
}
