//! External app processes speaking the worker line protocol.
//!
//! Each `process` app runs as a child process with piped stdio:
//!
//! - stdin receives one JSON-encoded [`WorkerCommand`] per line.
//! - stdout carries one JSON-encoded [`WorkerSignal`] per line.
//! - stderr is inherited so app logs land next to the runtime's.
//!
//! The child is killed when its [`WorkerProcess`] handle is dropped.

use super::error::AppError;
use super::launcher::{AppLauncher, WorkerProcess};
use super::worker::{WorkerCommand, WorkerEndpoint, WorkerSignal};
use crate::app::AppManifest;
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Maximum number of bytes accepted per stdout line (100 KB).
const MAX_LINE_BYTES: usize = 100 * 1024;

/// How long to wait for buffered stdout after the child exited.
const READER_DRAIN: Duration = Duration::from_secs(1);

/// Environment variable carrying the app id into the child.
pub const APP_ID_ENV: &str = "VUI_APP_ID";

/// Spawns `process` apps with `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher {
    envs: Vec<(String, String)>,
}

impl ProcessLauncher {
    /// Create a launcher with no extra environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable passed to every child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl AppLauncher for ProcessLauncher {
    async fn launch(
        &self,
        manifest: &AppManifest,
        endpoint: WorkerEndpoint,
    ) -> Result<Box<dyn WorkerProcess>, AppError> {
        let app_id = manifest.app_id.clone();
        let exec = manifest.exec_path().ok_or_else(|| AppError::SpawnFailed {
            app_id: app_id.clone(),
            reason: "manifest declares no executable".to_owned(),
        })?;

        let mut command = Command::new(&exec);
        command
            .args(&manifest.args)
            .env(APP_ID_ENV, &app_id)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if !manifest.home.as_os_str().is_empty() {
            command.current_dir(&manifest.home);
        }

        let mut child = command.spawn().map_err(|e| AppError::SpawnFailed {
            app_id: app_id.clone(),
            reason: format!("{}: {e}", exec.display()),
        })?;
        let pid = child.id();

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(AppError::Protocol {
                message: format!("{app_id}: child stdio not piped"),
            });
        };

        tracing::info!(app_id = %app_id, pid = ?pid, exec = %exec.display(), "app process spawned");

        let (commands, signals) = endpoint.into_parts();
        tokio::spawn(write_commands(stdin, commands, app_id.clone()));
        let reader = tokio::spawn(read_signals(stdout, signals.clone(), app_id.clone()));

        let (kill_tx, kill_rx) = oneshot::channel();
        let reaper = tokio::spawn(reap(child, kill_rx, reader, signals, app_id));

        Ok(Box::new(ProcessWorker {
            pid,
            kill_tx: Some(kill_tx),
            reaper,
        }))
    }
}

/// Handle to a spawned app process.
pub struct ProcessWorker {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    reaper: JoinHandle<()>,
}

impl fmt::Debug for ProcessWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessWorker")
            .field("pid", &self.pid)
            .field("alive", &!self.reaper.is_finished())
            .finish()
    }
}

#[async_trait]
impl WorkerProcess for ProcessWorker {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn kill(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        let _ = (&mut self.reaper).await;
    }
}

impl Drop for ProcessWorker {
    fn drop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
            tracing::debug!(pid = ?self.pid, "killing app process on drop");
        }
    }
}

/// Waits for the child to exit (or kills it on request) and reports the code
/// once the stdout reader has drained.
async fn reap(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    reader: JoinHandle<()>,
    signals: mpsc::UnboundedSender<WorkerSignal>,
    app_id: String,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            let _ = child.start_kill();
            child.wait().await
        }
    };
    let code = status.ok().and_then(|s| s.code());
    if tokio::time::timeout(READER_DRAIN, reader).await.is_err() {
        tracing::debug!(app_id = %app_id, "stdout still open after exit");
    }
    tracing::info!(app_id = %app_id, code = ?code, "app process exited");
    let _ = signals.send(WorkerSignal::Exited { code });
}

/// Forwards commands to the child's stdin until the channel or pipe closes.
async fn write_commands(
    mut stdin: ChildStdin,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    app_id: String,
) {
    while let Some(command) = commands.recv().await {
        let mut line = match serde_json::to_string(&command) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(app_id = %app_id, error = %e, "cannot encode worker command");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = write_line(&mut stdin, &line).await {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                tracing::debug!(app_id = %app_id, "stdin broken pipe, app process exited");
            } else {
                tracing::warn!(app_id = %app_id, error = %e, "stdin write error");
            }
            break;
        }
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Parses stdout lines into signals until EOF.
async fn read_signals(
    stdout: ChildStdout,
    signals: mpsc::UnboundedSender<WorkerSignal>,
    app_id: String,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(app_id = %app_id, error = %e, "stdout read error");
                break;
            }
        }
        match parse_signal(&line) {
            Ok(Some(signal)) => {
                if signals.send(signal).is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(app_id = %app_id, error = %e, "dropping malformed worker line"),
        }
    }
}

/// Parses one stdout line. Blank lines yield `None`.
///
/// # Errors
///
/// [`AppError::Protocol`] if the line is oversized or not a valid signal.
pub fn parse_signal(line: &str) -> Result<Option<WorkerSignal>, AppError> {
    if line.len() > MAX_LINE_BYTES {
        return Err(AppError::Protocol {
            message: format!("line exceeded {MAX_LINE_BYTES} bytes"),
        });
    }
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| AppError::Protocol {
            message: format!("invalid worker signal: {e}"),
        })
}
