//! Typed message channel between the scheduler and one app worker.
//!
//! ```text
//! AppScheduler ──WorkerCommand──▶ WorkerEndpoint (app side)
//! AppScheduler ◀──WorkerSignal── WorkerEndpoint
//! ```

use crate::notice::AppNotice;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Message from the runtime to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Deliver an app notice.
    Notice {
        /// The notice.
        notice: AppNotice,
    },
    /// Liveness probe; the worker answers with [`WorkerSignal::Alive`].
    Ping,
    /// Ask the worker to exit.
    Exit {
        /// Whether the runtime is about to kill the worker regardless.
        force: bool,
    },
}

/// Message from a worker to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerSignal {
    /// Worker finished starting up.
    Ready,
    /// Worker is responsive.
    Alive,
    /// Worker could not start.
    Failed {
        /// Why startup failed.
        reason: String,
    },
    /// Worker is gone.
    Exited {
        /// Exit code, when known.
        code: Option<i32>,
    },
}

/// Runtime-side half of a worker channel, owned by the scheduler.
#[derive(Debug)]
pub struct WorkerHandle {
    pub(crate) commands: mpsc::UnboundedSender<WorkerCommand>,
    pub(crate) signals: mpsc::UnboundedReceiver<WorkerSignal>,
}

/// App-side half of a worker channel, handed to the launcher.
#[derive(Debug)]
pub struct WorkerEndpoint {
    app_id: String,
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    signals: mpsc::UnboundedSender<WorkerSignal>,
}

/// Creates a fresh worker channel for `app_id`.
pub fn worker_channel(app_id: &str) -> (WorkerHandle, WorkerEndpoint) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    (
        WorkerHandle {
            commands: command_tx,
            signals: signal_rx,
        },
        WorkerEndpoint {
            app_id: app_id.to_owned(),
            commands: command_rx,
            signals: signal_tx,
        },
    )
}

impl WorkerEndpoint {
    /// App this endpoint belongs to.
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Receive the next command; `None` once the runtime dropped its handle.
    pub async fn recv(&mut self) -> Option<WorkerCommand> {
        self.commands.recv().await
    }

    /// Send a signal to the runtime. Returns `false` if nobody listens anymore.
    pub fn signal(&self, signal: WorkerSignal) -> bool {
        self.signals.send(signal).is_ok()
    }

    /// Shorthand for [`WorkerSignal::Ready`].
    pub fn ready(&self) -> bool {
        self.signal(WorkerSignal::Ready)
    }

    /// Splits the endpoint into its raw channel halves.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedReceiver<WorkerCommand>,
        mpsc::UnboundedSender<WorkerSignal>,
    ) {
        (self.commands, self.signals)
    }
}
