//! Per-app process status and exit reporting.

use crate::app::LaunchOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Process status of one app.
///
/// ```text
/// (none) → Creating → Running → Suspending → Exited
///              ↓          ↓          ↓          ↓
///            Exited     Exited     Error    Creating (relaunch)
///                                    ↓
///                          Suspending / Exited
/// ```
///
/// `Running → Exited` only happens through a forced suspend or a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    /// Worker is launching and has not signalled readiness yet.
    Creating,
    /// Worker is ready.
    Running,
    /// Worker was asked to exit.
    Suspending,
    /// Worker is gone.
    Exited,
    /// Graceful suspend timed out; the worker may still be alive.
    Error,
}

impl AppStatus {
    /// Returns `true` if a worker may exist in this status.
    pub fn is_alive(self) -> bool {
        !matches!(self, Self::Exited)
    }

    /// Returns `true` if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Creating, Self::Running)
                | (Self::Creating, Self::Exited)
                | (Self::Running, Self::Suspending)
                | (Self::Running, Self::Exited)
                | (Self::Suspending, Self::Exited)
                | (Self::Suspending, Self::Error)
                | (Self::Error, Self::Suspending)
                | (Self::Error, Self::Exited)
                | (Self::Exited, Self::Creating)
        )
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Suspending => "suspending",
            Self::Exited => "exited",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Why an app reached `Exited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Suspended on request.
    Suspended,
    /// Worker exited on its own while running.
    Crashed,
    /// Terminated by the hang sentinel.
    Hung,
    /// Never became ready.
    LaunchFailed,
}

/// Exit report published by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppExit {
    /// App that exited.
    pub app_id: String,
    /// Why it exited.
    pub reason: ExitReason,
}

/// Scheduler observations for subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// An app changed status.
    Status {
        /// App whose status changed.
        app_id: String,
        /// The new status.
        status: AppStatus,
    },
    /// An app exited.
    Exited(AppExit),
}

/// Idle-time bookkeeping for one live app.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppStat {
    /// Current status.
    pub status: AppStatus,
    /// Time since the app last proved it was responsive.
    pub idle: Duration,
    /// Time since the current worker was launched.
    pub uptime: Duration,
    /// Launch options in effect.
    pub options: LaunchOptions,
    /// OS process id, for process workers.
    pub pid: Option<u32>,
}
