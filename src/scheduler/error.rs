//! Error types for app process supervision.

/// Errors that can occur while creating or suspending an app.
///
/// `Clone` so a single in-flight creation result can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    /// No manifest is installed for the app.
    #[error("app not found: {app_id}")]
    NotFound {
        /// The app id that was looked up.
        app_id: String,
    },

    /// No launcher is registered for the app's declared type.
    #[error("no launcher registered for {app_type} app {app_id}")]
    NoLauncher {
        /// App being launched.
        app_id: String,
        /// Declared app type.
        app_type: String,
    },

    /// Failed to spawn the worker process.
    #[error("failed to spawn {app_id}: {reason}")]
    SpawnFailed {
        /// App being launched.
        app_id: String,
        /// Underlying spawn error.
        reason: String,
    },

    /// The worker reported a startup failure.
    #[error("app {app_id} failed to launch: {reason}")]
    LaunchFailed {
        /// App being launched.
        app_id: String,
        /// Reason reported by the worker.
        reason: String,
    },

    /// The worker went away before signalling readiness.
    #[error("app {app_id} exited before becoming ready (exit code: {code:?})")]
    WorkerExited {
        /// App being launched.
        app_id: String,
        /// Exit code, when known.
        code: Option<i32>,
    },

    /// Graceful suspend did not complete in time.
    #[error("suspending app {app_id} timed out after {timeout_ms}ms")]
    SuspendTimeout {
        /// App being suspended.
        app_id: String,
        /// The graceful shutdown bound.
        timeout_ms: u64,
    },

    /// A graceful suspend timed out earlier; only a forced suspend clears it.
    #[error("app {app_id} is unhealthy and must be force-suspended first")]
    Unhealthy {
        /// App left in the error state.
        app_id: String,
    },

    /// The app stopped responding and was terminated by the hang sentinel.
    #[error("app {app_id} not responding")]
    Hung {
        /// App that hung.
        app_id: String,
    },

    /// Worker line protocol violation.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the violation.
        message: String,
    },
}
