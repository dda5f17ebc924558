//! Launcher registry: one launcher per [`AppType`].

use super::error::AppError;
use super::worker::WorkerEndpoint;
use crate::app::{AppManifest, AppType};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A launched worker the scheduler can terminate.
#[async_trait]
pub trait WorkerProcess: Send + 'static {
    /// OS process id, if the worker is a separate process.
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Terminate the worker immediately and wait until it is gone.
    async fn kill(&mut self);
}

/// Starts workers of one app type.
///
/// The launcher wires `endpoint` to the worker it starts; the scheduler then
/// waits for [`WorkerSignal::Ready`](super::WorkerSignal::Ready) on the other
/// half of the channel.
#[async_trait]
pub trait AppLauncher: Send + Sync + 'static {
    /// Launch a worker for `manifest`.
    async fn launch(
        &self,
        manifest: &AppManifest,
        endpoint: WorkerEndpoint,
    ) -> Result<Box<dyn WorkerProcess>, AppError>;
}

/// Maps each app type to its launcher. Populated once at startup.
#[derive(Clone, Default)]
pub struct LauncherRegistry {
    launchers: HashMap<AppType, Arc<dyn AppLauncher>>,
}

impl LauncherRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `launcher` for `app_type`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, app_type: AppType, launcher: impl AppLauncher) -> Self {
        self.launchers.insert(app_type, Arc::new(launcher));
        self
    }

    /// Launcher for `app_type`.
    pub fn get(&self, app_type: AppType) -> Option<Arc<dyn AppLauncher>> {
        self.launchers.get(&app_type).cloned()
    }
}

impl fmt::Debug for LauncherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = self.launchers.keys().map(ToString::to_string).collect();
        types.sort();
        f.debug_struct("LauncherRegistry")
            .field("types", &types)
            .finish()
    }
}

type TaskBody = dyn Fn(WorkerEndpoint) -> BoxFuture<'static, ()> + Send + Sync;

/// Runs `light` apps as tokio tasks inside the runtime process.
///
/// The body receives the worker endpoint and owns the app for as long as
/// it runs; returning from the body is an exit.
#[derive(Clone)]
pub struct TaskLauncher {
    body: Arc<TaskBody>,
}

impl TaskLauncher {
    /// Build a launcher from an async worker body.
    pub fn new<F, Fut>(body: F) -> Self
    where
        F: Fn(WorkerEndpoint) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            body: Arc::new(move |endpoint| Box::pin(body(endpoint))),
        }
    }
}

impl fmt::Debug for TaskLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskLauncher")
    }
}

#[async_trait]
impl AppLauncher for TaskLauncher {
    async fn launch(
        &self,
        manifest: &AppManifest,
        endpoint: WorkerEndpoint,
    ) -> Result<Box<dyn WorkerProcess>, AppError> {
        tracing::debug!(app_id = %manifest.app_id, "spawning in-process worker");
        let handle = tokio::spawn((self.body)(endpoint));
        Ok(Box::new(TaskWorker { handle }))
    }
}

struct TaskWorker {
    handle: JoinHandle<()>,
}

#[async_trait]
impl WorkerProcess for TaskWorker {
    async fn kill(&mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
    }
}

impl Drop for TaskWorker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
