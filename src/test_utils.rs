//! Shared test doubles used by unit and integration tests.
//!
//! - [`RecordingNotifier`] captures app notices and broadcasts.
//! - [`ScriptedLauncher`] runs in-process workers whose behavior is picked
//!   per app id from a [`WorkerScript`].

use crate::app::AppManifest;
use crate::notice::{AppNotice, AppNotifier, Broadcaster};
use crate::scheduler::{
    AppError, AppLauncher, TaskLauncher, WorkerCommand, WorkerEndpoint, WorkerProcess,
    WorkerSignal,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every notice and broadcast in delivery order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(String, AppNotice)>>,
    broadcasts: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All notices so far, as `(app_id, notice)`.
    pub fn notices(&self) -> Vec<(String, AppNotice)> {
        self.notices.lock().expect("notices lock").clone()
    }

    /// Notices delivered to one app.
    pub fn notices_for(&self, app_id: &str) -> Vec<AppNotice> {
        self.notices()
            .into_iter()
            .filter(|(id, _)| id == app_id)
            .map(|(_, notice)| notice)
            .collect()
    }

    /// All broadcasts so far, as `(channel, payload)`.
    pub fn broadcasts(&self) -> Vec<(String, serde_json::Value)> {
        self.broadcasts.lock().expect("broadcasts lock").clone()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.notices.lock().expect("notices lock").clear();
        self.broadcasts.lock().expect("broadcasts lock").clear();
    }
}

impl AppNotifier for RecordingNotifier {
    fn notify(&self, app_id: &str, notice: AppNotice) {
        self.notices
            .lock()
            .expect("notices lock")
            .push((app_id.to_owned(), notice));
    }
}

impl Broadcaster for RecordingNotifier {
    fn dispatch(&self, channel: &str, payload: serde_json::Value) {
        self.broadcasts
            .lock()
            .expect("broadcasts lock")
            .push((channel.to_owned(), payload));
    }
}

/// How a scripted worker behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerScript {
    /// Ready at once, answers pings, exits when asked.
    #[default]
    Cooperative,
    /// Like `Cooperative`, but signals ready after the given milliseconds.
    ReadyAfter(u64),
    /// Never signals anything and never exits on its own.
    NeverReady,
    /// Reports a startup failure.
    FailLaunch,
    /// Ready and answers pings, but ignores exit requests.
    IgnoreExit,
    /// Ready, then exits on its own after the given milliseconds.
    CrashAfter(u64),
    /// Ready, exits when asked, never answers pings.
    Silent,
}

/// Launcher whose workers follow per-app [`WorkerScript`]s. Clones share
/// scripts and records.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLauncher {
    scripts: Arc<Mutex<HashMap<String, WorkerScript>>>,
    launches: Arc<Mutex<HashMap<String, usize>>>,
    received: Arc<Mutex<HashMap<String, Vec<AppNotice>>>>,
}

impl ScriptedLauncher {
    /// Launcher where every app is [`WorkerScript::Cooperative`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `app_id`.
    #[must_use]
    pub fn script(self, app_id: &str, script: WorkerScript) -> Self {
        self.set_script(app_id, script);
        self
    }

    /// Re-script `app_id` for its next launch.
    pub fn set_script(&self, app_id: &str, script: WorkerScript) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(app_id.to_owned(), script);
    }

    /// How many times `app_id` was launched.
    pub fn launch_count(&self, app_id: &str) -> usize {
        self.launches
            .lock()
            .expect("launches lock")
            .get(app_id)
            .copied()
            .unwrap_or(0)
    }

    /// Notices the workers of `app_id` received, across launches.
    pub fn notices(&self, app_id: &str) -> Vec<AppNotice> {
        self.received
            .lock()
            .expect("received lock")
            .get(app_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AppLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        manifest: &AppManifest,
        endpoint: WorkerEndpoint,
    ) -> Result<Box<dyn WorkerProcess>, AppError> {
        let app_id = manifest.app_id.clone();
        *self
            .launches
            .lock()
            .expect("launches lock")
            .entry(app_id.clone())
            .or_default() += 1;
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get(&app_id)
            .copied()
            .unwrap_or_default();
        let received = Arc::clone(&self.received);
        TaskLauncher::new(move |endpoint| run_script(endpoint, script, Arc::clone(&received)))
            .launch(manifest, endpoint)
            .await
    }
}

async fn run_script(
    mut endpoint: WorkerEndpoint,
    script: WorkerScript,
    received: Arc<Mutex<HashMap<String, Vec<AppNotice>>>>,
) {
    match script {
        WorkerScript::FailLaunch => {
            endpoint.signal(WorkerSignal::Failed {
                reason: "scripted failure".to_owned(),
            });
            return;
        }
        WorkerScript::NeverReady => {
            let _hold = endpoint;
            std::future::pending::<()>().await;
            return;
        }
        WorkerScript::ReadyAfter(ms) => {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            endpoint.ready();
        }
        _ => {
            endpoint.ready();
        }
    }

    let crash = async {
        match script {
            WorkerScript::CrashAfter(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            _ => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(crash);

    loop {
        let command = tokio::select! {
            command = endpoint.recv() => command,
            () = &mut crash => return,
        };
        match command {
            None => return,
            Some(WorkerCommand::Notice { notice }) => {
                received
                    .lock()
                    .expect("received lock")
                    .entry(endpoint.app_id().to_owned())
                    .or_default()
                    .push(notice);
            }
            Some(WorkerCommand::Ping) => {
                if script != WorkerScript::Silent {
                    endpoint.signal(WorkerSignal::Alive);
                }
            }
            Some(WorkerCommand::Exit { .. }) => {
                if script != WorkerScript::IgnoreExit {
                    return;
                }
            }
        }
    }
}
