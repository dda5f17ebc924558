//! App process supervision.
//!
//! The [`AppScheduler`] owns one worker per running app. It launches workers
//! through the [`LauncherRegistry`], waits for them to signal readiness,
//! asks them to exit (or kills them), relaunches daemon apps, and terminates
//! apps that stop proving liveness.
//!
//! # Ordering
//!
//! Create and suspend operations on the same app are serialized through a
//! per-app FIFO operation queue: a suspend issued while a create is still in
//! flight waits for the create to settle. A second create issued while one is
//! in flight joins the in-flight result instead of launching again.
//!
//! # Status
//!
//! Status changes are committed under the state lock together with the
//! bookkeeping they depend on, so observers never see a half-applied
//! transition. See [`AppStatus`] for the state machine.

pub mod error;
pub mod launcher;
pub mod process;
pub mod status;
pub mod worker;

pub use error::AppError;
pub use launcher::{AppLauncher, LauncherRegistry, TaskLauncher, WorkerProcess};
pub use process::ProcessLauncher;
pub use status::{AppExit, AppStat, AppStatus, ExitReason, SchedulerEvent};
pub use worker::{WorkerCommand, WorkerEndpoint, WorkerHandle, WorkerSignal, worker_channel};

use crate::app::{AppLoader, AppManifest, LaunchOptions};
use crate::config::SchedulerConfig;
use crate::notice::{AppNotice, LifecycleEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Capacity of the scheduler event broadcast.
const EVENT_CAPACITY: usize = 256;

type CreationOutcome = Option<Result<(), AppError>>;
type SharedWorker = Arc<AsyncMutex<Box<dyn WorkerProcess>>>;

/// FIFO of create/suspend operations for one app.
#[derive(Debug, Default, Clone)]
struct OpQueue(Arc<AsyncMutex<()>>);

impl OpQueue {
    async fn turn(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.0).lock_owned().await
    }
}

/// Bookkeeping for one live worker.
struct AppEntry {
    /// Distinguishes successive workers of the same app.
    generation: u64,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    /// Set once the worker is ready.
    worker: Option<SharedWorker>,
    pid: Option<u32>,
    last_alive: Instant,
    started_at: Instant,
    /// In-flight creation result, while `Creating`.
    creation: Option<watch::Receiver<CreationOutcome>>,
    /// Cancels an in-flight creation.
    cancel: CancellationToken,
    /// Flips to `true` once the worker's signal channel is gone.
    exited: watch::Receiver<bool>,
}

#[derive(Default)]
struct SchedulerState {
    status: HashMap<String, AppStatus>,
    /// Launch options; kept past exit for daemons so relaunch can be vetoed.
    options: HashMap<String, LaunchOptions>,
    apps: HashMap<String, AppEntry>,
    queues: HashMap<String, OpQueue>,
    next_generation: u64,
}

struct Inner {
    config: SchedulerConfig,
    loader: Arc<dyn AppLoader>,
    launchers: LauncherRegistry,
    state: Mutex<SchedulerState>,
    events: broadcast::Sender<SchedulerEvent>,
}

/// Supervises app worker processes. Cheap to clone.
#[derive(Clone)]
pub struct AppScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AppScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppScheduler")
            .field("running", &self.running_app_ids())
            .field("launchers", &self.inner.launchers)
            .finish()
    }
}

impl AppScheduler {
    /// Create a scheduler resolving apps through `loader`.
    pub fn new(
        config: SchedulerConfig,
        loader: Arc<dyn AppLoader>,
        launchers: LauncherRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                loader,
                launchers,
                state: Mutex::new(SchedulerState::default()),
                events,
            }),
        }
    }

    /// Subscribe to status changes and exit reports.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Manifest lookup shared with the rest of the runtime.
    pub fn loader(&self) -> &Arc<dyn AppLoader> {
        &self.inner.loader
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Current status, or `None` if the app was never created.
    pub fn status(&self, app_id: &str) -> Option<AppStatus> {
        self.lock().status.get(app_id).copied()
    }

    /// Whether the app is `Running`.
    pub fn is_running(&self, app_id: &str) -> bool {
        self.status(app_id) == Some(AppStatus::Running)
    }

    /// Ids of all `Running` apps, sorted.
    pub fn running_app_ids(&self) -> Vec<String> {
        let state = self.lock();
        let mut ids: Vec<String> = state
            .status
            .iter()
            .filter(|(_, status)| **status == AppStatus::Running)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Launch options in effect for the app.
    pub fn launch_options(&self, app_id: &str) -> Option<LaunchOptions> {
        self.lock().options.get(app_id).copied()
    }

    /// Whether the app currently has the daemon flag.
    pub fn is_daemon(&self, app_id: &str) -> bool {
        self.launch_options(app_id).is_some_and(|o| o.daemon)
    }

    /// Idle-time bookkeeping for a live app.
    pub fn get_app_stat(&self, app_id: &str) -> Option<AppStat> {
        let state = self.lock();
        let entry = state.apps.get(app_id)?;
        let now = Instant::now();
        Some(AppStat {
            status: state.status.get(app_id).copied()?,
            idle: now.saturating_duration_since(entry.last_alive),
            uptime: now.saturating_duration_since(entry.started_at),
            options: state.options.get(app_id).copied().unwrap_or_default(),
            pid: entry.pid,
        })
    }

    /// Running non-daemon apps, longest idle first.
    pub fn suspend_candidates(&self) -> Vec<String> {
        let state = self.lock();
        let now = Instant::now();
        let mut candidates: Vec<(String, std::time::Duration)> = state
            .apps
            .iter()
            .filter(|(id, _)| state.status.get(*id) == Some(&AppStatus::Running))
            .filter(|(id, _)| !state.options.get(*id).is_some_and(|o| o.daemon))
            .map(|(id, entry)| (id.clone(), now.saturating_duration_since(entry.last_alive)))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        candidates.into_iter().map(|(id, _)| id).collect()
    }

    // ── Launch options ───────────────────────────────────────────────────────

    /// Set or clear the daemon flag. Returns `false` if the app has no options.
    ///
    /// Clearing the flag after a daemon exited cancels its pending relaunch.
    pub fn set_daemon(&self, app_id: &str, daemon: bool) -> bool {
        let mut state = self.lock();
        let Some(options) = state.options.get_mut(app_id) else {
            return false;
        };
        options.daemon = daemon;
        tracing::debug!(app_id, daemon, "daemon flag updated");
        true
    }

    /// Enable or disable the hang sentinel for the app.
    pub fn set_anr_enabled(&self, app_id: &str, anr_enabled: bool) -> bool {
        let mut state = self.lock();
        let Some(options) = state.options.get_mut(app_id) else {
            return false;
        };
        options.anr_enabled = anr_enabled;
        true
    }

    // ── Delivery ─────────────────────────────────────────────────────────────

    /// Deliver a notice to the app's worker. Returns `false` if none is live.
    pub fn notify(&self, app_id: &str, notice: AppNotice) -> bool {
        let state = self.lock();
        let Some(entry) = state.apps.get(app_id) else {
            return false;
        };
        entry.commands.send(WorkerCommand::Notice { notice }).is_ok()
    }

    /// Reset the app's liveness timestamp.
    pub fn refresh_anr(&self, app_id: &str) {
        if let Some(entry) = self.lock().apps.get_mut(app_id) {
            entry.last_alive = Instant::now();
        }
    }

    // ── Create ───────────────────────────────────────────────────────────────

    /// Launch the app and wait until its worker is ready.
    ///
    /// Idempotent: a running app returns immediately and a concurrent call
    /// joins the in-flight creation. `options` override the manifest's
    /// default launch options.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] / [`AppError::NoLauncher`] before anything is launched.
    /// - [`AppError::LaunchFailed`], [`AppError::WorkerExited`],
    ///   [`AppError::SpawnFailed`] when the worker never becomes ready.
    /// - [`AppError::Hung`] when the hang sentinel cancelled the creation.
    /// - [`AppError::Unhealthy`] while the app is in [`AppStatus::Error`];
    ///   nothing is launched until a forced suspend cleared it.
    pub async fn create_app(
        &self,
        app_id: &str,
        options: Option<LaunchOptions>,
    ) -> Result<(), AppError> {
        let in_flight = {
            let state = self.lock();
            match state.status.get(app_id) {
                Some(AppStatus::Running) => return Ok(()),
                Some(AppStatus::Error) => return Err(unhealthy(app_id)),
                Some(AppStatus::Creating) => {
                    state.apps.get(app_id).and_then(|e| e.creation.clone())
                }
                _ => None,
            }
        };
        if let Some(creation) = in_flight {
            return wait_creation(app_id, creation).await;
        }

        let _turn = self.queue(app_id).turn().await;
        // A suspend queued ahead of us may have settled either way.
        match self.status(app_id) {
            Some(AppStatus::Running) => Ok(()),
            Some(AppStatus::Error) => Err(unhealthy(app_id)),
            _ => self.launch(app_id, options).await,
        }
    }

    /// Launch every manifest-declared daemon. Returns the ids that failed.
    pub async fn launch_daemons(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for app_id in self.inner.loader.daemon_app_ids() {
            if let Err(e) = self.create_app(&app_id, None).await {
                tracing::warn!(app_id = %app_id, error = %e, "daemon app failed to launch");
                failed.push(app_id);
            }
        }
        failed
    }

    /// Runs with the app's queue turn held.
    async fn launch(&self, app_id: &str, options: Option<LaunchOptions>) -> Result<(), AppError> {
        let manifest = self
            .inner
            .loader
            .manifest(app_id)
            .ok_or_else(|| AppError::NotFound {
                app_id: app_id.to_owned(),
            })?;
        let launcher =
            self.inner
                .launchers
                .get(manifest.app_type)
                .ok_or_else(|| AppError::NoLauncher {
                    app_id: app_id.to_owned(),
                    app_type: manifest.app_type.to_string(),
                })?;
        let options = options.unwrap_or_else(|| manifest.launch_options());

        let (handle, endpoint) = worker_channel(app_id);
        let WorkerHandle {
            commands,
            mut signals,
        } = handle;
        let (creation_tx, creation_rx) = watch::channel(None);
        let (exit_tx, exit_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let generation = {
            let mut state = self.lock();
            state.next_generation += 1;
            let generation = state.next_generation;
            let now = Instant::now();
            state.apps.insert(
                app_id.to_owned(),
                AppEntry {
                    generation,
                    commands: commands.clone(),
                    worker: None,
                    pid: None,
                    last_alive: now,
                    started_at: now,
                    creation: Some(creation_rx),
                    cancel: cancel.clone(),
                    exited: exit_rx,
                },
            );
            state.options.insert(app_id.to_owned(), options);
            self.transition(&mut state, app_id, AppStatus::Creating);
            generation
        };
        tracing::info!(
            app_id,
            app_type = %manifest.app_type,
            daemon = options.daemon,
            "creating app"
        );

        let outcome = self
            .await_ready(&manifest, launcher.as_ref(), endpoint, &mut signals, &cancel)
            .await;

        match outcome {
            Ok(worker) => {
                let pid = worker.pid();
                {
                    let mut state = self.lock();
                    if let Some(entry) = state.apps.get_mut(app_id) {
                        entry.worker = Some(Arc::new(AsyncMutex::new(worker)));
                        entry.pid = pid;
                        entry.creation = None;
                        entry.last_alive = Instant::now();
                    }
                    self.transition(&mut state, app_id, AppStatus::Running);
                }
                tokio::spawn(
                    self.clone()
                        .pump(app_id.to_owned(), generation, signals, exit_tx),
                );
                let _ = commands.send(WorkerCommand::Notice {
                    notice: AppNotice::lifecycle(LifecycleEvent::Create),
                });
                tracing::info!(app_id, pid = ?pid, "app running");
                let _ = creation_tx.send(Some(Ok(())));
                Ok(())
            }
            Err(err) => {
                let reason = if matches!(err, AppError::Hung { .. }) {
                    ExitReason::Hung
                } else {
                    ExitReason::LaunchFailed
                };
                {
                    let mut state = self.lock();
                    state.apps.remove(app_id);
                    state.options.remove(app_id);
                    self.transition(&mut state, app_id, AppStatus::Exited);
                    self.publish_exit(app_id, reason);
                }
                tracing::warn!(app_id, error = %err, "app launch failed");
                let _ = creation_tx.send(Some(Err(err.clone())));
                Err(err)
            }
        }
    }

    /// Launches the worker and waits for its first decisive signal.
    async fn await_ready(
        &self,
        manifest: &AppManifest,
        launcher: &dyn AppLauncher,
        endpoint: WorkerEndpoint,
        signals: &mut mpsc::UnboundedReceiver<WorkerSignal>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn WorkerProcess>, AppError> {
        let app_id = manifest.app_id.as_str();
        let hung = || AppError::Hung {
            app_id: app_id.to_owned(),
        };

        let mut worker = tokio::select! {
            launched = launcher.launch(manifest, endpoint) => launched?,
            () = cancel.cancelled() => return Err(hung()),
        };

        loop {
            let signal = tokio::select! {
                signal = signals.recv() => signal,
                () = cancel.cancelled() => {
                    worker.kill().await;
                    return Err(hung());
                }
            };
            match signal {
                Some(WorkerSignal::Ready) => return Ok(worker),
                Some(WorkerSignal::Alive) => self.refresh_anr(app_id),
                Some(WorkerSignal::Failed { reason }) => {
                    worker.kill().await;
                    return Err(AppError::LaunchFailed {
                        app_id: app_id.to_owned(),
                        reason,
                    });
                }
                Some(WorkerSignal::Exited { code }) => {
                    return Err(AppError::WorkerExited {
                        app_id: app_id.to_owned(),
                        code,
                    });
                }
                None => {
                    worker.kill().await;
                    return Err(AppError::WorkerExited {
                        app_id: app_id.to_owned(),
                        code: None,
                    });
                }
            }
        }
    }

    /// Drains a ready worker's signals until it goes away.
    async fn pump(
        self,
        app_id: String,
        generation: u64,
        mut signals: mpsc::UnboundedReceiver<WorkerSignal>,
        exit_tx: watch::Sender<bool>,
    ) {
        let mut exit_code = None;
        while let Some(signal) = signals.recv().await {
            match signal {
                WorkerSignal::Alive => self.refresh_anr(&app_id),
                WorkerSignal::Ready => {
                    tracing::debug!(app_id = %app_id, "duplicate ready signal ignored");
                }
                WorkerSignal::Failed { reason } => {
                    tracing::warn!(app_id = %app_id, reason = %reason, "worker reported failure");
                }
                WorkerSignal::Exited { code } => {
                    exit_code = code;
                    break;
                }
            }
        }
        let _ = exit_tx.send(true);
        self.worker_gone(&app_id, generation, exit_code);
    }

    /// Finalizes a worker that went away without being suspended.
    fn worker_gone(&self, app_id: &str, generation: u64, code: Option<i32>) {
        let reason = {
            let state = self.lock();
            if !state
                .apps
                .get(app_id)
                .is_some_and(|e| e.generation == generation)
            {
                return;
            }
            match state.status.get(app_id) {
                Some(AppStatus::Running) => ExitReason::Crashed,
                Some(AppStatus::Error) => ExitReason::Suspended,
                _ => return,
            }
        };
        if reason == ExitReason::Crashed {
            tracing::warn!(app_id, code = ?code, "app exited unexpectedly");
        } else {
            tracing::info!(app_id, code = ?code, "unhealthy app finally exited");
        }
        self.finalize(app_id, reason);
    }

    // ── Suspend ──────────────────────────────────────────────────────────────

    /// Ask the app to exit and wait for it.
    ///
    /// No-op for apps that are not alive. A suspend issued while the app is
    /// `Creating` runs once the creation settled. With `force` the worker is
    /// killed without waiting.
    ///
    /// # Errors
    ///
    /// [`AppError::SuspendTimeout`] if the worker did not exit within the
    /// graceful bound; the app is left in [`AppStatus::Error`] until a forced
    /// suspend.
    pub async fn suspend_app(&self, app_id: &str, force: bool) -> Result<(), AppError> {
        self.suspend_with_reason(app_id, force, ExitReason::Suspended)
            .await
    }

    /// Suspend every live app. Returns the failures.
    pub async fn suspend_all(&self, force: bool) -> Vec<AppError> {
        let ids: Vec<String> = {
            let state = self.lock();
            state
                .status
                .iter()
                .filter(|(_, status)| status.is_alive())
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut failures = Vec::new();
        for app_id in ids {
            if let Err(e) = self.suspend_app(&app_id, force).await {
                failures.push(e);
            }
        }
        failures
    }

    async fn suspend_with_reason(
        &self,
        app_id: &str,
        force: bool,
        reason: ExitReason,
    ) -> Result<(), AppError> {
        if !self.status(app_id).is_some_and(AppStatus::is_alive) {
            return Ok(());
        }
        let _turn = self.queue(app_id).turn().await;

        let (commands, worker, mut exited) = {
            let mut state = self.lock();
            if !matches!(
                state.status.get(app_id),
                Some(AppStatus::Running | AppStatus::Error)
            ) {
                return Ok(());
            }
            let Some(entry) = state.apps.get(app_id) else {
                return Ok(());
            };
            let parts = (
                entry.commands.clone(),
                entry.worker.clone(),
                entry.exited.clone(),
            );
            self.transition(&mut state, app_id, AppStatus::Suspending);
            parts
        };
        tracing::info!(app_id, force, "suspending app");

        let _ = commands.send(WorkerCommand::Notice {
            notice: AppNotice::lifecycle(LifecycleEvent::Destroy),
        });
        let _ = commands.send(WorkerCommand::Exit { force });

        if force {
            if let Some(worker) = worker {
                worker.lock().await.kill().await;
            }
        } else {
            let bound = self.inner.config.suspend_timeout();
            let graceful = tokio::time::timeout(bound, async {
                let _ = exited.wait_for(|gone| *gone).await;
            })
            .await;
            if graceful.is_err() {
                {
                    let mut state = self.lock();
                    self.transition(&mut state, app_id, AppStatus::Error);
                }
                let timeout_ms = u64::try_from(bound.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(app_id, timeout_ms, "app did not exit in time");
                return Err(AppError::SuspendTimeout {
                    app_id: app_id.to_owned(),
                    timeout_ms,
                });
            }
        }

        self.finalize(app_id, reason);
        Ok(())
    }

    /// Commits `Exited`, reports the exit, and relaunches daemons.
    fn finalize(&self, app_id: &str, reason: ExitReason) {
        let daemon = {
            let mut state = self.lock();
            state.apps.remove(app_id);
            let daemon = state.options.get(app_id).is_some_and(|o| o.daemon);
            if !daemon {
                state.options.remove(app_id);
            }
            self.transition(&mut state, app_id, AppStatus::Exited);
            self.publish_exit(app_id, reason);
            daemon
        };
        tracing::info!(app_id, reason = ?reason, "app exited");
        if daemon {
            self.schedule_relaunch(app_id);
        }
    }

    fn schedule_relaunch(&self, app_id: &str) {
        let scheduler = self.clone();
        let app_id = app_id.to_owned();
        let delay = self.inner.config.daemon_restart_delay();
        tracing::info!(app_id = %app_id, delay_ms = delay.as_millis(), "daemon relaunch scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let options = {
                let state = scheduler.lock();
                let alive = state.status.get(&app_id).is_some_and(|s| s.is_alive());
                state
                    .options
                    .get(&app_id)
                    .copied()
                    .filter(|o| o.daemon && !alive)
            };
            let Some(options) = options else {
                tracing::debug!(app_id = %app_id, "daemon relaunch skipped");
                return;
            };
            if let Err(e) = scheduler.create_app(&app_id, Some(options)).await {
                tracing::warn!(app_id = %app_id, error = %e, "daemon relaunch failed");
            }
        });
    }

    // ── Hang sentinel ────────────────────────────────────────────────────────

    /// Terminate apps idle beyond the ANR threshold and probe the others.
    ///
    /// Hung running apps are force-suspended; hung creations are cancelled,
    /// which fails their `create_app` with [`AppError::Hung`]. Either way the
    /// app is `Exited` by the time this returns. Apps in [`AppStatus::Error`]
    /// are left for an explicit forced suspend. Returns the ids of the apps
    /// terminated.
    pub async fn anr_sentinel(&self) -> Vec<String> {
        let threshold = self.inner.config.anr_timeout();
        let probe = self.inner.config.probe_liveness;
        let now = Instant::now();

        let mut hung_running = Vec::new();
        let mut hung_creating = Vec::new();
        let mut probes = Vec::new();
        {
            let state = self.lock();
            for (app_id, entry) in &state.apps {
                if !state.options.get(app_id).is_none_or(|o| o.anr_enabled) {
                    continue;
                }
                let idle = now.saturating_duration_since(entry.last_alive);
                match state.status.get(app_id) {
                    Some(AppStatus::Creating) if idle > threshold => {
                        entry.cancel.cancel();
                        hung_creating.push((app_id.clone(), entry.creation.clone()));
                    }
                    Some(AppStatus::Running) if idle > threshold => {
                        hung_running.push(app_id.clone());
                    }
                    Some(AppStatus::Running) if probe => probes.push(entry.commands.clone()),
                    _ => {}
                }
            }
        }

        for commands in probes {
            let _ = commands.send(WorkerCommand::Ping);
        }
        let mut terminated = Vec::with_capacity(hung_creating.len() + hung_running.len());
        for (app_id, creation) in hung_creating {
            tracing::warn!(app_id = %app_id, "app hung while launching, cancelling");
            if let Some(creation) = creation {
                let _ = wait_creation(&app_id, creation).await;
            }
            terminated.push(app_id);
        }
        hung_running.sort();
        for app_id in &hung_running {
            tracing::warn!(app_id = %app_id, "app not responding, terminating");
            if let Err(e) = self
                .suspend_with_reason(app_id, true, ExitReason::Hung)
                .await
            {
                tracing::error!(app_id = %app_id, error = %e, "failed to terminate hung app");
            }
        }

        terminated.extend(hung_running);
        terminated.sort();
        terminated
    }

    /// Run [`anr_sentinel`](Self::anr_sentinel) every `check_interval` until
    /// `shutdown` fires.
    pub fn spawn_anr_sentinel(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        let period = self.inner.config.anr_check_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let terminated = scheduler.anr_sentinel().await;
                        if !terminated.is_empty() {
                            tracing::info!(apps = ?terminated, "hang sentinel terminated apps");
                        }
                    }
                    () = shutdown.cancelled() => break,
                }
            }
            tracing::debug!("hang sentinel stopped");
        })
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn queue(&self, app_id: &str) -> OpQueue {
        self.lock()
            .queues
            .entry(app_id.to_owned())
            .or_default()
            .clone()
    }

    /// Applies a status change under the caller's lock and publishes it.
    fn transition(&self, state: &mut SchedulerState, app_id: &str, to: AppStatus) {
        let from = state.status.insert(app_id.to_owned(), to);
        match from {
            Some(from) if !from.can_transition_to(to) => {
                tracing::warn!(app_id, from = %from, to = %to, "unexpected status transition");
            }
            Some(from) => tracing::debug!(app_id, from = %from, to = %to, "status transition"),
            None => tracing::debug!(app_id, to = %to, "status transition"),
        }
        let _ = self.inner.events.send(SchedulerEvent::Status {
            app_id: app_id.to_owned(),
            status: to,
        });
    }

    fn publish_exit(&self, app_id: &str, reason: ExitReason) {
        let _ = self.inner.events.send(SchedulerEvent::Exited(AppExit {
            app_id: app_id.to_owned(),
            reason,
        }));
    }
}

fn unhealthy(app_id: &str) -> AppError {
    AppError::Unhealthy {
        app_id: app_id.to_owned(),
    }
}

/// Waits on another caller's in-flight creation.
async fn wait_creation(
    app_id: &str,
    mut creation: watch::Receiver<CreationOutcome>,
) -> Result<(), AppError> {
    let outcome = match creation.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| {
        Err(AppError::WorkerExited {
            app_id: app_id.to_owned(),
            code: None,
        })
    })
}
