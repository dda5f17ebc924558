//! Runtime wiring: one scheduler, focus arbiter, stack manager and
//! dispatcher per device, sharing a [`NoticeRouter`].
//!
//! Everything observable leaves the runtime as a [`RuntimeEvent`] on a
//! broadcast channel, so hosts (the stdio bridge, tests) see notices,
//! broadcasts and process changes in one ordered stream.

use crate::app::AppLoader;
use crate::audio_focus::AudioFocus;
use crate::config::RuntimeConfig;
use crate::dispatcher::{DispatchOutcome, Dispatcher, InboundEvent};
use crate::lifetime::Lifetime;
use crate::notice::{AppNotice, AppNotifier, Broadcaster};
use crate::scheduler::{AppScheduler, AppStatus, ExitReason, LauncherRegistry, SchedulerEvent};
use crate::visibility::Visibility;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of the runtime event broadcast channel.
const EVENT_CAPACITY: usize = 256;

/// Events describing what the runtime is doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// A notice was sent to an app.
    Notice {
        /// Recipient.
        app_id: String,
        /// The notice.
        notice: AppNotice,
        /// Whether a live worker received it.
        delivered: bool,
    },
    /// A payload was published on a named channel.
    Broadcast {
        /// Channel name.
        channel: String,
        /// Published payload.
        payload: serde_json::Value,
    },
    /// An app changed process status.
    AppStatus {
        /// App whose status changed.
        app_id: String,
        /// The new status.
        status: AppStatus,
    },
    /// An app process exited.
    AppExited {
        /// App that exited.
        app_id: String,
        /// Why it exited.
        reason: ExitReason,
    },
    /// An inbound event was routed.
    Dispatched {
        /// Routing result.
        outcome: DispatchOutcome,
    },
    /// An inbound event could not be routed.
    DispatchFailed {
        /// Human-readable reason.
        error: String,
    },
}

/// Delivers notices to workers through the scheduler and mirrors notices
/// and broadcasts on the runtime event channel.
#[derive(Debug, Clone)]
pub struct NoticeRouter {
    scheduler: AppScheduler,
    events: broadcast::Sender<RuntimeEvent>,
}

impl NoticeRouter {
    fn publish(&self, event: RuntimeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl AppNotifier for NoticeRouter {
    fn notify(&self, app_id: &str, notice: AppNotice) {
        let delivered = self.scheduler.notify(app_id, notice.clone());
        if !delivered {
            tracing::debug!(app_id, "notice dropped, app has no live worker");
        }
        self.publish(RuntimeEvent::Notice {
            app_id: app_id.to_owned(),
            notice,
            delivered,
        });
    }
}

impl Broadcaster for NoticeRouter {
    fn dispatch(&self, channel: &str, payload: serde_json::Value) {
        tracing::debug!(channel, %payload, "broadcast");
        self.publish(RuntimeEvent::Broadcast {
            channel: channel.to_owned(),
            payload,
        });
    }
}

/// The assembled orchestration core.
pub struct Runtime {
    config: RuntimeConfig,
    scheduler: AppScheduler,
    focus: AudioFocus,
    visibility: Visibility,
    lifetime: Lifetime,
    dispatcher: Dispatcher,
    router: NoticeRouter,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Build every component once and wire them together. Nothing runs
    /// until [`start`](Self::start).
    pub fn new(
        config: RuntimeConfig,
        loader: Arc<dyn AppLoader>,
        launchers: LauncherRegistry,
    ) -> Self {
        let scheduler =
            AppScheduler::new(config.scheduler.clone(), Arc::clone(&loader), launchers);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let router = NoticeRouter {
            scheduler: scheduler.clone(),
            events,
        };
        let notifier: Arc<dyn AppNotifier> = Arc::new(router.clone());
        let focus = AudioFocus::new(Arc::clone(&notifier), Arc::new(router.clone()));
        let visibility = Visibility::new(focus.clone());
        let lifetime = Lifetime::new(scheduler.clone(), Arc::clone(&notifier));
        let dispatcher = Dispatcher::new(
            loader,
            lifetime.clone(),
            notifier,
            config.dispatcher.enabled,
        );

        Self {
            config,
            scheduler,
            focus,
            visibility,
            lifetime,
            dispatcher,
            router,
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the exit-report pump and the hang sentinel, then launch daemon
    /// apps when configured. Returns the daemons that failed to launch.
    pub async fn start(&self) -> Vec<String> {
        let pump = self.spawn_exit_pump();
        let sentinel = self.scheduler.spawn_anr_sentinel(self.shutdown.child_token());
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([pump, sentinel]);

        if !self.config.apps.launch_daemons_on_start {
            tracing::info!("runtime started, daemon launch disabled");
            return Vec::new();
        }
        let failed = self.scheduler.launch_daemons().await;
        if failed.is_empty() {
            tracing::info!("runtime started");
        } else {
            tracing::warn!(failed = ?failed, "runtime started, some daemons failed to launch");
        }
        failed
    }

    /// Tear the stack down, stop every app and the background tasks.
    ///
    /// Apps that ignore the graceful request are killed.
    pub async fn shutdown(&self) {
        tracing::info!("runtime shutting down");
        for app_id in self.scheduler.loader().app_ids() {
            self.scheduler.set_daemon(&app_id, false);
        }
        if self.lifetime.destroy_all(false).await.is_err() {
            for failure in self.scheduler.suspend_all(true).await {
                tracing::error!(error = %failure, "app survived forced shutdown");
            }
        }
        self.shutdown.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "runtime task ended abnormally");
            }
        }
        tracing::info!("runtime shut down");
    }

    /// Subscribe to runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.router.events.subscribe()
    }

    /// Loaded configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Process supervisor.
    pub fn scheduler(&self) -> &AppScheduler {
        &self.scheduler
    }

    /// Audio focus arbiter.
    pub fn focus(&self) -> &AudioFocus {
        &self.focus
    }

    /// Visibility view.
    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    /// Foreground stack manager.
    pub fn lifetime(&self) -> &Lifetime {
        &self.lifetime
    }

    /// Inbound event router.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Route an inbound event and publish the result on the event channel.
    pub async fn dispatch(&self, event: InboundEvent) {
        let published = match self.dispatcher.dispatch(event).await {
            Ok(outcome) => RuntimeEvent::Dispatched { outcome },
            Err(e) => {
                tracing::warn!(error = %e, "inbound event rejected");
                RuntimeEvent::DispatchFailed {
                    error: e.to_string(),
                }
            }
        };
        self.router.publish(published);
    }

    fn spawn_exit_pump(&self) -> JoinHandle<()> {
        let mut reports = self.scheduler.subscribe();
        let router = self.router.clone();
        let focus = self.focus.clone();
        let lifetime = self.lifetime.clone();
        let shutdown = self.shutdown.child_token();

        tokio::spawn(async move {
            loop {
                let report = tokio::select! {
                    () = shutdown.cancelled() => break,
                    report = reports.recv() => report,
                };
                match report {
                    Ok(SchedulerEvent::Status { app_id, status }) => {
                        router.publish(RuntimeEvent::AppStatus { app_id, status });
                    }
                    Ok(SchedulerEvent::Exited(exit)) => {
                        router.publish(RuntimeEvent::AppExited {
                            app_id: exit.app_id.clone(),
                            reason: exit.reason,
                        });
                        focus.app_did_exit(&exit.app_id);
                        lifetime.on_app_exit(&exit.app_id).await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "exit pump lagged; some reports were dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("exit pump stopped");
        })
    }
}
