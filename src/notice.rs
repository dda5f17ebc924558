//! Typed notices delivered from the orchestrator to individual apps.
//!
//! Every notification the core emits towards an app (lifecycle changes,
//! stack preemption, audio focus changes, forwarded requests) is one of the
//! closed set of [`AppNotice`] variants. Components never talk to workers
//! directly; they hand notices to an [`AppNotifier`], and system-wide
//! telemetry goes through a [`Broadcaster`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broadcast channel carrying `[new, old]` audio focus descriptors.
pub const FOCUS_SHIFT_CHANNEL: &str = "yodaos.audio-focus.on-focus-shift";

/// Lifecycle events delivered to an app's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Worker finished launching and is now owned by the scheduler.
    Create,
    /// App became the current foreground app.
    Resume,
    /// App keeps its slot but lost the foreground to a cut app.
    Pause,
    /// App left its slot but keeps its context and process.
    Background,
    /// App is about to be torn down.
    Destroy,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Resume => "resume",
            Self::Pause => "pause",
            Self::Background => "background",
            Self::Destroy => "destroy",
        };
        f.write_str(label)
    }
}

/// A notification addressed to one app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppNotice {
    /// Lifecycle transition.
    Lifecycle {
        /// The lifecycle event.
        event: LifecycleEvent,
    },
    /// The app lost its stack slot to another app.
    Preemption,
    /// The app was removed from the stack.
    Eviction,
    /// Another app tried to take the foreground while this app holds a monologue.
    Oppressing {
        /// App that was refused.
        by: String,
    },
    /// The app now holds the current audio focus for request `id`.
    FocusGain {
        /// Focus request id.
        id: i32,
    },
    /// The app no longer holds the current audio focus for request `id`.
    ///
    /// `transient` and `may_duck` describe the request that took the focus,
    /// not the losing request.
    FocusLoss {
        /// Focus request id.
        id: i32,
        /// Whether the new holder is transient.
        transient: bool,
        /// Whether the new holder tolerates ducked playback.
        may_duck: bool,
    },
    /// Inbound request forwarded by the dispatcher.
    Request {
        /// Opaque request payload (NLP result, cloud directive, ...).
        payload: serde_json::Value,
    },
}

impl AppNotice {
    /// Shorthand for a lifecycle notice.
    #[must_use]
    pub fn lifecycle(event: LifecycleEvent) -> Self {
        Self::Lifecycle { event }
    }
}

/// Delivers notices to apps.
pub trait AppNotifier: Send + Sync + 'static {
    /// Deliver `notice` to `app_id`. Delivery is best effort: a notice for an
    /// app without a live worker is dropped.
    fn notify(&self, app_id: &str, notice: AppNotice);
}

/// Publishes system-wide broadcasts.
pub trait Broadcaster: Send + Sync + 'static {
    /// Publish `payload` on `channel`.
    fn dispatch(&self, channel: &str, payload: serde_json::Value);
}

/// Notifier and broadcaster that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl AppNotifier for NoopNotifier {
    fn notify(&self, _app_id: &str, _notice: AppNotice) {}
}

impl Broadcaster for NoopNotifier {
    fn dispatch(&self, _channel: &str, _payload: serde_json::Value) {}
}
