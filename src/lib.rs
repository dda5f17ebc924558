//! Yoda VUI: orchestration core of a voice-assistant device runtime.
//!
//! Decides which app owns the user-facing foreground, arbitrates the audio
//! output among competing apps, and supervises each app's process.
//!
//! # Architecture
//!
//! - **Lifetime**: two-slot foreground stack (`cut`, `scene`) with
//!   preemption, keep-alive, monologue and carrier recovery
//! - **AppScheduler**: launches app workers, suspends them gracefully or by
//!   force, relaunches daemons and terminates hung apps
//! - **AudioFocus**: lasting and transient focus registers with gain/loss
//!   notices and a focus-shift broadcast
//! - **Dispatcher**: routes voice commands and directives to apps
//! - **Runtime**: wires the above together and exposes one event stream

pub mod app;
pub mod audio_focus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod lifetime;
pub mod notice;
pub mod runtime;
pub mod runtime_dirs;
pub mod scheduler;
pub mod visibility;

#[doc(hidden)]
pub mod test_utils;

pub use app::{AppLoader, AppManifest, AppType, LaunchOptions, ManifestRegistry};
pub use audio_focus::{AudioFocus, FocusGain, FocusRequest, FocusResult};
pub use config::RuntimeConfig;
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher, InboundEvent};
pub use error::{Result, VuiError};
pub use lifetime::{Lifetime, LifetimeError, StackSlot};
pub use notice::{AppNotice, AppNotifier, Broadcaster, LifecycleEvent};
pub use runtime::{Runtime, RuntimeEvent};
pub use scheduler::{AppError, AppScheduler, AppStatus, LauncherRegistry};
pub use visibility::Visibility;
