//! Entry point for inbound events (voice command results, cloud directives).
//!
//! The dispatcher resolves the target app, applies the global switch, asks
//! [`Lifetime`] to activate the app, and forwards the request payload to it.
//! A refusal because another app holds a monologue is not an error for the
//! caller: the monopolist is told who knocked ([`AppNotice::Oppressing`]) and
//! the outcome says so.

use crate::app::AppLoader;
use crate::lifetime::{Lifetime, LifetimeError, StackSlot};
use crate::notice::{AppNotice, AppNotifier};
use crate::scheduler::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Event arriving from outside the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Result of voice recognition routed by skill.
    VoiceCommand {
        /// Skill the utterance was classified into.
        skill_id: String,
        /// Recognized intent.
        #[serde(default)]
        intent: Option<String>,
        /// Slot the app is activated into.
        #[serde(default)]
        form: StackSlot,
        /// NLP result forwarded to the app.
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Cloud directive addressed to an app.
    Directive {
        /// Target app.
        app_id: String,
        /// Slot the app is activated into.
        #[serde(default)]
        form: StackSlot,
        /// Directive body forwarded to the app.
        #[serde(default)]
        payload: serde_json::Value,
    },
    /// Bring an app to the foreground without a request.
    Launch {
        /// Target app.
        app_id: String,
        /// Slot the app is activated into.
        #[serde(default)]
        form: StackSlot,
        /// App to recover when the target leaves.
        #[serde(default)]
        carrier_id: Option<String>,
    },
}

/// What happened to a dispatched event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// The app was activated (and handed the request, if any).
    Delivered {
        /// Target app.
        app_id: String,
    },
    /// A monologue refused the activation; the monopolist was notified.
    Oppressed {
        /// App that was refused.
        app_id: String,
        /// App holding the monologue.
        monopolist: String,
    },
}

/// Errors returned by [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The global switch is off.
    #[error("dispatcher is disabled")]
    Disabled,

    /// No installed app serves the skill.
    #[error("no app serves skill {skill_id}")]
    UnknownSkill {
        /// The unresolved skill.
        skill_id: String,
    },

    /// No installed app has this id.
    #[error("app not found: {app_id}")]
    UnknownApp {
        /// The unresolved app.
        app_id: String,
    },

    /// The stack refused the activation.
    #[error(transparent)]
    Lifetime(LifetimeError),

    /// The app could not be launched.
    #[error(transparent)]
    Scheduler(AppError),
}

impl From<LifetimeError> for DispatchError {
    fn from(err: LifetimeError) -> Self {
        match err {
            LifetimeError::Scheduler(inner) => Self::Scheduler(inner),
            other => Self::Lifetime(other),
        }
    }
}

struct Inner {
    enabled: AtomicBool,
    loader: Arc<dyn AppLoader>,
    lifetime: Lifetime,
    notifier: Arc<dyn AppNotifier>,
}

/// Routes inbound events to apps. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with the global switch set to `enabled`.
    pub fn new(
        loader: Arc<dyn AppLoader>,
        lifetime: Lifetime,
        notifier: Arc<dyn AppNotifier>,
        enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled: AtomicBool::new(enabled),
                loader,
                lifetime,
                notifier,
            }),
        }
    }

    /// Flip the global switch.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            tracing::info!(enabled, "dispatcher switch changed");
        }
    }

    /// Whether inbound events are routed.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Route one inbound event.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Disabled`] when the switch is off.
    /// - [`DispatchError::UnknownSkill`] / [`DispatchError::UnknownApp`] when
    ///   the target does not resolve.
    /// - [`DispatchError::Scheduler`] when the app could not be launched.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<DispatchOutcome, DispatchError> {
        if !self.is_enabled() {
            tracing::debug!("inbound event dropped, dispatcher disabled");
            return Err(DispatchError::Disabled);
        }
        let target = self.resolve(event)?;
        tracing::debug!(app_id = %target.app_id, form = %target.form, "dispatching");

        match self
            .inner
            .lifetime
            .activate_app_by_id(&target.app_id, target.form, target.carrier_id)
            .await
        {
            Ok(()) => {}
            Err(LifetimeError::Monopolized { app_id, monopolist }) => {
                tracing::info!(
                    app_id = %app_id,
                    monopolist = %monopolist,
                    "request oppressed by monologue"
                );
                self.inner
                    .notifier
                    .notify(&monopolist, AppNotice::Oppressing { by: app_id.clone() });
                return Ok(DispatchOutcome::Oppressed { app_id, monopolist });
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(payload) = target.request {
            self.inner
                .notifier
                .notify(&target.app_id, AppNotice::Request { payload });
        }
        Ok(DispatchOutcome::Delivered {
            app_id: target.app_id,
        })
    }

    fn resolve(&self, event: InboundEvent) -> Result<Target, DispatchError> {
        match event {
            InboundEvent::VoiceCommand {
                skill_id,
                intent,
                form,
                payload,
            } => {
                let app_id = self
                    .inner
                    .loader
                    .app_id_for_skill(&skill_id)
                    .ok_or_else(|| DispatchError::UnknownSkill {
                        skill_id: skill_id.clone(),
                    })?;
                Ok(Target {
                    app_id,
                    form,
                    carrier_id: None,
                    request: Some(serde_json::json!({
                        "skill_id": skill_id,
                        "intent": intent,
                        "payload": payload,
                    })),
                })
            }
            InboundEvent::Directive {
                app_id,
                form,
                payload,
            } => {
                self.ensure_installed(&app_id)?;
                Ok(Target {
                    app_id,
                    form,
                    carrier_id: None,
                    request: Some(payload),
                })
            }
            InboundEvent::Launch {
                app_id,
                form,
                carrier_id,
            } => {
                self.ensure_installed(&app_id)?;
                Ok(Target {
                    app_id,
                    form,
                    carrier_id,
                    request: None,
                })
            }
        }
    }

    fn ensure_installed(&self, app_id: &str) -> Result<(), DispatchError> {
        if self.inner.loader.manifest(app_id).is_none() {
            return Err(DispatchError::UnknownApp {
                app_id: app_id.to_owned(),
            });
        }
        Ok(())
    }
}

/// Resolved destination of an inbound event.
struct Target {
    app_id: String,
    form: StackSlot,
    carrier_id: Option<String>,
    request: Option<serde_json::Value>,
}
