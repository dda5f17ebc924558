//! Foreground stack manager.
//!
//! [`Lifetime`] owns the [`ForegroundStack`] and keeps app processes in step
//! with it: activation launches the app through the [`AppScheduler`],
//! eviction and deactivation suspend it. The stack is settled under its lock
//! before any notice is sent or process touched, so observers never see a
//! half-applied preemption.

pub mod stack;

pub use stack::{ContextOptions, ForegroundStack, Monopolized, StackEffect, StackSlot};

use crate::notice::AppNotifier;
use crate::scheduler::{AppError, AppScheduler, AppStatus};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Errors returned by stack operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifetimeError {
    /// Another app holds a monologue.
    #[error("cannot activate {app_id}: stack is monopolized by {monopolist}")]
    Monopolized {
        /// App that was refused.
        app_id: String,
        /// App holding the monologue.
        monopolist: String,
    },

    /// The operation needs the app to be current.
    #[error("app {app_id} is not the current app")]
    NotActive {
        /// App the operation was attempted for.
        app_id: String,
    },

    /// Launching or suspending the app failed.
    #[error(transparent)]
    Scheduler(#[from] AppError),
}

impl LifetimeError {
    fn monopolized(app_id: &str, refusal: Monopolized) -> Self {
        Self::Monopolized {
            app_id: app_id.to_owned(),
            monopolist: refusal.monopolist,
        }
    }
}

struct Inner {
    stack: Mutex<ForegroundStack>,
    scheduler: AppScheduler,
    notifier: Arc<dyn AppNotifier>,
}

/// Foreground stack manager. Cheap to clone.
#[derive(Clone)]
pub struct Lifetime {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifetime")
            .field("stack", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl Lifetime {
    /// Create an empty stack driving `scheduler`.
    pub fn new(scheduler: AppScheduler, notifier: Arc<dyn AppNotifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                stack: Mutex::new(ForegroundStack::new()),
                scheduler,
                notifier,
            }),
        }
    }

    // ── Observers ────────────────────────────────────────────────────────────

    /// Most recently activated slot occupant.
    pub fn current_app_id(&self) -> Option<String> {
        self.lock().current_app_id().map(str::to_owned)
    }

    /// Occupant of the `cut` slot.
    pub fn cut_app_id(&self) -> Option<String> {
        self.lock().cut_app_id().map(str::to_owned)
    }

    /// Occupant of the `scene` slot.
    pub fn scene_app_id(&self) -> Option<String> {
        self.lock().scene_app_id().map(str::to_owned)
    }

    /// Whether the app has a context.
    pub fn is_app_in_stack(&self, app_id: &str) -> bool {
        self.lock().is_app_in_stack(app_id)
    }

    /// Whether the app has a context but no slot.
    pub fn is_background(&self, app_id: &str) -> bool {
        self.lock().is_background(app_id)
    }

    /// Background apps, sorted.
    pub fn background_app_ids(&self) -> Vec<String> {
        self.lock().background_app_ids()
    }

    /// App holding the monologue.
    pub fn monopolist(&self) -> Option<String> {
        self.lock().monopolist().map(str::to_owned)
    }

    /// A monologue is active and its holder is on top.
    pub fn is_monopolized(&self) -> bool {
        self.lock().is_monopolized()
    }

    /// Context of an app in the stack.
    pub fn get_context_options_by_id(&self, app_id: &str) -> Option<ContextOptions> {
        self.lock().context(app_id).cloned()
    }

    /// Update an app's `keep_alive` and `carrier_id`. Returns `false` if the
    /// app is not in the stack.
    pub fn set_context_options_by_id(&self, app_id: &str, options: ContextOptions) -> bool {
        self.lock().set_context(app_id, options)
    }

    // ── Activation ───────────────────────────────────────────────────────────

    /// Move `app_id` into `form` and make it current, launching it if needed.
    ///
    /// # Errors
    ///
    /// - [`LifetimeError::Monopolized`] with no state change.
    /// - [`LifetimeError::Scheduler`] if the app could not be launched; the
    ///   stack is left untouched.
    ///
    /// An app left unhealthy by a timed-out suspend is force-suspended and
    /// launched afresh.
    pub async fn activate_app_by_id(
        &self,
        app_id: &str,
        form: StackSlot,
        carrier_id: Option<String>,
    ) -> Result<(), LifetimeError> {
        {
            let stack = self.lock();
            if stack.is_active_in(app_id, form) {
                return Ok(());
            }
            stack
                .check_monopoly(app_id, form)
                .map_err(|m| LifetimeError::monopolized(app_id, m))?;
        }

        match self.inner.scheduler.create_app(app_id, None).await {
            Err(AppError::Unhealthy { .. }) => {
                tracing::warn!(app_id, "unhealthy app force-suspended before activation");
                self.inner.scheduler.suspend_app(app_id, true).await?;
                self.inner.scheduler.create_app(app_id, None).await?;
            }
            result => result?,
        }

        let effects = self
            .lock()
            .activate(app_id, form, carrier_id)
            .map_err(|m| LifetimeError::monopolized(app_id, m))?;
        tracing::info!(app_id, form = %form, "app active");
        self.execute(effects).await;
        Ok(())
    }

    /// Bring an app (usually a background one) back into `form`.
    ///
    /// Same rules as [`activate_app_by_id`](Self::activate_app_by_id); the
    /// recorded carrier is kept.
    ///
    /// # Errors
    ///
    /// As for [`activate_app_by_id`](Self::activate_app_by_id).
    pub async fn set_foreground_by_id(
        &self,
        app_id: &str,
        form: StackSlot,
    ) -> Result<(), LifetimeError> {
        self.activate_app_by_id(app_id, form, None).await
    }

    // ── Removal ──────────────────────────────────────────────────────────────

    /// Remove `app_id` from its slot. No-op if it is not in the stack.
    pub async fn deactivate_app_by_id(&self, app_id: &str) {
        let effects = self.lock().deactivate(app_id);
        self.execute(effects).await;
    }

    /// Deactivate the `cut` occupant, if any and if it matches `filter`.
    /// Returns the deactivated app.
    pub async fn deactivate_cut_app(&self, filter: Option<&str>) -> Option<String> {
        let effects_and_id = {
            let mut stack = self.lock();
            let cut = stack.cut_app_id()?.to_owned();
            if filter.is_some_and(|f| f != cut) {
                return None;
            }
            (stack.deactivate(&cut), cut)
        };
        let (effects, cut) = effects_and_id;
        self.execute(effects).await;
        Some(cut)
    }

    /// Move `app_id` out of its slot, keeping its context and process.
    /// Returns `false` if it held no slot.
    pub async fn set_background_by_id(&self, app_id: &str) -> bool {
        let effects = self.lock().set_background(app_id);
        if effects.is_empty() {
            return false;
        }
        self.execute(effects).await;
        true
    }

    /// Remove `app_id` from the stack and suspend its process.
    ///
    /// # Errors
    ///
    /// [`LifetimeError::Scheduler`] if the suspend failed.
    pub async fn destroy_app_by_id(&self, app_id: &str, force: bool) -> Result<(), LifetimeError> {
        let effects = self.lock().remove(app_id);
        self.execute(effects).await;
        self.inner.scheduler.suspend_app(app_id, force).await?;
        Ok(())
    }

    /// Clear the stack and suspend every app.
    ///
    /// # Errors
    ///
    /// The first [`LifetimeError::Scheduler`] failure; every app is still
    /// attempted.
    pub async fn destroy_all(&self, force: bool) -> Result<(), LifetimeError> {
        self.lock().clear();
        tracing::info!(force, "destroying all apps");
        let failures = self.inner.scheduler.suspend_all(force).await;
        for failure in &failures {
            tracing::warn!(error = %failure, "app did not shut down");
        }
        match failures.into_iter().next() {
            Some(first) => Err(first.into()),
            None => Ok(()),
        }
    }

    /// Drop an app whose process exited from the stack.
    ///
    /// Ignored when the app is live again by the time the report arrives.
    pub async fn on_app_exit(&self, app_id: &str) {
        if matches!(
            self.inner.scheduler.status(app_id),
            Some(AppStatus::Creating | AppStatus::Running)
        ) {
            tracing::debug!(app_id, "stale exit report ignored");
            return;
        }
        let effects = {
            let mut stack = self.lock();
            if !stack.is_app_in_stack(app_id) {
                return;
            }
            stack.remove(app_id)
        };
        tracing::info!(app_id, "exited app removed from stack");
        self.execute(effects).await;
    }

    // ── Monologue ────────────────────────────────────────────────────────────

    /// Forbid other apps from taking the foreground from `app_id`.
    ///
    /// # Errors
    ///
    /// [`LifetimeError::NotActive`] unless `app_id` is current.
    pub fn start_monologue(&self, app_id: &str) -> Result<(), LifetimeError> {
        if self.lock().start_monologue(app_id) {
            Ok(())
        } else {
            Err(LifetimeError::NotActive {
                app_id: app_id.to_owned(),
            })
        }
    }

    /// End the monologue.
    pub fn stop_monologue(&self) {
        self.lock().stop_monologue();
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, ForegroundStack> {
        self.inner
            .stack
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn execute(&self, effects: Vec<StackEffect>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            for effect in effects {
                match effect {
                    StackEffect::Notify { app_id, notice } => {
                        self.inner.notifier.notify(&app_id, notice);
                    }
                    StackEffect::Destroy { app_id } => {
                        if self.inner.scheduler.is_daemon(&app_id) {
                            tracing::debug!(app_id = %app_id, "daemon app left the stack, process kept");
                            continue;
                        }
                        if let Err(e) = self.inner.scheduler.suspend_app(&app_id, false).await {
                            tracing::warn!(app_id = %app_id, error = %e, "failed to suspend app leaving the stack");
                        }
                    }
                    StackEffect::Recover { carrier_id } => {
                        let recovery: BoxFuture<'_, Result<(), LifetimeError>> =
                            Box::pin(self.activate_app_by_id(&carrier_id, StackSlot::Cut, None));
                        if let Err(e) = recovery.await {
                            tracing::warn!(carrier_id = %carrier_id, error = %e, "carrier recovery failed");
                        }
                    }
                }
            }
        })
    }
}
