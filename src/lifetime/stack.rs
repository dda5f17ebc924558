//! Foreground stack policy.
//!
//! [`ForegroundStack`] is pure state: every operation settles the slots
//! synchronously and returns the [`StackEffect`]s the caller must carry out
//! (notices, process teardown, carrier recovery). Nothing here awaits.
//!
//! # Slots
//!
//! | Slot | Holds | Preempted by a `cut` | Preempted by a `scene` |
//! |------|-------|----------------------|------------------------|
//! | `cut` | command-style app | evicted | evicted |
//! | `scene` | immersive app | paused, resumed later | evicted |
//!
//! A preempted app with `keep_alive` is moved to the background instead of
//! being evicted.

use crate::notice::{AppNotice, LifecycleEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Foreground slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackSlot {
    /// Ephemeral command-style app.
    #[default]
    Cut,
    /// Persistent, immersive app.
    Scene,
}

impl fmt::Display for StackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cut => f.write_str("cut"),
            Self::Scene => f.write_str("scene"),
        }
    }
}

/// Per-app record, present exactly while the app is in the stack.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextOptions {
    /// Slot the app was last activated into.
    pub form: StackSlot,
    /// Move to the background instead of being evicted when preempted.
    pub keep_alive: bool,
    /// App reactivated when this one leaves an otherwise idle stack.
    pub carrier_id: Option<String>,
}

/// Work the caller performs after a stack operation settled.
#[derive(Debug, Clone, PartialEq)]
pub enum StackEffect {
    /// Deliver a notice.
    Notify {
        /// Recipient.
        app_id: String,
        /// The notice.
        notice: AppNotice,
    },
    /// Tear down the app's process unless it is a daemon.
    Destroy {
        /// App that left the stack.
        app_id: String,
    },
    /// Reactivate a carrier app.
    Recover {
        /// The carrier.
        carrier_id: String,
    },
}

impl StackEffect {
    fn notify(app_id: &str, notice: AppNotice) -> Self {
        Self::Notify {
            app_id: app_id.to_owned(),
            notice,
        }
    }

    fn lifecycle(app_id: &str, event: LifecycleEvent) -> Self {
        Self::notify(app_id, AppNotice::lifecycle(event))
    }
}

/// The stack refused an activation because another app holds a monologue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monopolized {
    /// App holding the monologue.
    pub monopolist: String,
}

/// Two foreground slots, the current app, and the per-app contexts.
#[derive(Debug, Clone, Default)]
pub struct ForegroundStack {
    cut: Option<String>,
    scene: Option<String>,
    current: Option<String>,
    contexts: HashMap<String, ContextOptions>,
    monopolist: Option<String>,
}

impl ForegroundStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Observers ────────────────────────────────────────────────────────────

    /// Most recently activated slot occupant.
    pub fn current_app_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Occupant of the `cut` slot.
    pub fn cut_app_id(&self) -> Option<&str> {
        self.cut.as_deref()
    }

    /// Occupant of the `scene` slot.
    pub fn scene_app_id(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    /// Slot the app occupies, if any.
    pub fn slot_of(&self, app_id: &str) -> Option<StackSlot> {
        if self.cut.as_deref() == Some(app_id) {
            Some(StackSlot::Cut)
        } else if self.scene.as_deref() == Some(app_id) {
            Some(StackSlot::Scene)
        } else {
            None
        }
    }

    /// Whether the app has a context (in a slot or in the background).
    pub fn is_app_in_stack(&self, app_id: &str) -> bool {
        self.contexts.contains_key(app_id)
    }

    /// Whether the app has a context but no slot.
    pub fn is_background(&self, app_id: &str) -> bool {
        self.is_app_in_stack(app_id) && self.slot_of(app_id).is_none()
    }

    /// Apps with a context but no slot, sorted.
    pub fn background_app_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .contexts
            .keys()
            .filter(|id| self.slot_of(id).is_none())
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Context of an app in the stack.
    pub fn context(&self, app_id: &str) -> Option<&ContextOptions> {
        self.contexts.get(app_id)
    }

    /// Replace an app's `keep_alive` and `carrier_id`. `form` always
    /// reflects the slot and is not taken from `options`.
    ///
    /// Returns `false` if the app is not in the stack.
    pub fn set_context(&mut self, app_id: &str, options: ContextOptions) -> bool {
        let Some(context) = self.contexts.get_mut(app_id) else {
            return false;
        };
        context.keep_alive = options.keep_alive;
        context.carrier_id = options.carrier_id;
        true
    }

    /// App holding the monologue, whether or not it is on top.
    pub fn monopolist(&self) -> Option<&str> {
        self.monopolist.as_deref()
    }

    /// A monologue is active and its holder is the current app.
    pub fn is_monopolized(&self) -> bool {
        self.monopolist.is_some() && self.monopolist == self.current
    }

    /// Whether the app already is the current occupant of `form`.
    pub fn is_active_in(&self, app_id: &str, form: StackSlot) -> bool {
        self.slot_of(app_id) == Some(form) && self.current.as_deref() == Some(app_id)
    }

    /// Whether activating `app_id` into `form` is allowed under the monologue.
    ///
    /// A `cut` activation may pause a monologue held by the `scene` app;
    /// any other activation by another app is refused.
    ///
    /// # Errors
    ///
    /// [`Monopolized`] naming the monopolist.
    pub fn check_monopoly(&self, app_id: &str, form: StackSlot) -> Result<(), Monopolized> {
        if !self.is_monopolized() {
            return Ok(());
        }
        let Some(monopolist) = self.monopolist.as_deref() else {
            return Ok(());
        };
        if monopolist == app_id
            || (form == StackSlot::Cut && self.scene.as_deref() == Some(monopolist))
        {
            return Ok(());
        }
        Err(Monopolized {
            monopolist: monopolist.to_owned(),
        })
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Move `app_id` into `form` and make it current.
    ///
    /// `carrier_id` replaces the recorded carrier when given; otherwise an
    /// existing carrier is kept.
    ///
    /// # Errors
    ///
    /// [`Monopolized`] with no state change.
    pub fn activate(
        &mut self,
        app_id: &str,
        form: StackSlot,
        carrier_id: Option<String>,
    ) -> Result<Vec<StackEffect>, Monopolized> {
        if self.is_active_in(app_id, form) {
            return Ok(Vec::new());
        }
        self.check_monopoly(app_id, form)?;

        let mut effects = Vec::new();
        match self.slot_of(app_id) {
            Some(StackSlot::Cut) if form == StackSlot::Scene => self.cut = None,
            Some(StackSlot::Scene) if form == StackSlot::Cut => self.scene = None,
            _ => {}
        }

        if let Some(previous) = self.slot_mut(form).take()
            && previous != app_id
        {
            self.displace(&previous, &mut effects);
        }
        match form {
            StackSlot::Scene => {
                if let Some(cut) = self.cut.take() {
                    self.displace(&cut, &mut effects);
                }
            }
            StackSlot::Cut => {
                if let Some(scene) = self.scene.as_deref()
                    && self.current.as_deref() == Some(scene)
                {
                    effects.push(StackEffect::lifecycle(scene, LifecycleEvent::Pause));
                }
            }
        }

        *self.slot_mut(form) = Some(app_id.to_owned());
        let context = self.contexts.entry(app_id.to_owned()).or_default();
        context.form = form;
        if carrier_id.is_some() {
            context.carrier_id = carrier_id;
        }
        self.current = Some(app_id.to_owned());
        effects.push(StackEffect::lifecycle(app_id, LifecycleEvent::Resume));

        tracing::debug!(app_id, form = %form, "app activated");
        Ok(effects)
    }

    /// Remove `app_id` from the stack on its own request.
    ///
    /// A paused scene resumes; otherwise the carrier is recovered when the
    /// stack went idle. `keep_alive` apps stay in the background.
    pub fn deactivate(&mut self, app_id: &str) -> Vec<StackEffect> {
        let Some(context) = self.contexts.get(app_id).cloned() else {
            return Vec::new();
        };
        let mut effects = Vec::new();

        if self.slot_of(app_id).is_none() {
            self.contexts.remove(app_id);
            effects.push(StackEffect::Destroy {
                app_id: app_id.to_owned(),
            });
            tracing::debug!(app_id, "background app deactivated");
            return effects;
        }

        let idle = self.vacate(app_id, &mut effects);
        if context.keep_alive {
            effects.push(StackEffect::lifecycle(app_id, LifecycleEvent::Background));
        } else {
            self.contexts.remove(app_id);
            effects.push(StackEffect::Destroy {
                app_id: app_id.to_owned(),
            });
        }
        if idle {
            self.recover_carrier(app_id, context.carrier_id, &mut effects);
        }
        tracing::debug!(app_id, keep_alive = context.keep_alive, "app deactivated");
        effects
    }

    /// Move `app_id` out of its slot into the background, keeping its context.
    pub fn set_background(&mut self, app_id: &str) -> Vec<StackEffect> {
        let mut effects = Vec::new();
        if self.slot_of(app_id).is_none() {
            return effects;
        }
        self.vacate(app_id, &mut effects);
        effects.push(StackEffect::lifecycle(app_id, LifecycleEvent::Background));
        tracing::debug!(app_id, "app moved to background");
        effects
    }

    /// Drop `app_id` from the stack regardless of `keep_alive`. The caller
    /// tears the process down itself.
    pub fn remove(&mut self, app_id: &str) -> Vec<StackEffect> {
        let mut effects = Vec::new();
        let Some(context) = self.contexts.remove(app_id) else {
            return effects;
        };
        let idle = self.slot_of(app_id).is_some() && self.vacate(app_id, &mut effects);
        if self.monopolist.as_deref() == Some(app_id) {
            self.monopolist = None;
        }
        if idle {
            self.recover_carrier(app_id, context.carrier_id, &mut effects);
        }
        tracing::debug!(app_id, "app removed from stack");
        effects
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Start a monologue for the current app.
    ///
    /// Returns `false` unless `app_id` is current.
    pub fn start_monologue(&mut self, app_id: &str) -> bool {
        if self.current.as_deref() != Some(app_id) {
            return false;
        }
        self.monopolist = Some(app_id.to_owned());
        tracing::debug!(app_id, "monologue started");
        true
    }

    /// End any monologue.
    pub fn stop_monologue(&mut self) {
        if let Some(monopolist) = self.monopolist.take() {
            tracing::debug!(app_id = %monopolist, "monologue stopped");
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn slot_mut(&mut self, slot: StackSlot) -> &mut Option<String> {
        match slot {
            StackSlot::Cut => &mut self.cut,
            StackSlot::Scene => &mut self.scene,
        }
    }

    /// Preempted `app_id` already left its slot: background or evict it.
    fn displace(&mut self, app_id: &str, effects: &mut Vec<StackEffect>) {
        effects.push(StackEffect::notify(app_id, AppNotice::Preemption));
        if self.monopolist.as_deref() == Some(app_id) {
            self.monopolist = None;
        }
        if self.contexts.get(app_id).is_some_and(|c| c.keep_alive) {
            effects.push(StackEffect::lifecycle(app_id, LifecycleEvent::Background));
            tracing::debug!(app_id, "preempted app kept alive in background");
            return;
        }
        self.contexts.remove(app_id);
        effects.push(StackEffect::notify(app_id, AppNotice::Eviction));
        effects.push(StackEffect::Destroy {
            app_id: app_id.to_owned(),
        });
        tracing::info!(app_id, "app evicted");
    }

    /// Empties `app_id`'s slot and fixes `current`. Returns `true` if the
    /// stack has no current app afterwards.
    fn vacate(&mut self, app_id: &str, effects: &mut Vec<StackEffect>) -> bool {
        match self.slot_of(app_id) {
            Some(StackSlot::Cut) => self.cut = None,
            Some(StackSlot::Scene) => self.scene = None,
            None => return false,
        }
        if self.monopolist.as_deref() == Some(app_id) {
            self.monopolist = None;
        }
        if self.current.as_deref() != Some(app_id) {
            return self.current.is_none();
        }
        self.current = self.cut.clone().or_else(|| self.scene.clone());
        match self.current.as_deref() {
            Some(resumed) => {
                effects.push(StackEffect::lifecycle(resumed, LifecycleEvent::Resume));
                false
            }
            None => true,
        }
    }

    fn recover_carrier(
        &self,
        app_id: &str,
        carrier_id: Option<String>,
        effects: &mut Vec<StackEffect>,
    ) {
        let Some(carrier_id) = carrier_id else {
            return;
        };
        if carrier_id == app_id || self.slot_of(&carrier_id).is_some() {
            return;
        }
        tracing::debug!(app_id, carrier_id = %carrier_id, "recovering carrier");
        effects.push(StackEffect::Recover { carrier_id });
    }
}
