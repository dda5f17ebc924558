//! Audio output arbitration.
//!
//! Two registers hold the claims on the audio output: a *lasting* register
//! (music, long playback) and a *transient* register (prompts, alarms). The
//! current holder is the transient occupant if any, else the lasting one.
//!
//! Every change of the current holder notifies the apps involved
//! ([`AppNotice::FocusGain`] / [`AppNotice::FocusLoss`]) and publishes a
//! `[new, old]` descriptor pair on [`FOCUS_SHIFT_CHANNEL`].
//!
//! Conflicts never error: [`FocusResult`] carries them back to the caller.

pub mod request;

pub use request::{FocusGain, FocusRequest, FocusResult};

use crate::notice::{AppNotice, AppNotifier, Broadcaster, FOCUS_SHIFT_CHANNEL};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Registers {
    lasting: Option<FocusRequest>,
    transient: Option<FocusRequest>,
}

impl Registers {
    fn current(&self) -> Option<&FocusRequest> {
        self.transient.as_ref().or(self.lasting.as_ref())
    }
}

/// Side effects of one focus operation, emitted after the lock is released.
#[derive(Debug, Default)]
struct Outcome {
    notices: Vec<(String, AppNotice)>,
    shift: Option<(Option<FocusRequest>, Option<FocusRequest>)>,
}

impl Outcome {
    fn gain(&mut self, holder: &FocusRequest) {
        self.notices
            .push((holder.app_id.clone(), AppNotice::FocusGain { id: holder.id }));
    }

    fn loss(&mut self, holder: &FocusRequest, transient: bool, may_duck: bool) {
        self.notices.push((
            holder.app_id.clone(),
            AppNotice::FocusLoss {
                id: holder.id,
                transient,
                may_duck,
            },
        ));
    }
}

struct Inner {
    registers: Mutex<Registers>,
    notifier: Arc<dyn AppNotifier>,
    broadcaster: Arc<dyn Broadcaster>,
}

/// Audio focus arbiter. Cheap to clone.
#[derive(Clone)]
pub struct AudioFocus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AudioFocus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registers = self.lock().clone();
        f.debug_struct("AudioFocus")
            .field("lasting", &registers.lasting)
            .field("transient", &registers.transient)
            .finish()
    }
}

impl AudioFocus {
    /// Create an arbiter with empty registers.
    pub fn new(notifier: Arc<dyn AppNotifier>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registers: Mutex::new(Registers::default()),
                notifier,
                broadcaster,
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Current holder: the transient occupant if any, else the lasting one.
    pub fn current(&self) -> Option<FocusRequest> {
        self.lock().current().cloned()
    }

    /// Occupant of the lasting register.
    pub fn lasting(&self) -> Option<FocusRequest> {
        self.lock().lasting.clone()
    }

    /// Occupant of the transient register.
    pub fn transient(&self) -> Option<FocusRequest> {
        self.lock().transient.clone()
    }

    // ── Operations ───────────────────────────────────────────────────────────

    /// Request the audio focus.
    ///
    /// - [`FocusResult::Failed`]: `req` is transient and another app holds an
    ///   exclusive transient focus.
    /// - [`FocusResult::Rejected`]: the same `(id, app_id)` is held with
    ///   different flags.
    /// - [`FocusResult::Granted`]: stored; a repeat of an identical held
    ///   request changes nothing and notifies nobody.
    pub fn request(&self, req: FocusRequest) -> FocusResult {
        let mut outcome = Outcome::default();
        let result = {
            let mut registers = self.lock();

            let (own, other) = if req.transient {
                (&registers.transient, &registers.lasting)
            } else {
                (&registers.lasting, &registers.transient)
            };
            if let Some(held) = own.as_ref().filter(|held| held.same_owner(&req)) {
                if *held == req {
                    tracing::debug!(request = %req, "focus already held");
                    return FocusResult::Granted;
                }
                tracing::debug!(request = %req, held = %held, "focus held with other flags");
                return FocusResult::Rejected;
            }
            if other.as_ref().is_some_and(|held| held.same_owner(&req)) {
                tracing::debug!(request = %req, "focus held in the other register");
                return FocusResult::Rejected;
            }

            if req.transient
                && let Some(held) = registers.transient.as_ref()
                && held.exclusive
                && held.app_id != req.app_id
            {
                tracing::debug!(request = %req, holder = %held, "exclusive transient focus held");
                return FocusResult::Failed;
            }

            let old_current = registers.current().cloned();
            let replaced = if req.transient {
                registers.transient.replace(req.clone())
            } else {
                registers.lasting.replace(req.clone())
            };
            let new_current = registers.current().cloned();

            if new_current != old_current {
                if let Some(new) = &new_current {
                    outcome.gain(new);
                }
                if let Some(old) = &old_current {
                    outcome.loss(old, req.transient, req.may_duck);
                }
                outcome.shift = Some((new_current, old_current.clone()));
            }
            if let Some(replaced) = replaced
                && old_current.as_ref() != Some(&replaced)
            {
                outcome.loss(&replaced, req.transient, req.may_duck);
            }
            tracing::debug!(request = %req, "focus granted");
            FocusResult::Granted
        };
        self.emit(outcome);
        result
    }

    /// Drop the request `(app_id, id)` from whichever register holds it.
    ///
    /// Returns `false` if no register held it.
    pub fn abandon(&self, app_id: &str, id: i32) -> bool {
        let mut outcome = Outcome::default();
        let removed = {
            let mut registers = self.lock();
            Self::abandon_locked(&mut registers, app_id, id, &mut outcome)
        };
        self.emit(outcome);
        removed
    }

    /// Abandon whichever request is current. Returns the abandoned request.
    pub fn abandon_current_focus(&self) -> Option<FocusRequest> {
        let mut outcome = Outcome::default();
        let current = {
            let mut registers = self.lock();
            let current = registers.current().cloned();
            if let Some(req) = &current {
                Self::abandon_locked(&mut registers, &req.app_id, req.id, &mut outcome);
            }
            current
        };
        self.emit(outcome);
        current
    }

    /// Clear both registers. Only the current holder is notified.
    pub fn abandon_all_focuses(&self) {
        let mut outcome = Outcome::default();
        {
            let mut registers = self.lock();
            let old_current = registers.current().cloned();
            *registers = Registers::default();
            if let Some(old) = old_current {
                outcome.loss(&old, false, false);
                outcome.shift = Some((None, Some(old)));
            }
        }
        tracing::debug!("all focuses abandoned");
        self.emit(outcome);
    }

    /// Abandon every request owned by an app that exited.
    pub fn app_did_exit(&self, app_id: &str) {
        let mut outcome = Outcome::default();
        {
            let mut registers = self.lock();
            // Lasting first, so an app holding both is not handed its own
            // lasting focus back when its transient one goes.
            if let Some(id) = registers
                .lasting
                .as_ref()
                .filter(|r| r.app_id == app_id)
                .map(|r| r.id)
            {
                Self::abandon_locked(&mut registers, app_id, id, &mut outcome);
            }
            if let Some(id) = registers
                .transient
                .as_ref()
                .filter(|r| r.app_id == app_id)
                .map(|r| r.id)
            {
                Self::abandon_locked(&mut registers, app_id, id, &mut outcome);
            }
        }
        self.emit(outcome);
    }

    fn abandon_locked(
        registers: &mut Registers,
        app_id: &str,
        id: i32,
        outcome: &mut Outcome,
    ) -> bool {
        let old_current = registers.current().cloned();
        let removed = if registers.transient.as_ref().is_some_and(|r| r.is(app_id, id)) {
            registers.transient.take()
        } else if registers.lasting.as_ref().is_some_and(|r| r.is(app_id, id)) {
            registers.lasting.take()
        } else {
            return false;
        };
        let Some(removed) = removed else {
            return false;
        };

        if old_current.as_ref() == Some(&removed) {
            outcome.loss(&removed, false, false);
            let new_current = registers.current().cloned();
            if let Some(recovered) = &new_current {
                outcome.gain(recovered);
            }
            // A second shift in the same operation supersedes the first;
            // keep the earliest `old` so the pair spans the whole change.
            let old = match outcome.shift.take() {
                Some((_, earlier_old)) => earlier_old,
                None => old_current,
            };
            outcome.shift = Some((new_current, old));
        }
        tracing::debug!(app_id, id, "focus abandoned");
        true
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Registers> {
        self.inner
            .registers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, outcome: Outcome) {
        for (app_id, notice) in outcome.notices {
            self.inner.notifier.notify(&app_id, notice);
        }
        if let Some((new, old)) = outcome.shift {
            tracing::debug!(
                new = ?new.as_ref().map(ToString::to_string),
                old = ?old.as_ref().map(ToString::to_string),
                "focus shift"
            );
            self.inner
                .broadcaster
                .dispatch(FOCUS_SHIFT_CHANNEL, serde_json::json!([new, old]));
        }
    }
}
