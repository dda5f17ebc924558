//! Focus request descriptors, gain presets, and request results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named gain presets an app picks from when requesting focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusGain {
    /// Lasting focus, e.g. music playback.
    #[default]
    Default,
    /// Short interruption, e.g. a prompt or alarm.
    Transient,
    /// Short interruption no other transient request may take over.
    TransientExclusive,
    /// Short interruption the lasting holder may keep playing under, ducked.
    TransientMayDuck,
}

impl FocusGain {
    /// `(transient, exclusive, may_duck)` flags of the preset.
    pub fn flags(self) -> (bool, bool, bool) {
        match self {
            Self::Default => (false, false, false),
            Self::Transient => (true, false, false),
            Self::TransientExclusive => (true, true, false),
            Self::TransientMayDuck => (true, false, true),
        }
    }
}

/// One app's claim on the audio output.
///
/// Serializes in the `{id, appId, transient, exclusive, mayDuck}` descriptor
/// shape carried by the focus-shift broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusRequest {
    /// Request id chosen by the app.
    pub id: i32,
    /// Requesting app.
    pub app_id: String,
    /// Goes to the transient register.
    pub transient: bool,
    /// Blocks other apps' transient requests while held.
    pub exclusive: bool,
    /// Tolerates ducked playback of the lasting holder.
    pub may_duck: bool,
}

impl FocusRequest {
    /// Build a request from a gain preset.
    pub fn new(id: i32, app_id: impl Into<String>, gain: FocusGain) -> Self {
        let (transient, exclusive, may_duck) = gain.flags();
        Self {
            id,
            app_id: app_id.into(),
            transient,
            exclusive,
            may_duck,
        }
    }

    /// Same `(id, app_id)` owner.
    pub fn same_owner(&self, other: &Self) -> bool {
        self.id == other.id && self.app_id == other.app_id
    }

    /// Whether this request matches `app_id` and `id`.
    pub fn is(&self, app_id: &str, id: i32) -> bool {
        self.id == id && self.app_id == app_id
    }
}

impl fmt::Display for FocusRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.app_id, self.id)?;
        if self.transient {
            f.write_str(" transient")?;
        }
        if self.exclusive {
            f.write_str(" exclusive")?;
        }
        if self.may_duck {
            f.write_str(" may-duck")?;
        }
        Ok(())
    }
}

/// Outcome of [`AudioFocus::request`](super::AudioFocus::request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusResult {
    /// Stored, or already held with identical flags.
    Granted,
    /// Another app holds an exclusive transient focus.
    Failed,
    /// Same request already held with different flags; abandon it first.
    Rejected,
}

impl FocusResult {
    /// Numeric sentinel for the app-facing call surface.
    pub fn code(self) -> i32 {
        match self {
            Self::Granted => 0,
            Self::Failed => -1,
            Self::Rejected => -3,
        }
    }

    /// Whether the request was granted.
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}
