//! Which apps are currently seen and heard, derived from [`AudioFocus`].

use crate::audio_focus::{AudioFocus, FocusRequest};

/// Read view over the audio focus registers.
#[derive(Debug, Clone)]
pub struct Visibility {
    focus: AudioFocus,
}

impl Visibility {
    /// Create a view over `focus`.
    pub fn new(focus: AudioFocus) -> Self {
        Self { focus }
    }

    /// App holding the current focus.
    pub fn key_and_visible_app_id(&self) -> Option<String> {
        self.focus.current().map(|r| r.app_id)
    }

    /// Apps whose audio is currently audible: the current holder, plus the
    /// lasting holder while a may-duck transient request is on top.
    pub fn audible_app_ids(&self) -> Vec<String> {
        let Some(current) = self.focus.current() else {
            return Vec::new();
        };
        let mut ids = vec![current.app_id.clone()];
        if current.transient
            && current.may_duck
            && let Some(lasting) = self.focus.lasting()
            && lasting.app_id != current.app_id
        {
            ids.push(lasting.app_id);
        }
        ids
    }

    /// Abandon the current focus. Returns the request that held it.
    pub fn abandon_key_visibility(&self) -> Option<FocusRequest> {
        self.focus.abandon_current_focus()
    }

    /// Abandon every focus.
    pub fn abandon_all_visibilities(&self) {
        self.focus.abandon_all_focuses();
    }
}
