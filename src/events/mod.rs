//! Events handed from the keyboard hook thread to the daemon
//!
//! Trigger actions publish these over a channel so that any slow work
//! (typing a replacement, logging, notifying other components) happens off
//! the hook thread.

use serde::{Deserialize, Serialize};

/// Events emitted when a trigger fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HotstringEvent {
    /// A hotstring watch matched its trigger
    Fired {
        /// Name of the watch that matched
        watch: String,
    },

    /// A registered hotkey combination was pressed
    HotkeyPressed {
        /// Id the hotkey was registered under
        id: String,
    },
}

impl std::fmt::Display for HotstringEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotstringEvent::Fired { watch } => write!(f, "HOTSTRING_FIRED ({})", watch),
            HotstringEvent::HotkeyPressed { id } => write!(f, "HOTKEY_PRESSED ({})", id),
        }
    }
}
