//! Events module for hotkey lifecycle notifications
//!
//! The dispatch loop publishes these on a broadcast channel so observers
//! (the daemon's log, a status UI) can follow registrations and triggers
//! without touching the hotkey handles themselves.

use serde::{Deserialize, Serialize};

/// Events emitted by the dispatch loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HotKeyEvent {
    /// The loop owns the backend and is pumping events
    LoopStarted {
        backend: String,
    },

    /// The loop has released the backend
    LoopStopped,

    /// A native grab was installed
    Registered { combo: String },

    /// A native grab was removed
    Unregistered { combo: String },

    /// Registration at loop start failed
    RegistrationFailed { combo: String, error: String },

    /// The handle was removed from the registry
    Freed { combo: String },

    /// The hotkey was pressed and its callback is about to run
    Triggered { combo: String },

    /// The callback returned an error or panicked
    CallbackFailed { combo: String, error: String },
}

impl std::fmt::Display for HotKeyEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotKeyEvent::LoopStarted { backend } => write!(f, "LOOP_STARTED ({})", backend),
            HotKeyEvent::LoopStopped => write!(f, "LOOP_STOPPED"),
            HotKeyEvent::Registered { combo } => write!(f, "REGISTERED {}", combo),
            HotKeyEvent::Unregistered { combo } => write!(f, "UNREGISTERED {}", combo),
            HotKeyEvent::RegistrationFailed { combo, error } => {
                write!(f, "REGISTRATION_FAILED {} ({})", combo, error)
            }
            HotKeyEvent::Freed { combo } => write!(f, "FREED {}", combo),
            HotKeyEvent::Triggered { combo } => write!(f, "TRIGGERED {}", combo),
            HotKeyEvent::CallbackFailed { combo, error } => {
                write!(f, "CALLBACK_FAILED {} ({})", combo, error)
            }
        }
    }
}
