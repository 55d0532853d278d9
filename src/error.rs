//! Error types shared by the translator, backends and the dispatch loop

use std::time::Duration;

/// A combo string could not be translated into a hotkey code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("hotkey combo is empty")]
    Empty,

    #[error("unknown key `{0}`")]
    UnknownKey(String),

    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
}

/// A native call failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct PlatformError {
    /// Name of the native operation, e.g. `XGrabKey`
    pub operation: &'static str,
    /// OS error code, when the platform reported one
    pub code: Option<i32>,
    pub message: String,
}

impl PlatformError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            code: None,
            message: message.into(),
        }
    }

    pub fn from_io(operation: &'static str, err: &std::io::Error) -> Self {
        Self {
            operation,
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// Errors returned by hotkey handles and the dispatch loop
///
/// The type is `Clone` so that a result produced on the dispatch thread can
/// be handed back to the thread that asked for it without losing its kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotKeyError {
    #[error("invalid hotkey combo: {0}")]
    Parse(#[from] ParseError),

    #[error("hotkey `{combo}` is already taken")]
    Duplicate { combo: String },

    #[error("hotkey `{0}` is already active")]
    AlreadyActive(String),

    #[error("hotkey `{0}` is not active")]
    NotActive(String),

    #[error("hotkey handle has been freed")]
    Freed,

    #[error("no hotkey registered for `{0}`")]
    NotFound(String),

    #[error("hotkey dispatch loop is already running")]
    AlreadyRunning,

    #[error("hotkey dispatch loop is not running")]
    NotRunning,

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("hotkey dispatch thread did not respond within {0:?}")]
    WorkerUnresponsive(Duration),

    #[error("failed to spawn dispatch thread: {0}")]
    ThreadSpawn(String),
}
