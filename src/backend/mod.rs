//! Platform backends
//!
//! A backend owns the native event source (input devices, an X display
//! connection, a Win32 thread message queue). All methods except the
//! [`LoopWaker`] it hands out must be called on the thread that ran
//! [`Backend::prepare`]; the dispatch loop guarantees this.

#[cfg(target_os = "linux")]
mod evdev;
#[cfg(target_os = "linux")]
mod wake;
#[cfg(windows)]
mod win32;
#[cfg(target_os = "linux")]
mod x11;

#[cfg(test)]
pub(crate) mod simulated;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{HotKeyError, ParseError};
use crate::hotkey::HotKeyId;
use crate::keys::{HotKeyCode, Keymap};

#[cfg(target_os = "linux")]
pub use self::evdev::EvdevBackend;
#[cfg(windows)]
pub use self::win32::Win32Backend;
#[cfg(target_os = "linux")]
pub use self::x11::X11Backend;

/// Which native event source a backend drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Raw Linux input devices
    Evdev,
    /// X11 key grabs
    X11,
    /// Win32 `RegisterHotKey`
    Win32,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Evdev => write!(f, "evdev"),
            BackendKind::X11 => write!(f, "x11"),
            BackendKind::Win32 => write!(f, "win32"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown backend `{0}`, expected evdev, x11 or win32")]
pub struct UnknownBackend(String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evdev" => Ok(BackendKind::Evdev),
            "x11" => Ok(BackendKind::X11),
            "win32" | "windows" => Ok(BackendKind::Win32),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

/// Wakes a dispatch loop blocked in [`Backend::pump`]; callable from any thread
pub trait LoopWaker: Send + Sync {
    fn wake(&self);
}

/// Native hotkey source driven by the dispatch loop
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    /// Name tables used to translate combo strings for this backend
    fn keymap(&self) -> &'static Keymap;

    fn translate(&self, combo: &str) -> Result<HotKeyCode, ParseError> {
        self.keymap().translate(combo)
    }

    /// Set up the native event source on the calling thread.
    ///
    /// Calling it again while prepared returns the same waker.
    fn prepare(&mut self) -> Result<Arc<dyn LoopWaker>, HotKeyError>;

    /// Install the native grab for `code` and index it under `id`
    fn register(&mut self, id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError>;

    /// Remove the native grab; on failure the index keeps the entry
    fn unregister(&mut self, id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError>;

    /// Block until native events arrive, the waker fires or `timeout`
    /// elapses, and push the ids of hotkeys that were pressed
    fn pump(&mut self, timeout: Duration, fired: &mut Vec<HotKeyId>) -> Result<(), HotKeyError>;

    /// Tear down the native event source, dropping any grabs still installed
    fn release(&mut self);
}

/// Pick the backend for this platform, honouring `config.backend`
pub fn select(config: &Config) -> Result<Box<dyn Backend>, HotKeyError> {
    let kind = config.backend.unwrap_or_else(|| detect(config));
    tracing::debug!(%kind, forced = config.backend.is_some(), "selecting hotkey backend");
    build(kind, config)
}

fn detect(config: &Config) -> BackendKind {
    if cfg!(windows) {
        BackendKind::Win32
    } else if config.display.is_some() {
        BackendKind::X11
    } else {
        BackendKind::Evdev
    }
}

#[cfg(target_os = "linux")]
fn build(kind: BackendKind, config: &Config) -> Result<Box<dyn Backend>, HotKeyError> {
    match kind {
        BackendKind::Evdev => Ok(Box::new(EvdevBackend::new(config))),
        BackendKind::X11 => Ok(Box::new(X11Backend::new(config.display.clone()))),
        BackendKind::Win32 => Err(unsupported(kind)),
    }
}

#[cfg(windows)]
fn build(kind: BackendKind, _config: &Config) -> Result<Box<dyn Backend>, HotKeyError> {
    match kind {
        BackendKind::Win32 => Ok(Box::new(Win32Backend::new())),
        other => Err(unsupported(other)),
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
fn build(kind: BackendKind, _config: &Config) -> Result<Box<dyn Backend>, HotKeyError> {
    Err(unsupported(kind))
}

fn unsupported(kind: BackendKind) -> HotKeyError {
    crate::error::PlatformError::new(
        "select backend",
        format!("the {kind} backend is not available on this platform"),
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("evdev".parse::<BackendKind>().unwrap(), BackendKind::Evdev);
        assert_eq!(" X11 ".parse::<BackendKind>().unwrap(), BackendKind::X11);
        assert_eq!("windows".parse::<BackendKind>().unwrap(), BackendKind::Win32);
        assert!("wayland".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_backend_kind_roundtrip_display() {
        for kind in [BackendKind::Evdev, BackendKind::X11, BackendKind::Win32] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_detect_prefers_x11_with_display() {
        let mut config = Config::default();
        assert_eq!(detect(&config), BackendKind::Evdev);
        config.display = Some(":0".to_string());
        assert_eq!(detect(&config), BackendKind::X11);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_select_rejects_foreign_backend() {
        let config = Config {
            backend: Some(BackendKind::Win32),
            ..Config::default()
        };
        assert!(matches!(select(&config), Err(HotKeyError::Platform(_))));
    }
}
