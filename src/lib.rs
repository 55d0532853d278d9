//! hotkey-daemon: systemwide hotkeys for X11, raw Linux input devices and
//! Windows
//!
//! Combo strings such as `"Ctrl+Shift+F6"` are translated into a backend
//! specific [`HotKeyCode`](keys::HotKeyCode) and bound to a callback. One
//! dispatch thread owns the native event source; callbacks run there, and
//! handle operations from other threads are forwarded to it.
//!
//! ```no_run
//! use hotkey_daemon::{Config, HotKeys};
//!
//! # fn main() -> anyhow::Result<()> {
//! let keys = HotKeys::new(Config::load()?)?;
//! let _hotkey = keys.hotkey("Ctrl+Alt+T", || println!("pressed"))?;
//! let dispatch = keys.start()?;
//! // ...
//! keys.stop_and_wait(std::time::Duration::from_secs(1))?;
//! # let _ = dispatch.join();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
mod dispatch;
pub mod error;
pub mod events;
pub mod hotkey;
pub mod keys;

pub use config::Config;
pub use dispatch::HotKeys;
pub use error::{HotKeyError, ParseError, PlatformError};
pub use events::HotKeyEvent;
pub use hotkey::{CallbackError, EventHotKey, HotKey, HotKeyId, HotKeyInfo, Scoped};
