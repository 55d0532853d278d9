//! Hotkey handles and the registry behind them

pub(crate) mod callback;
mod event;
mod handle;
pub(crate) mod registry;

pub use callback::{CallbackError, CallbackOutput, ErrorHandler};
pub use event::EventHotKey;
pub(crate) use event::TriggerSignal;
pub use handle::{HotKey, Scoped};
pub use registry::{HotKeyId, HotKeyInfo};
