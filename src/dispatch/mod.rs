//! The hotkey service and its dispatch loop
//!
//! [`HotKeys`] owns one backend. Exactly one thread at a time runs the
//! dispatch loop ([`HotKeys::run`] or [`HotKeys::start`]); that thread is the
//! only one that touches the backend, and hotkey callbacks run on it. Handle
//! operations from other threads are queued to it and the caller blocks for
//! the result, up to the configured marshal timeout.

mod marshal;
mod shared;

use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::debug;

use crate::backend::{self, Backend, BackendKind};
use crate::config::Config;
use crate::error::{HotKeyError, ParseError};
use crate::events::HotKeyEvent;
use crate::hotkey::callback::{self, Callback};
use crate::hotkey::registry::Entry;
use crate::hotkey::{CallbackOutput, EventHotKey, HotKey, HotKeyInfo, TriggerSignal};
use crate::keys::HotKeyCode;

pub(crate) use self::shared::{lock, Core};

const THREAD_NAME: &str = "hotkey-dispatch";

/// Systemwide hotkey service
///
/// Cheap to clone; clones share the same registry and loop.
#[derive(Clone)]
pub struct HotKeys {
    core: Arc<Core>,
}

impl HotKeys {
    /// Create the service with the backend selected for this platform
    pub fn new(config: Config) -> Result<Self, HotKeyError> {
        let backend = backend::select(&config)?;
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: Config, backend: Box<dyn Backend>) -> Self {
        Self {
            core: Arc::new(Core::new(config, backend)),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.core.kind
    }

    /// Translate a combo string with this service's key tables
    pub fn translate(&self, combo: &str) -> Result<HotKeyCode, ParseError> {
        self.core.keymap.translate(combo)
    }

    /// Create a hotkey running `callback` on the dispatch thread when pressed.
    ///
    /// Fails with `Duplicate` if any live hotkey, active or not, already
    /// uses the same key and modifiers.
    pub fn hotkey<F, O>(&self, combo: &str, callback: F) -> Result<HotKey, HotKeyError>
    where
        F: Fn() -> O + Send + Sync + 'static,
        O: CallbackOutput,
    {
        self.insert(combo, callback::from_fn(callback))
    }

    /// Create a hotkey that is waited for instead of running a callback
    pub fn event_hotkey(&self, combo: &str) -> Result<EventHotKey, HotKeyError> {
        let signal = Arc::new(TriggerSignal::new());
        let trigger = Arc::clone(&signal);
        let hotkey = self.hotkey(combo, move || trigger.trigger())?;
        Ok(EventHotKey::new(hotkey, signal))
    }

    fn insert(&self, combo: &str, callback: Callback) -> Result<HotKey, HotKeyError> {
        let combo = combo.trim().to_string();
        let code = self.translate(&combo)?;
        let inserted = lock(&self.core.registry).insert(Entry::new(combo.clone(), code, callback));
        // A rejected entry still owns the callback; drop it unlocked.
        let id = inserted.map_err(|rejected| {
            drop(rejected);
            HotKeyError::Duplicate {
                combo: combo.clone(),
            }
        })?;
        debug!(%combo, %code, %id, "hotkey created");
        Ok(HotKey::new(id, combo, code, Arc::clone(&self.core)))
    }

    /// Find the live hotkey bound to the same keys as `combo`
    pub fn lookup(&self, combo: &str) -> Result<HotKeyInfo, HotKeyError> {
        let code = self.translate(combo)?;
        let registry = lock(&self.core.registry);
        registry
            .lookup(code)
            .and_then(|id| registry.get(id).map(|entry| HotKeyInfo::new(id, entry)))
            .ok_or_else(|| HotKeyError::NotFound(combo.trim().to_string()))
    }

    pub fn hotkeys(&self) -> Vec<HotKeyInfo> {
        lock(&self.core.registry)
            .iter()
            .map(|(id, entry)| HotKeyInfo::new(id, entry))
            .collect()
    }

    /// Register every inactive hotkey.
    ///
    /// Without a running loop this only clears the effect of
    /// [`disable_all`](Self::disable_all), so they register when it starts.
    pub fn enable_all(&self) -> Result<(), HotKeyError> {
        self.core.call(
            |core| core.enable_all_now(),
            |core| {
                core.park_all(false);
                Ok(())
            },
        )
    }

    /// Unregister every active hotkey and keep them off across restarts
    pub fn disable_all(&self) -> Result<(), HotKeyError> {
        self.core.call(
            |core| core.disable_all_now(),
            |core| {
                core.park_all(true);
                Ok(())
            },
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HotKeyEvent> {
        self.core.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Run the dispatch loop on the calling thread until [`stop`](Self::stop)
    pub fn run(&self) -> Result<(), HotKeyError> {
        self.core.run(None)
    }

    /// Run the dispatch loop on a new thread.
    ///
    /// Returns once the loop owns the backend and hotkeys created so far are
    /// registered, or with the error that kept it from starting.
    pub fn start(&self) -> Result<JoinHandle<Result<(), HotKeyError>>, HotKeyError> {
        let core = Arc::clone(&self.core);
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || core.run(Some(ready_tx)))
            .map_err(|e| HotKeyError::ThreadSpawn(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(HotKeyError::ThreadSpawn(
                    "dispatch thread exited during startup".to_string(),
                ))
            }
        }
    }

    /// Ask the loop to exit; returns immediately
    pub fn stop(&self) {
        self.core.request_stop();
    }

    /// Stop the loop and block until it has released the backend.
    ///
    /// Called from a hotkey callback this only requests the stop.
    pub fn stop_and_wait(&self, timeout: Duration) -> Result<(), HotKeyError> {
        self.core.stop_and_wait(timeout)
    }
}
