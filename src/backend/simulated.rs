//! In-memory backend for exercising the dispatch loop in tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use super::{Backend, BackendKind, LoopWaker};
use crate::error::{HotKeyError, PlatformError};
use crate::hotkey::HotKeyId;
use crate::keys::evdev::KEYMAP;
use crate::keys::{HotKeyCode, Keymap};

#[derive(Default)]
struct SimState {
    grabs: HashMap<HotKeyCode, HotKeyId>,
    pressed: VecDeque<HotKeyCode>,
    woken: bool,
    prepared: bool,
    fail_register: bool,
    fail_unregister: bool,
    unregister_delay: Duration,
    native_calls: usize,
    threads: Vec<ThreadId>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SimState>,
    changed: Condvar,
}

impl Shared {
    fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        let result = f(&mut state);
        self.changed.notify_all();
        result
    }
}

impl LoopWaker for Shared {
    fn wake(&self) {
        self.with(|state| state.woken = true);
    }
}

pub(crate) struct SimBackend {
    shared: Arc<Shared>,
}

/// Test-side view of a [`SimBackend`]
#[derive(Clone)]
pub(crate) struct SimControl {
    shared: Arc<Shared>,
}

impl SimBackend {
    pub fn new() -> (Self, SimControl) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            SimControl { shared },
        )
    }

    fn native_call(&self, state: &mut SimState) {
        state.native_calls += 1;
        state.threads.push(thread::current().id());
    }
}

impl SimControl {
    /// Simulate the user pressing `combo`
    pub fn press(&self, combo: &str) {
        let code = KEYMAP.translate(combo).unwrap();
        self.shared.with(|state| state.pressed.push_back(code));
    }

    pub fn is_grabbed(&self, combo: &str) -> bool {
        let code = KEYMAP.translate(combo).unwrap();
        self.shared.with(|state| state.grabs.contains_key(&code))
    }

    pub fn grab_count(&self) -> usize {
        self.shared.with(|state| state.grabs.len())
    }

    pub fn native_calls(&self) -> usize {
        self.shared.with(|state| state.native_calls)
    }

    /// Threads that performed native register/unregister calls
    pub fn native_threads(&self) -> Vec<ThreadId> {
        self.shared.with(|state| state.threads.clone())
    }

    pub fn is_prepared(&self) -> bool {
        self.shared.with(|state| state.prepared)
    }

    pub fn fail_next_register(&self) {
        self.shared.with(|state| state.fail_register = true);
    }

    pub fn fail_next_unregister(&self) {
        self.shared.with(|state| state.fail_unregister = true);
    }

    /// Make every later unregister take `delay` before removing the grab
    pub fn delay_unregister(&self, delay: Duration) {
        self.shared.with(|state| state.unregister_delay = delay);
    }
}

impl Backend for SimBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Evdev
    }

    fn keymap(&self) -> &'static Keymap {
        &KEYMAP
    }

    fn prepare(&mut self) -> Result<Arc<dyn LoopWaker>, HotKeyError> {
        self.shared.with(|state| state.prepared = true);
        Ok(Arc::clone(&self.shared) as Arc<dyn LoopWaker>)
    }

    fn register(&mut self, id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        let mut state = self.shared.state.lock().unwrap();
        self.native_call(&mut state);
        if std::mem::take(&mut state.fail_register) {
            return Err(PlatformError {
                operation: "grab",
                code: Some(13),
                message: "permission denied".to_string(),
            }
            .into());
        }
        if state.grabs.contains_key(&code) {
            return Err(HotKeyError::Duplicate {
                combo: code.to_string(),
            });
        }
        state.grabs.insert(code, id);
        Ok(())
    }

    fn unregister(&mut self, _id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        let delay = {
            let mut state = self.shared.state.lock().unwrap();
            self.native_call(&mut state);
            if std::mem::take(&mut state.fail_unregister) {
                return Err(PlatformError::new("ungrab", "BadAccess").into());
            }
            state.unregister_delay
        };
        thread::sleep(delay);
        self.shared.with(|state| state.grabs.remove(&code));
        Ok(())
    }

    fn pump(&mut self, timeout: Duration, fired: &mut Vec<HotKeyId>) -> Result<(), HotKeyError> {
        let state = self.shared.state.lock().unwrap();
        let (mut state, _) = self
            .shared
            .changed
            .wait_timeout_while(state, timeout, |s| s.pressed.is_empty() && !s.woken)
            .unwrap();
        state.woken = false;
        while let Some(code) = state.pressed.pop_front() {
            if let Some(&id) = state.grabs.get(&code) {
                fired.push(id);
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        self.shared.with(|state| {
            state.grabs.clear();
            state.prepared = false;
        });
    }
}
