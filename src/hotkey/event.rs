//! Hotkeys that signal a waiting caller instead of running a callback

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

use super::handle::{HotKey, Scoped};
use crate::dispatch::lock;
use crate::error::HotKeyError;

struct TriggerState {
    /// Previous trigger, or when the hotkey was armed
    last: Instant,
    /// Latest trigger not yet taken by a waiter
    pending: Option<Instant>,
}

impl TriggerState {
    fn take(&mut self) -> Option<Duration> {
        let at = self.pending.take()?;
        let elapsed = at.saturating_duration_since(self.last);
        self.last = at;
        Some(elapsed)
    }
}

pub(crate) struct TriggerSignal {
    state: Mutex<TriggerState>,
    fired: Condvar,
    notify: Notify,
}

impl TriggerSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(TriggerState {
                last: Instant::now(),
                pending: None,
            }),
            fired: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Record a trigger; earlier triggers nobody waited for are overwritten
    pub(crate) fn trigger(&self) {
        lock(&self.state).pending = Some(Instant::now());
        self.fired.notify_all();
        self.notify.notify_one();
    }
}

/// A hotkey whose presses are waited for rather than handled by a callback.
///
/// Each wait returns the time elapsed since the previous trigger (or since
/// creation for the first). Presses that happen while nobody is waiting are
/// coalesced: only the latest one is reported.
pub struct EventHotKey {
    hotkey: HotKey,
    signal: Arc<TriggerSignal>,
}

impl EventHotKey {
    pub(crate) fn new(hotkey: HotKey, signal: Arc<TriggerSignal>) -> Self {
        Self { hotkey, signal }
    }

    pub fn hotkey(&self) -> &HotKey {
        &self.hotkey
    }

    /// Block until the hotkey is pressed
    pub fn wait(&self) -> Duration {
        let state = lock(&self.signal.state);
        let mut state = self
            .signal
            .fired
            .wait_while(state, |state| state.pending.is_none())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.take().unwrap_or_default()
    }

    /// Block until the hotkey is pressed or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Duration> {
        let state = lock(&self.signal.state);
        let (mut state, _) = self
            .signal
            .fired
            .wait_timeout_while(state, timeout, |state| state.pending.is_none())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.take()
    }

    /// Resolve on the next press; usable from async code
    pub async fn triggered(&self) -> Duration {
        loop {
            let notified = self.signal.notify.notified();
            let taken = lock(&self.signal.state).take();
            if let Some(elapsed) = taken {
                return elapsed;
            }
            notified.await;
        }
    }

    /// Endless iterator of presses, blocking between items
    pub fn iter(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::repeat_with(move || self.wait())
    }

    /// Register now and free when the returned guard is dropped
    pub fn scoped(self) -> Result<Scoped<EventHotKey>, HotKeyError> {
        Scoped::new(self)
    }
}

impl AsRef<HotKey> for EventHotKey {
    fn as_ref(&self) -> &HotKey {
        &self.hotkey
    }
}

impl std::ops::Deref for EventHotKey {
    type Target = HotKey;

    fn deref(&self) -> &HotKey {
        &self.hotkey
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_triggers_coalesce_latest_wins() {
        let signal = TriggerSignal::new();
        signal.trigger();
        thread::sleep(Duration::from_millis(5));
        signal.trigger();

        let mut state = lock(&signal.state);
        assert!(state.take().is_some());
        assert!(state.take().is_none());
    }

    #[test]
    fn test_elapsed_measured_from_previous_trigger() {
        let signal = TriggerSignal::new();
        thread::sleep(Duration::from_millis(30));
        signal.trigger();
        let first = lock(&signal.state).take().unwrap();
        assert!(first >= Duration::from_millis(30));

        signal.trigger();
        let second = lock(&signal.state).take().unwrap();
        assert!(second < first);
    }
}
