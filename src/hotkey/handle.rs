//! Owned hotkey handles

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::thread;

use tracing::{error, warn};

use super::callback::{CallbackError, ErrorHandler};
use super::registry::HotKeyId;
use crate::dispatch::{lock, Core};
use crate::error::HotKeyError;
use crate::keys::HotKeyCode;

/// A hotkey created through [`HotKeys::hotkey`](crate::HotKeys::hotkey).
///
/// The handle owns its registry entry: dropping it frees the hotkey. It goes
/// `created → registered ⇄ unregistered → freed`; once freed every
/// operation fails with [`HotKeyError::Freed`].
///
/// Handles created before the dispatch loop starts are registered when it
/// starts. Calls from any thread are forwarded to the loop's thread.
pub struct HotKey {
    id: HotKeyId,
    combo: String,
    code: HotKeyCode,
    core: Arc<Core>,
}

impl HotKey {
    pub(crate) fn new(id: HotKeyId, combo: String, code: HotKeyCode, core: Arc<Core>) -> Self {
        Self {
            id,
            combo,
            code,
            core,
        }
    }

    pub fn id(&self) -> HotKeyId {
        self.id
    }

    /// The combo string as given, trimmed
    pub fn combo(&self) -> &str {
        &self.combo
    }

    pub fn code(&self) -> HotKeyCode {
        self.code
    }

    /// Install the native grab.
    ///
    /// Fails with `NotRunning` while no dispatch loop is running.
    pub fn register(&self) -> Result<(), HotKeyError> {
        let id = self.id;
        self.core
            .call(move |core| core.register_now(id), |core| core.register_offline(id))
    }

    /// Remove the native grab; the handle stays usable and is not
    /// re-registered by a later loop start.
    pub fn unregister(&self) -> Result<(), HotKeyError> {
        let id = self.id;
        self.core.call(
            move |core| core.unregister_now(id, true),
            |core| core.unregister_offline(id),
        )
    }

    /// Unregister if needed and remove the hotkey from the registry.
    ///
    /// When the native unregister fails the hotkey is kept and the error
    /// returned, so the call can be retried.
    pub fn free(&self) -> Result<(), HotKeyError> {
        let id = self.id;
        // Dropped here, after the call has let go of every lock.
        let entry = self
            .core
            .call(move |core| core.free_now(id), |core| core.remove(id))?;
        drop(entry);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        lock(&self.core.registry)
            .get(self.id)
            .is_some_and(|entry| entry.active)
    }

    pub fn is_freed(&self) -> bool {
        lock(&self.core.registry).get(self.id).is_none()
    }

    /// Route failures of this hotkey's callback to `handler` instead of the log
    pub fn set_error_handler<F>(&self, handler: F) -> Result<(), HotKeyError>
    where
        F: Fn(&CallbackError) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        let previous = lock(&self.core.registry)
            .get_mut(self.id)
            .ok_or(HotKeyError::Freed)?
            .error_handler
            .replace(handler);
        drop(previous);
        Ok(())
    }

    /// Register now and free when the returned guard is dropped
    pub fn scoped(self) -> Result<Scoped<HotKey>, HotKeyError> {
        Scoped::new(self)
    }
}

impl AsRef<HotKey> for HotKey {
    fn as_ref(&self) -> &HotKey {
        self
    }
}

impl fmt::Debug for HotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotKey")
            .field("id", &self.id)
            .field("combo", &self.combo)
            .field("code", &self.code)
            .finish()
    }
}

impl Drop for HotKey {
    fn drop(&mut self) {
        if self.is_freed() {
            return;
        }

        let was_active = self.is_active();
        if was_active {
            error!(combo = %self.combo, "hotkey dropped while registered, freeing it");
        }
        if let Err(e) = self.free() {
            warn!(combo = %self.combo, error = %e, "failed to free dropped hotkey");
        }
        debug_assert!(
            !was_active || thread::panicking(),
            "hotkey `{}` dropped while registered",
            self.combo
        );
    }
}

/// Registers a hotkey for as long as the guard lives
///
/// Dropping the guard frees the hotkey on every exit path, including
/// unwinding.
pub struct Scoped<T: AsRef<HotKey>> {
    inner: Option<T>,
}

impl<T: AsRef<HotKey>> Scoped<T> {
    pub(crate) fn new(inner: T) -> Result<Self, HotKeyError> {
        inner.as_ref().register()?;
        Ok(Self { inner: Some(inner) })
    }
}

impl<T: AsRef<HotKey>> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            Some(inner) => inner,
            None => unreachable!("scoped hotkey used after drop"),
        }
    }
}

impl<T: AsRef<HotKey>> Drop for Scoped<T> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let hotkey = inner.as_ref();
        match hotkey.free() {
            Ok(()) | Err(HotKeyError::Freed) => {}
            Err(e) => warn!(combo = %hotkey.combo(), error = %e, "failed to free scoped hotkey"),
        }
    }
}
