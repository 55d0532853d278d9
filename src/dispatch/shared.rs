//! State shared by the service, its handles and the dispatch loop
//!
//! Native state changes happen only on the thread running the loop. The
//! `*_now` transitions below assume they run there; handles reach them
//! through [`Core::call`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::marshal::{Owner, Task};
use crate::backend::{Backend, BackendKind};
use crate::config::Config;
use crate::error::HotKeyError;
use crate::events::HotKeyEvent;
use crate::hotkey::callback;
use crate::hotkey::registry::{Entry, Registry};
use crate::hotkey::HotKeyId;
use crate::keys::Keymap;

const EVENT_CAPACITY: usize = 64;

/// Lock a mutex, carrying on with the data if a previous holder panicked
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub(crate) struct Control {
    pub running: bool,
    /// The loop is unregistering and releasing the backend
    pub stopping: bool,
    pub owner: Option<Owner>,
}

pub(crate) struct Core {
    pub config: Config,
    pub kind: BackendKind,
    pub keymap: &'static Keymap,
    pub registry: Mutex<Registry>,
    /// Only ever locked by the owning thread
    backend: Mutex<Box<dyn Backend>>,
    pub(super) control: Mutex<Control>,
    /// Signalled when the loop leaves the stopping and running states
    pub(super) stopped: Condvar,
    stop_requested: AtomicBool,
    events: broadcast::Sender<HotKeyEvent>,
}

impl Core {
    pub fn new(config: Config, backend: Box<dyn Backend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            kind: backend.kind(),
            keymap: backend.keymap(),
            config,
            registry: Mutex::default(),
            backend: Mutex::new(backend),
            control: Mutex::default(),
            stopped: Condvar::new(),
            stop_requested: AtomicBool::new(false),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HotKeyEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: HotKeyEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.control).running
    }

    // Transitions, run on the owning thread

    pub fn register_now(&self, id: HotKeyId) -> Result<(), HotKeyError> {
        let (combo, code) = {
            let registry = lock(&self.registry);
            let entry = registry.get(id).ok_or(HotKeyError::Freed)?;
            if entry.active {
                return Err(HotKeyError::AlreadyActive(entry.combo.clone()));
            }
            (entry.combo.clone(), entry.code)
        };

        lock(&self.backend).register(id, code)?;

        if let Some(entry) = lock(&self.registry).get_mut(id) {
            entry.active = true;
            entry.parked = false;
        }
        debug!(%combo, %code, "hotkey registered");
        self.emit(HotKeyEvent::Registered { combo });
        Ok(())
    }

    /// Remove the native grab; `park` keeps the handle inactive across restarts
    pub fn unregister_now(&self, id: HotKeyId, park: bool) -> Result<(), HotKeyError> {
        let (combo, code) = {
            let registry = lock(&self.registry);
            let entry = registry.get(id).ok_or(HotKeyError::Freed)?;
            if !entry.active {
                return Err(HotKeyError::NotActive(entry.combo.clone()));
            }
            (entry.combo.clone(), entry.code)
        };

        lock(&self.backend).unregister(id, code)?;

        if let Some(entry) = lock(&self.registry).get_mut(id) {
            entry.active = false;
            entry.parked = park;
        }
        debug!(%combo, "hotkey unregistered");
        self.emit(HotKeyEvent::Unregistered { combo });
        Ok(())
    }

    pub fn free_now(&self, id: HotKeyId) -> Result<Entry, HotKeyError> {
        match self.unregister_now(id, true) {
            Ok(()) | Err(HotKeyError::NotActive(_)) => {}
            Err(e) => return Err(e),
        }
        self.remove(id)
    }

    // Offline counterparts, run while no loop owns the backend

    pub fn register_offline(&self, id: HotKeyId) -> Result<(), HotKeyError> {
        let registry = lock(&self.registry);
        let entry = registry.get(id).ok_or(HotKeyError::Freed)?;
        if entry.active {
            return Err(HotKeyError::AlreadyActive(entry.combo.clone()));
        }
        Err(HotKeyError::NotRunning)
    }

    pub fn unregister_offline(&self, id: HotKeyId) -> Result<(), HotKeyError> {
        let registry = lock(&self.registry);
        let entry = registry.get(id).ok_or(HotKeyError::Freed)?;
        if !entry.active {
            return Err(HotKeyError::NotActive(entry.combo.clone()));
        }
        // Grabs are released before a loop gives up the backend.
        Err(HotKeyError::NotRunning)
    }

    /// Take the entry out of the registry.
    ///
    /// The entry owns the callback, which may own other handles; the caller
    /// drops it once no lock is held.
    pub fn remove(&self, id: HotKeyId) -> Result<Entry, HotKeyError> {
        let entry = lock(&self.registry)
            .remove(id)
            .ok_or(HotKeyError::Freed)?;
        debug!(combo = %entry.combo, "hotkey freed");
        self.emit(HotKeyEvent::Freed {
            combo: entry.combo.clone(),
        });
        Ok(entry)
    }

    /// Set or clear the parked flag of every inactive handle
    pub fn park_all(&self, park: bool) {
        for entry in lock(&self.registry).iter_mut() {
            if !entry.active {
                entry.parked = park;
            }
        }
    }

    fn ids_where(&self, filter: impl Fn(bool, bool) -> bool) -> Vec<HotKeyId> {
        lock(&self.registry)
            .iter()
            .filter(|(_, entry)| filter(entry.active, entry.parked))
            .map(|(id, _)| id)
            .collect()
    }

    /// Register every inactive handle, including parked ones
    pub fn enable_all_now(&self) -> Result<(), HotKeyError> {
        let mut first_error = None;
        for id in self.ids_where(|active, _| !active) {
            match self.register_now(id) {
                Ok(()) | Err(HotKeyError::Freed) => {}
                Err(e) => {
                    warn!(%id, error = %e, "failed to enable hotkey");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Unregister and park every active handle
    pub fn disable_all_now(&self) -> Result<(), HotKeyError> {
        let mut first_error = None;
        for id in self.ids_where(|active, _| active) {
            match self.unregister_now(id, true) {
                Ok(()) | Err(HotKeyError::Freed) => {}
                Err(e) => {
                    warn!(%id, error = %e, "failed to disable hotkey");
                    first_error.get_or_insert(e);
                }
            }
        }
        self.park_all(true);
        first_error.map_or(Ok(()), Err)
    }

    fn fire(&self, id: HotKeyId) {
        let fired = {
            let registry = lock(&self.registry);
            registry.get(id).filter(|entry| entry.active).map(|entry| {
                (
                    entry.combo.clone(),
                    Arc::clone(&entry.callback),
                    entry.error_handler.clone(),
                )
            })
        };
        let Some((combo, callback, handler)) = fired else {
            debug!(%id, "fired hotkey is no longer active");
            return;
        };

        debug!(%combo, "hotkey triggered");
        self.emit(HotKeyEvent::Triggered {
            combo: combo.clone(),
        });

        let Err(err) = callback::invoke(&combo, &callback) else {
            return;
        };
        self.emit(HotKeyEvent::CallbackFailed {
            combo: combo.clone(),
            error: err.to_string(),
        });

        match handler {
            Some(handler) => {
                if panic::catch_unwind(AssertUnwindSafe(|| handler(&err))).is_err() {
                    error!(%combo, error = %err, "hotkey error handler panicked");
                }
            }
            None => error!(%combo, error = %err, "hotkey callback failed"),
        }
    }

    // Dispatch loop

    /// Run the dispatch loop on the calling thread until stopped.
    ///
    /// `ready` receives the startup outcome once pending handles have been
    /// registered.
    pub fn run(
        &self,
        ready: Option<mpsc::SyncSender<Result<(), HotKeyError>>>,
    ) -> Result<(), HotKeyError> {
        let tasks = match self.claim() {
            Ok(tasks) => tasks,
            Err(e) => {
                if let Some(ready) = ready {
                    let _ = ready.send(Err(e.clone()));
                }
                return Err(e);
            }
        };

        info!(backend = %self.kind, "hotkey dispatch loop started");
        self.emit(HotKeyEvent::LoopStarted {
            backend: self.kind.to_string(),
        });
        self.activate_pending();

        if let Some(ready) = ready {
            let _ = ready.send(Ok(()));
        }

        let result = self.pump_until_stopped(&tasks);
        if let Err(e) = &result {
            error!(error = %e, "hotkey event pump failed");
        }
        self.shutdown(tasks);
        result
    }

    fn claim(&self) -> Result<Receiver<Task>, HotKeyError> {
        let mut control = lock(&self.control);
        if control.running {
            return Err(HotKeyError::AlreadyRunning);
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        let waker = lock(&self.backend).prepare()?;
        let (tasks_tx, tasks_rx) = mpsc::channel();

        control.running = true;
        control.owner = Some(Owner {
            thread: thread::current().id(),
            tasks: tasks_tx,
            waker,
        });
        Ok(tasks_rx)
    }

    fn activate_pending(&self) {
        for id in self.ids_where(|active, parked| !active && !parked) {
            let Err(e) = self.register_now(id) else {
                continue;
            };
            let combo = lock(&self.registry)
                .get(id)
                .map(|entry| entry.combo.clone())
                .unwrap_or_default();
            warn!(%combo, error = %e, "failed to register hotkey at loop start");
            self.emit(HotKeyEvent::RegistrationFailed {
                combo,
                error: e.to_string(),
            });
        }
    }

    fn pump_until_stopped(&self, tasks: &Receiver<Task>) -> Result<(), HotKeyError> {
        let mut fired = Vec::new();
        while !self.stop_requested.load(Ordering::SeqCst) {
            self.drain_tasks(tasks);

            lock(&self.backend).pump(self.config.poll_interval, &mut fired)?;

            for id in fired.drain(..) {
                self.fire(id);
            }
        }
        Ok(())
    }

    fn drain_tasks(&self, tasks: &Receiver<Task>) {
        while let Ok(task) = tasks.try_recv() {
            task(self);
        }
    }

    fn shutdown(&self, tasks: Receiver<Task>) {
        // Other threads wait from here on, so nothing is queued after the
        // drain and nothing is removed while its grab is still installed.
        lock(&self.control).stopping = true;
        self.drain_tasks(&tasks);

        for id in self.ids_where(|active, _| active) {
            match self.unregister_now(id, false) {
                Ok(()) | Err(HotKeyError::Freed) => {}
                Err(e) => warn!(%id, error = %e, "failed to unregister hotkey on shutdown"),
            }
        }

        lock(&self.backend).release();
        for entry in lock(&self.registry).iter_mut() {
            entry.active = false;
        }

        info!("hotkey dispatch loop stopped");
        self.emit(HotKeyEvent::LoopStopped);

        let owner = {
            let mut control = lock(&self.control);
            control.running = false;
            control.stopping = false;
            control.owner.take()
        };
        drop(owner);
        drop(tasks);
        self.stopped.notify_all();
    }

    /// Ask the loop to exit and wake it if it is blocked
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(owner) = &lock(&self.control).owner {
            owner.waker.wake();
        }
    }

    /// Stop the loop and wait up to `timeout` for it to exit.
    ///
    /// From the owning thread this only requests the stop.
    pub fn stop_and_wait(&self, timeout: Duration) -> Result<(), HotKeyError> {
        self.request_stop();
        if self.is_owner() {
            return Ok(());
        }

        let control = lock(&self.control);
        let (control, _) = self
            .stopped
            .wait_timeout_while(control, timeout, |control| control.running)
            .unwrap_or_else(PoisonError::into_inner);
        if control.running {
            return Err(HotKeyError::WorkerUnresponsive(timeout));
        }
        Ok(())
    }
}
