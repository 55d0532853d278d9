//! Running operations on the thread that owns the backend

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::warn;

use super::shared::{lock, Control, Core};
use crate::backend::LoopWaker;
use crate::error::HotKeyError;

/// Operation queued for the owning thread
pub(crate) type Task = Box<dyn FnOnce(&Core) + Send>;

/// The thread currently running the dispatch loop
pub(crate) struct Owner {
    pub thread: ThreadId,
    pub tasks: mpsc::Sender<Task>,
    pub waker: Arc<dyn LoopWaker>,
}

enum Route {
    /// Caller is the owning thread
    Inline,
    /// Another thread owns the backend
    Remote {
        tasks: mpsc::Sender<Task>,
        waker: Arc<dyn LoopWaker>,
    },
    /// The loop is releasing the backend; wait until it is gone
    Wait,
    /// No loop is running
    Offline,
}

impl Route {
    fn of(control: &Control) -> Self {
        match &control.owner {
            Some(owner) if owner.thread == thread::current().id() => Route::Inline,
            Some(_) if control.stopping => Route::Wait,
            Some(owner) => Route::Remote {
                tasks: owner.tasks.clone(),
                waker: Arc::clone(&owner.waker),
            },
            None => Route::Offline,
        }
    }
}

impl Core {
    /// Run `online` on the owning thread and return its result here.
    ///
    /// Without a running loop `offline` runs instead, with the loop state
    /// locked so that no loop can start underneath it. Callers from other
    /// threads arriving while a loop shuts down wait for it to finish and
    /// then take the offline path.
    pub(crate) fn call<T, F, G>(&self, online: F, offline: G) -> Result<T, HotKeyError>
    where
        T: Send + 'static,
        F: FnOnce(&Core) -> Result<T, HotKeyError> + Send + 'static,
        G: FnOnce(&Core) -> Result<T, HotKeyError>,
    {
        let mut control = lock(&self.control);
        loop {
            match Route::of(&control) {
                Route::Inline => {
                    drop(control);
                    return online(self);
                }
                Route::Offline => return offline(self),
                Route::Wait => control = self.wait_stopping(control)?,
                Route::Remote { tasks, waker } => {
                    return self.call_remote(control, &tasks, waker.as_ref(), online);
                }
            }
        }
    }

    fn wait_stopping<'a>(
        &self,
        control: MutexGuard<'a, Control>,
    ) -> Result<MutexGuard<'a, Control>, HotKeyError> {
        let timeout = self.config.marshal_timeout;
        let (control, waited) = self
            .stopped
            .wait_timeout_while(control, timeout, |control| control.stopping)
            .unwrap_or_else(PoisonError::into_inner);
        if waited.timed_out() {
            warn!(?timeout, "dispatch loop did not finish stopping in time");
            return Err(HotKeyError::WorkerUnresponsive(timeout));
        }
        Ok(control)
    }

    /// Queue `online` while still holding the loop state, so a stopping
    /// loop never misses it, then wait for the reply without the lock.
    fn call_remote<T, F>(
        &self,
        control: MutexGuard<'_, Control>,
        tasks: &mpsc::Sender<Task>,
        waker: &dyn LoopWaker,
        online: F,
    ) -> Result<T, HotKeyError>
    where
        T: Send + 'static,
        F: FnOnce(&Core) -> Result<T, HotKeyError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let task: Task = Box::new(move |core| {
            // The caller may have timed out and gone away.
            let _ = reply_tx.send(online(core));
        });

        let sent = tasks.send(task);
        drop(control);
        sent.map_err(|_| HotKeyError::NotRunning)?;
        waker.wake();

        let timeout = self.config.marshal_timeout;
        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "dispatch thread did not run marshaled call in time");
                Err(HotKeyError::WorkerUnresponsive(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(HotKeyError::NotRunning),
        }
    }

    /// True when called from the thread running the dispatch loop
    pub(crate) fn is_owner(&self) -> bool {
        lock(&self.control)
            .owner
            .as_ref()
            .is_some_and(|owner| owner.thread == thread::current().id())
    }
}
