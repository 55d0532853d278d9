//! Win32 backend built on `RegisterHotKey` and the thread message queue
//!
//! Hotkeys are registered without a window, so `WM_HOTKEY` lands in the
//! queue of the thread that registered them. That thread is the dispatch
//! thread; other threads wake it with a posted `WM_APP`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_NOREPEAT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetMessageW, PeekMessageW, PostThreadMessageW, MSG, PM_NOREMOVE, PM_REMOVE, WM_APP,
    WM_HOTKEY,
};

use super::{Backend, BackendKind, LoopWaker};
use crate::error::{HotKeyError, PlatformError};
use crate::hotkey::HotKeyId;
use crate::keys::win32::KEYMAP;
use crate::keys::{HotKeyCode, Keymap};

const FIRST_ID: i32 = 42;

fn win_error(operation: &'static str, err: windows::core::Error) -> HotKeyError {
    PlatformError {
        operation,
        code: Some(err.code().0),
        message: err.message().to_string(),
    }
    .into()
}

/// Outcome of one `GetMessageW` call
#[derive(Debug, PartialEq, Eq)]
enum Fetched {
    Message,
    /// `WM_QUIT`: the queue is closing and the loop has to end
    Quit,
    Failed,
}

impl Fetched {
    fn from_status(status: i32) -> Self {
        match status {
            -1 => Fetched::Failed,
            0 => Fetched::Quit,
            _ => Fetched::Message,
        }
    }
}

fn quit_error(exit_code: usize) -> HotKeyError {
    PlatformError::new(
        "GetMessageW",
        format!("WM_QUIT received with exit code {exit_code}"),
    )
    .into()
}

struct ThreadWaker {
    thread_id: u32,
}

impl LoopWaker for ThreadWaker {
    fn wake(&self) {
        // SAFETY: posting a message with no pointer payload to a thread id.
        if let Err(e) = unsafe { PostThreadMessageW(self.thread_id, WM_APP, WPARAM(0), LPARAM(0)) } {
            debug!(thread = self.thread_id, error = %e, "failed to post wake message");
        }
    }
}

#[derive(Default)]
pub struct Win32Backend {
    waker: Option<Arc<ThreadWaker>>,
    handles: HashMap<i32, HotKeyId>,
    native_ids: HashMap<HotKeyCode, i32>,
}

impl Win32Backend {
    pub fn new() -> Self {
        Self::default()
    }

    /// First id at or above 42 not currently in use
    fn next_id(&self) -> i32 {
        (FIRST_ID..)
            .find(|id| !self.handles.contains_key(id))
            .unwrap_or(FIRST_ID)
    }

    fn dispatch(&self, msg: &MSG, fired: &mut Vec<HotKeyId>) {
        match msg.message {
            WM_HOTKEY => match self.handles.get(&(msg.wParam.0 as i32)) {
                Some(&id) => fired.push(id),
                None => debug!(native_id = msg.wParam.0, "WM_HOTKEY for unknown id"),
            },
            WM_APP => {}
            other => debug!(message = other, "ignoring thread message"),
        }
    }
}

impl Backend for Win32Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Win32
    }

    fn keymap(&self) -> &'static Keymap {
        &KEYMAP
    }

    fn prepare(&mut self) -> Result<Arc<dyn LoopWaker>, HotKeyError> {
        if let Some(waker) = &self.waker {
            return Ok(Arc::clone(waker) as Arc<dyn LoopWaker>);
        }

        // SAFETY: plain Win32 calls on the current thread; peeking forces
        // the system to create the thread's message queue.
        let thread_id = unsafe {
            let mut msg = MSG::default();
            let _ = PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_NOREMOVE);
            GetCurrentThreadId()
        };

        let waker = Arc::new(ThreadWaker { thread_id });
        self.waker = Some(Arc::clone(&waker));
        Ok(waker)
    }

    fn register(&mut self, id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        if self.native_ids.contains_key(&code) {
            return Err(HotKeyError::Duplicate {
                combo: code.to_string(),
            });
        }

        let native_id = self.next_id();
        let modifiers = HOT_KEY_MODIFIERS(code.modifiers) | MOD_NOREPEAT;
        // SAFETY: registers against the calling thread's queue (no window).
        unsafe { RegisterHotKey(HWND::default(), native_id, modifiers, code.key) }
            .map_err(|e| win_error("RegisterHotKey", e))?;

        self.handles.insert(native_id, id);
        self.native_ids.insert(code, native_id);
        Ok(())
    }

    fn unregister(&mut self, _id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        let Some(&native_id) = self.native_ids.get(&code) else {
            return Ok(());
        };

        // SAFETY: the id was registered on this thread by `register`.
        unsafe { UnregisterHotKey(HWND::default(), native_id) }
            .map_err(|e| win_error("UnregisterHotKey", e))?;

        self.native_ids.remove(&code);
        self.handles.remove(&native_id);
        Ok(())
    }

    fn pump(&mut self, _timeout: Duration, fired: &mut Vec<HotKeyId>) -> Result<(), HotKeyError> {
        let mut msg = MSG::default();

        // GetMessageW has no timeout; stop and marshaled calls post WM_APP.
        // SAFETY: `msg` is a valid out pointer for the duration of the call.
        let status = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
        match Fetched::from_status(status.0) {
            Fetched::Failed => {
                return Err(win_error("GetMessageW", windows::core::Error::from_win32()));
            }
            Fetched::Quit => {
                warn!("WM_QUIT received, ending the dispatch loop");
                return Err(quit_error(msg.wParam.0));
            }
            Fetched::Message => self.dispatch(&msg, fired),
        }

        // SAFETY: as above, non-blocking.
        while unsafe { PeekMessageW(&mut msg, HWND::default(), 0, 0, PM_REMOVE) }.as_bool() {
            self.dispatch(&msg, fired);
        }
        Ok(())
    }

    fn release(&mut self) {
        for (native_id, _) in self.handles.drain() {
            // SAFETY: ids left here were registered on this thread.
            if let Err(e) = unsafe { UnregisterHotKey(HWND::default(), native_id) } {
                warn!(native_id, error = %e, "failed to unregister hotkey on release");
            }
        }
        self.native_ids.clear();
        self.waker = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_ids_start_at_42() {
        let backend = Win32Backend::new();
        assert_eq!(backend.next_id(), 42);
    }

    #[test]
    fn test_quit_ends_the_pump() {
        assert_eq!(Fetched::from_status(0), Fetched::Quit);
        assert_eq!(Fetched::from_status(-1), Fetched::Failed);
        assert_eq!(Fetched::from_status(1), Fetched::Message);

        match quit_error(3) {
            HotKeyError::Platform(err) => {
                assert_eq!(err.operation, "GetMessageW");
                assert!(err.message.contains("exit code 3"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_translate_uses_virtual_keys() {
        let backend = Win32Backend::new();
        let code = backend.translate("Ctrl+Shift+F6").unwrap();
        assert_eq!(code.key, 0x75);
        assert_eq!(
            code.modifiers,
            crate::keys::win32::mask::CONTROL | crate::keys::win32::mask::SHIFT
        );
    }
}
