//! X11 backend using passive key grabs on the root window
//!
//! Each hotkey is grabbed once per combination of the ignored lock
//! modifiers, so NumLock or ScrollLock being on does not swallow it.

use std::collections::HashMap;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ChangeWindowAttributesAux, ConnectionExt as _, EventMask, GrabMode, ModMask, Window,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::wake::{poll_readable, WakePipe};
use super::{Backend, BackendKind, LoopWaker};
use crate::error::{HotKeyError, PlatformError};
use crate::hotkey::HotKeyId;
use crate::keys::x11::{event_code, ignored_combinations, KEYMAP};
use crate::keys::{HotKeyCode, Keymap};

struct Display {
    conn: RustConnection,
    root: Window,
    wake: Arc<WakePipe>,
}

pub struct X11Backend {
    display_name: Option<String>,
    display: Option<Display>,
    grabs: HashMap<HotKeyCode, HotKeyId>,
}

impl X11Backend {
    pub fn new(display_name: Option<String>) -> Self {
        Self {
            display_name,
            display: None,
            grabs: HashMap::new(),
        }
    }

    fn display(&self, operation: &'static str) -> Result<&Display, HotKeyError> {
        self.display
            .as_ref()
            .ok_or_else(|| PlatformError::new(operation, "display connection not prepared").into())
    }
}

/// The root-window key grab requests
trait KeyGrabber {
    fn grab(&self, key: u8, modifiers: u16) -> Result<(), HotKeyError>;
    fn ungrab(&self, key: u8, modifiers: u16) -> Result<(), HotKeyError>;
}

impl KeyGrabber for Display {
    fn grab(&self, key: u8, modifiers: u16) -> Result<(), HotKeyError> {
        self.conn
            .grab_key(
                false,
                self.root,
                ModMask::from(modifiers),
                key,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(|e| x_error("XGrabKey", e))?
            .check()
            .map_err(|e| x_error("XGrabKey", e))
    }

    fn ungrab(&self, key: u8, modifiers: u16) -> Result<(), HotKeyError> {
        self.conn
            .ungrab_key(key, self.root, ModMask::from(modifiers))
            .map_err(|e| x_error("XUngrabKey", e))?
            .check()
            .map_err(|e| x_error("XUngrabKey", e))
    }
}

/// Grab `key` once per ignored-modifier combination.
///
/// Stops at the first failure; grabs that succeeded before it stay
/// installed and the caller retries to converge.
fn grab_all(grabber: &impl KeyGrabber, key: u8, modifiers: u16) -> Result<(), HotKeyError> {
    for ignored in ignored_combinations() {
        grabber.grab(key, modifiers | ignored)?;
    }
    Ok(())
}

/// Release every combination grabbed by [`grab_all`], with the same
/// stop-at-first-failure rule
fn ungrab_all(grabber: &impl KeyGrabber, key: u8, modifiers: u16) -> Result<(), HotKeyError> {
    for ignored in ignored_combinations() {
        grabber.ungrab(key, modifiers | ignored)?;
    }
    Ok(())
}

fn x_error(operation: &'static str, err: impl std::fmt::Display) -> HotKeyError {
    PlatformError::new(operation, err.to_string()).into()
}

/// Split a code into the protocol's 8-bit keycode and 16-bit modifier mask
fn wire_code(code: HotKeyCode, operation: &'static str) -> Result<(u8, u16), HotKeyError> {
    let key = u8::try_from(code.key)
        .map_err(|_| x_error(operation, format!("keycode {:#x} out of range", code.key)))?;
    let modifiers = u16::try_from(code.modifiers)
        .map_err(|_| x_error(operation, format!("modifiers {:#x} out of range", code.modifiers)))?;
    Ok((key, modifiers))
}

fn drain_events(
    conn: &RustConnection,
    grabs: &HashMap<HotKeyCode, HotKeyId>,
    fired: &mut Vec<HotKeyId>,
) -> Result<(), HotKeyError> {
    while let Some(event) = conn
        .poll_for_event()
        .map_err(|e| x_error("read X event", e))?
    {
        if let Event::KeyPress(press) = event {
            let code = event_code(u16::from(press.state), press.detail);
            match grabs.get(&code) {
                Some(&id) => fired.push(id),
                None => debug!(%code, "key press without a matching grab"),
            }
        }
    }
    Ok(())
}

impl Backend for X11Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::X11
    }

    fn keymap(&self) -> &'static Keymap {
        &KEYMAP
    }

    fn prepare(&mut self) -> Result<Arc<dyn LoopWaker>, HotKeyError> {
        if let Some(display) = &self.display {
            return Ok(Arc::clone(&display.wake) as Arc<dyn LoopWaker>);
        }

        let (conn, screen) = x11rb::connect(self.display_name.as_deref())
            .map_err(|e| x_error("connect to X display", e))?;
        let root = conn.setup().roots[screen].root;

        conn.change_window_attributes(
            root,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::KEY_PRESS),
        )
        .map_err(|e| x_error("XChangeWindowAttributes", e))?
        .check()
        .map_err(|e| x_error("XChangeWindowAttributes", e))?;

        let wake = Arc::new(WakePipe::new().map_err(|e| PlatformError::from_io("pipe2", &e))?);
        info!(display = ?self.display_name, screen, "connected to X display");

        self.display = Some(Display {
            conn,
            root,
            wake: Arc::clone(&wake),
        });
        Ok(wake)
    }

    fn register(&mut self, id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        if self.grabs.contains_key(&code) {
            return Err(HotKeyError::Duplicate {
                combo: code.to_string(),
            });
        }

        let (key, modifiers) = wire_code(code, "XGrabKey")?;
        grab_all(self.display("XGrabKey")?, key, modifiers)?;
        self.grabs.insert(code, id);
        Ok(())
    }

    fn unregister(&mut self, _id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        let (key, modifiers) = wire_code(code, "XUngrabKey")?;
        ungrab_all(self.display("XUngrabKey")?, key, modifiers)?;
        self.grabs.remove(&code);
        Ok(())
    }

    fn pump(&mut self, timeout: Duration, fired: &mut Vec<HotKeyId>) -> Result<(), HotKeyError> {
        let display = self.display("read X event")?;

        drain_events(&display.conn, &self.grabs, fired)?;
        if !fired.is_empty() {
            return Ok(());
        }

        display
            .conn
            .flush()
            .map_err(|e| x_error("flush X connection", e))?;

        let fds = [display.conn.stream().as_raw_fd(), display.wake.fd()];
        let ready = poll_readable(&fds, timeout).map_err(|e| PlatformError::from_io("poll", &e))?;
        if ready[1] {
            display.wake.drain();
        }

        drain_events(&display.conn, &self.grabs, fired)
    }

    fn release(&mut self) {
        if let Some(display) = self.display.take() {
            // Closing the connection drops every grab it holds.
            if let Err(e) = display.conn.flush() {
                warn!(error = %e, "failed to flush X connection on release");
            }
        }
        self.grabs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::x11::{mask, IGNORED_COMBINATIONS};
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// Records grabs and fails the request with the given 1-based index
    #[derive(Default)]
    struct FakeRoot {
        grabbed: RefCell<HashSet<(u8, u16)>>,
        requests: RefCell<usize>,
        fail_at: Option<usize>,
    }

    impl FakeRoot {
        fn failing_at(request: usize) -> Self {
            Self {
                fail_at: Some(request),
                ..Self::default()
            }
        }

        fn request(&self, operation: &'static str) -> Result<(), HotKeyError> {
            let mut requests = self.requests.borrow_mut();
            *requests += 1;
            if Some(*requests) == self.fail_at {
                return Err(x_error(operation, "BadAccess"));
            }
            Ok(())
        }
    }

    impl KeyGrabber for FakeRoot {
        fn grab(&self, key: u8, modifiers: u16) -> Result<(), HotKeyError> {
            self.request("XGrabKey")?;
            self.grabbed.borrow_mut().insert((key, modifiers));
            Ok(())
        }

        fn ungrab(&self, key: u8, modifiers: u16) -> Result<(), HotKeyError> {
            self.request("XUngrabKey")?;
            self.grabbed.borrow_mut().remove(&(key, modifiers));
            Ok(())
        }
    }

    const F6: u8 = 72;

    #[test]
    fn test_grab_covers_every_ignored_combination() {
        let root = FakeRoot::default();
        grab_all(&root, F6, mask::CONTROL).unwrap();

        let grabbed = root.grabbed.borrow();
        assert_eq!(grabbed.len(), IGNORED_COMBINATIONS);
        assert!(grabbed.contains(&(F6, mask::CONTROL)));
        assert!(grabbed.contains(&(F6, mask::CONTROL | mask::MOD2)));
        assert!(grabbed.contains(&(F6, mask::CONTROL | mask::MOD2 | mask::MOD3 | mask::MOD5)));
    }

    #[test]
    fn test_failed_grab_keeps_earlier_grabs() {
        let root = FakeRoot::failing_at(4);
        let err = grab_all(&root, F6, mask::CONTROL).unwrap_err();

        match err {
            HotKeyError::Platform(platform) => assert_eq!(platform.operation, "XGrabKey"),
            other => panic!("unexpected {other:?}"),
        }
        // Three grabs went through and nothing was rolled back.
        assert_eq!(*root.requests.borrow(), 4);
        assert_eq!(root.grabbed.borrow().len(), 3);
    }

    #[test]
    fn test_failed_ungrab_keeps_remaining_grabs() {
        let root = FakeRoot::failing_at(IGNORED_COMBINATIONS + 2);
        grab_all(&root, F6, mask::SHIFT).unwrap();

        let err = ungrab_all(&root, F6, mask::SHIFT).unwrap_err();
        assert!(matches!(err, HotKeyError::Platform(_)));
        assert_eq!(root.grabbed.borrow().len(), IGNORED_COMBINATIONS - 1);
    }

    #[test]
    fn test_wire_code_range() {
        assert_eq!(
            wire_code(HotKeyCode::new(u32::from(mask::CONTROL), 72), "XGrabKey").unwrap(),
            (72, mask::CONTROL)
        );
        assert!(wire_code(HotKeyCode::new(0, 0x1FF), "XGrabKey").is_err());
        assert!(wire_code(HotKeyCode::new(0x1_0000, 72), "XGrabKey").is_err());
    }
}
