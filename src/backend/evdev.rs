//! Raw input backend reading `/dev/input/event*`
//!
//! There is no native grab: every keyboard event is read, the modifier mask
//! is tracked by hand and key-downs are matched against the index. The user
//! needs read access to the devices, usually through the `input` group.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use evdev::{Device, EventType, InputEvent};
use tracing::{debug, info, warn};

use super::wake::{poll_readable, set_nonblocking, WakePipe};
use super::{Backend, BackendKind, LoopWaker};
use crate::config::Config;
use crate::error::{HotKeyError, PlatformError};
use crate::hotkey::HotKeyId;
use crate::keys::evdev::{ModifierTracker, KEYMAP};
use crate::keys::{HotKeyCode, Keymap};

/// An opened input device the pump can poll and read
trait InputDevice: Send {
    fn fd(&self) -> RawFd;

    /// Append the events that are ready; `WouldBlock` when there are none
    fn fetch(&mut self, events: &mut Vec<InputEvent>) -> io::Result<()>;
}

impl InputDevice for Device {
    fn fd(&self) -> RawFd {
        self.as_raw_fd()
    }

    fn fetch(&mut self, events: &mut Vec<InputEvent>) -> io::Result<()> {
        events.extend(self.fetch_events()?);
        Ok(())
    }
}

/// Where the device list comes from
#[derive(Debug, Clone)]
enum DeviceSource {
    Paths(Vec<PathBuf>),
    Scan(PathBuf),
}

struct Opened {
    path: PathBuf,
    device: Box<dyn InputDevice>,
}

pub struct EvdevBackend {
    source: DeviceSource,
    devices: Vec<Opened>,
    tracker: ModifierTracker,
    bindings: HashMap<HotKeyCode, HotKeyId>,
    wake: Option<Arc<WakePipe>>,
    events: Vec<InputEvent>,
}

impl EvdevBackend {
    pub fn new(config: &Config) -> Self {
        let source = match &config.devices {
            Some(paths) => DeviceSource::Paths(paths.clone()),
            None => DeviceSource::Scan(config.input_dir.clone()),
        };
        Self {
            source,
            devices: Vec::new(),
            tracker: ModifierTracker::default(),
            bindings: HashMap::new(),
            wake: None,
            events: Vec::new(),
        }
    }

    fn device_paths(&self) -> io::Result<Vec<PathBuf>> {
        match &self.source {
            DeviceSource::Paths(paths) => Ok(paths.clone()),
            DeviceSource::Scan(dir) => {
                let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_name().to_string_lossy().starts_with("event"))
                    .map(|entry| entry.path())
                    .collect();
                paths.sort();
                Ok(paths)
            }
        }
    }

    fn open_devices(&mut self) -> Result<(), HotKeyError> {
        let paths = self
            .device_paths()
            .map_err(|e| PlatformError::from_io("list input devices", &e))?;
        let scanned = matches!(self.source, DeviceSource::Scan(_));

        self.devices.clear();
        let mut denied = 0;
        for path in paths {
            match open_keyboard(&path, scanned) {
                Ok(Some(device)) => self.devices.push(Opened {
                    path,
                    device: Box::new(device),
                }),
                Ok(None) => debug!(?path, "skipping input device without keys"),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    denied += 1;
                    debug!(?path, "permission denied on input device");
                }
                Err(e) => warn!(?path, error = %e, "failed to open input device"),
            }
        }

        if self.devices.is_empty() && denied > 0 {
            return Err(PlatformError {
                operation: "open input devices",
                code: Some(libc::EACCES),
                message: "permission denied reading /dev/input/event*; \
                          the user usually needs to be in the `input` group"
                    .to_string(),
            }
            .into());
        }

        info!(devices = self.devices.len(), denied, "input devices opened");
        Ok(())
    }

    #[cfg(test)]
    fn attach(&mut self, path: &str, device: impl InputDevice + 'static) {
        self.devices.push(Opened {
            path: PathBuf::from(path),
            device: Box::new(device),
        });
    }
}

/// Open `path` for non-blocking reads.
///
/// Scanned devices that report no key events (mice, switches) are skipped;
/// configured paths are taken as given.
fn open_keyboard(path: &Path, scanned: bool) -> io::Result<Option<Device>> {
    let device = Device::open(path)?;
    if scanned && !device.supported_events().contains(EventType::KEY) {
        return Ok(None);
    }
    set_nonblocking(device.as_raw_fd())?;
    debug!(?path, name = device.name().unwrap_or("unknown"), "input device opened");
    Ok(Some(device))
}

impl Backend for EvdevBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Evdev
    }

    fn keymap(&self) -> &'static Keymap {
        &KEYMAP
    }

    fn prepare(&mut self) -> Result<Arc<dyn LoopWaker>, HotKeyError> {
        if let Some(wake) = &self.wake {
            return Ok(Arc::clone(wake) as Arc<dyn LoopWaker>);
        }

        let wake = Arc::new(WakePipe::new().map_err(|e| PlatformError::from_io("pipe2", &e))?);
        self.tracker.reset();
        self.open_devices()?;
        self.wake = Some(Arc::clone(&wake));
        Ok(wake)
    }

    fn register(&mut self, id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        if self.bindings.contains_key(&code) {
            return Err(HotKeyError::Duplicate {
                combo: code.to_string(),
            });
        }
        self.bindings.insert(code, id);
        Ok(())
    }

    fn unregister(&mut self, _id: HotKeyId, code: HotKeyCode) -> Result<(), HotKeyError> {
        self.bindings.remove(&code);
        Ok(())
    }

    fn pump(&mut self, timeout: Duration, fired: &mut Vec<HotKeyId>) -> Result<(), HotKeyError> {
        let wake = self
            .wake
            .clone()
            .ok_or_else(|| PlatformError::new("poll input devices", "backend not prepared"))?;

        let mut fds: Vec<_> = self.devices.iter().map(|opened| opened.device.fd()).collect();
        fds.push(wake.fd());

        let ready = poll_readable(&fds, timeout).map_err(|e| PlatformError::from_io("poll", &e))?;
        if ready.last() == Some(&true) {
            wake.drain();
        }

        let Self {
            devices,
            tracker,
            bindings,
            events,
            ..
        } = self;

        let mut lost = Vec::new();
        for (index, opened) in devices.iter_mut().enumerate() {
            if !ready[index] {
                continue;
            }

            events.clear();
            match opened.device.fetch(events) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(path = ?opened.path, error = %e, "input device lost");
                    lost.push(index);
                    continue;
                }
            }

            for event in events.iter() {
                let Some(code) = tracker.feed(event.event_type().0, event.code(), event.value())
                else {
                    continue;
                };
                if let Some(&id) = bindings.get(&code) {
                    fired.push(id);
                }
            }
        }

        // Devices are not re-scanned while the loop runs.
        for index in lost.into_iter().rev() {
            let opened = devices.remove(index);
            debug!(path = ?opened.path, "dropped input device");
        }

        Ok(())
    }

    fn release(&mut self) {
        self.devices.clear();
        self.bindings.clear();
        self.tracker.reset();
        self.events.clear();
        self.wake = None;
    }
}
