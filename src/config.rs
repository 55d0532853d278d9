//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::BackendKind;

pub const ENV_BACKEND: &str = "HOTKEY_BACKEND";
pub const ENV_DEVICES: &str = "HOTKEY_DEVICES";
pub const ENV_POLL_INTERVAL: &str = "HOTKEY_POLL_INTERVAL_MS";
pub const ENV_MARSHAL_TIMEOUT: &str = "HOTKEY_MARSHAL_TIMEOUT_MS";
pub const ENV_BINDINGS: &str = "HOTKEY_BINDINGS";

/// Hotkey service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Forced backend; detected from the platform when unset
    pub backend: Option<BackendKind>,

    /// X display name, as found in `DISPLAY`
    pub display: Option<String>,

    /// Input devices for the raw-input backend; scans `input_dir` when unset
    pub devices: Option<Vec<PathBuf>>,

    pub input_dir: PathBuf,

    /// Upper bound for one blocking wait of the event pump
    pub poll_interval: Duration,

    /// How long a caller waits for the dispatch thread to run its operation
    pub marshal_timeout: Duration,

    /// Bindings file read by the daemon
    pub bindings_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: None,
            display: None,
            devices: None,
            input_dir: PathBuf::from("/dev/input"),
            poll_interval: Duration::from_millis(100),
            marshal_timeout: Duration::from_secs(2),
            bindings_path: PathBuf::from("bindings.json"),
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let backend = lookup(ENV_BACKEND)
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.parse::<BackendKind>())
            .transpose()
            .with_context(|| format!("invalid {ENV_BACKEND}"))?;

        let devices = lookup(ENV_DEVICES)
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                value
                    .split(':')
                    .filter(|path| !path.is_empty())
                    .map(PathBuf::from)
                    .collect()
            });

        let poll_interval = millis(&lookup, ENV_POLL_INTERVAL)?.unwrap_or(defaults.poll_interval);
        let marshal_timeout =
            millis(&lookup, ENV_MARSHAL_TIMEOUT)?.unwrap_or(defaults.marshal_timeout);

        let bindings_path = match lookup(ENV_BINDINGS) {
            Some(path) => PathBuf::from(path),
            None => {
                let home = lookup("HOME")
                    .or_else(|| lookup("USERPROFILE"))
                    .ok_or_else(|| anyhow!("neither HOME nor USERPROFILE is set"))?;
                PathBuf::from(home)
                    .join(".config")
                    .join("hotkey-daemon")
                    .join("bindings.json")
            }
        };

        Ok(Self {
            backend,
            display: lookup("DISPLAY").filter(|value| !value.is_empty()),
            devices,
            input_dir: defaults.input_dir,
            poll_interval,
            marshal_timeout,
            bindings_path,
        })
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("invalid {key}: {value}"))
        })
        .transpose()
}

/// One hotkey binding of the daemon: run `command` when `combo` is pressed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub combo: String,
    pub command: String,
}

#[derive(Debug, Default, Deserialize)]
struct BindingsFile {
    #[serde(default)]
    bindings: Vec<Binding>,
}

/// Read the bindings file; a missing file means no bindings
pub fn load_bindings(path: &Path) -> Result<Vec<Binding>> {
    if !path.exists() {
        warn!(?path, "bindings file not found, starting without bindings");
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: BindingsFile = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(file.bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_lookup(env(&[("HOME", "/home/test")])).unwrap();
        assert_eq!(config.backend, None);
        assert_eq!(config.devices, None);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.marshal_timeout, Duration::from_secs(2));
        assert!(config
            .bindings_path
            .to_string_lossy()
            .contains("hotkey-daemon"));
    }

    #[test]
    fn test_config_overrides() {
        let config = Config::from_lookup(env(&[
            (ENV_BACKEND, "evdev"),
            (ENV_DEVICES, "/dev/input/event3:/dev/input/event7"),
            (ENV_POLL_INTERVAL, "50"),
            (ENV_MARSHAL_TIMEOUT, "250"),
            (ENV_BINDINGS, "/tmp/b.json"),
            ("DISPLAY", ":0"),
        ]))
        .unwrap();
        assert_eq!(config.backend, Some(BackendKind::Evdev));
        assert_eq!(
            config.devices,
            Some(vec![
                PathBuf::from("/dev/input/event3"),
                PathBuf::from("/dev/input/event7")
            ])
        );
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.marshal_timeout, Duration::from_millis(250));
        assert_eq!(config.bindings_path, PathBuf::from("/tmp/b.json"));
        assert_eq!(config.display.as_deref(), Some(":0"));
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(Config::from_lookup(env(&[(ENV_BACKEND, "wayland"), ("HOME", "/h")])).is_err());
        assert!(Config::from_lookup(env(&[(ENV_POLL_INTERVAL, "soon"), ("HOME", "/h")])).is_err());
        assert!(Config::from_lookup(env(&[])).is_err());
    }

    #[test]
    fn test_bindings_parse() {
        let json = r#"{"bindings":[{"combo":"Ctrl+Alt+T","command":"xterm"}]}"#;
        let file: BindingsFile = serde_json::from_str(json).unwrap();
        assert_eq!(
            file.bindings,
            vec![Binding {
                combo: "Ctrl+Alt+T".to_string(),
                command: "xterm".to_string()
            }]
        );
    }

    #[test]
    fn test_missing_bindings_file() {
        let bindings = load_bindings(Path::new("/nonexistent/bindings.json")).unwrap();
        assert!(bindings.is_empty());
    }
}
