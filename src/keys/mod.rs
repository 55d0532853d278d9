//! Key translation
//!
//! Turns human-readable combo strings such as `Ctrl+Shift+F6` into a
//! platform-neutral [`HotKeyCode`] using a static per-platform [`Keymap`].

pub mod evdev;
pub mod win32;
pub mod x11;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Modifier mask plus key code; the uniqueness key for registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HotKeyCode {
    pub modifiers: u32,
    pub key: u32,
}

impl HotKeyCode {
    pub const fn new(modifiers: u32, key: u32) -> Self {
        Self { modifiers, key }
    }
}

impl fmt::Display for HotKeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mods={:#x} key={:#x}", self.modifiers, self.key)
    }
}

/// Static name tables for one platform
#[derive(Debug)]
pub struct Keymap {
    pub name: &'static str,
    /// Upper-case key names and their codes
    pub keys: &'static [(&'static str, u32)],
    /// Added to every code found in `keys`; hex literals are taken as-is
    pub key_offset: u32,
    /// Upper-case modifier names and their mask bits
    pub modifiers: &'static [(&'static str, u32)],
}

impl Keymap {
    /// Translate a combo like `Ctrl + A` into modifiers and key code.
    ///
    /// The last `+`-separated token is the key, everything before it is a
    /// modifier. Names are matched case-insensitively; a key may also be
    /// given as a `0x` hex literal.
    pub fn translate(&self, combo: &str) -> Result<HotKeyCode, ParseError> {
        if combo.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut parts: Vec<&str> = combo.split('+').map(str::trim).collect();
        let key = match parts.pop() {
            Some(key) if !key.is_empty() => key,
            _ => return Err(ParseError::Empty),
        };
        let key = self.key(key)?;

        let mut modifiers = 0;
        for name in parts {
            modifiers |= self
                .modifier(name)
                .ok_or_else(|| ParseError::UnknownModifier(name.to_string()))?;
        }

        Ok(HotKeyCode::new(modifiers, key))
    }

    /// Resolve a single key token
    pub fn key(&self, token: &str) -> Result<u32, ParseError> {
        if let Some(code) = lookup(self.keys, token) {
            return Ok(code + self.key_offset);
        }

        token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| ParseError::UnknownKey(token.to_string()))
    }

    /// Resolve a single modifier name to its mask bit
    pub fn modifier(&self, name: &str) -> Option<u32> {
        lookup(self.modifiers, name)
    }
}

fn lookup(table: &[(&str, u32)], name: &str) -> Option<u32> {
    table
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|&(_, code)| code)
}
