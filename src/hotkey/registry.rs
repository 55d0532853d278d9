//! Registry of live hotkeys
//!
//! An arena of slots addressed by generation-checked [`HotKeyId`]s plus an
//! index by [`HotKeyCode`]. Freeing a slot bumps its generation, so ids held
//! by freed handles never resolve to whatever reuses the slot later.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use super::callback::{Callback, ErrorHandler};
use crate::keys::HotKeyCode;

/// Capability for one registry slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HotKeyId {
    index: u32,
    generation: u32,
}

impl fmt::Display for HotKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

pub(crate) struct Entry {
    pub combo: String,
    pub code: HotKeyCode,
    pub callback: Callback,
    pub error_handler: Option<ErrorHandler>,
    /// A native grab is installed
    pub active: bool,
    /// Explicitly unregistered; not re-registered when the loop starts
    pub parked: bool,
}

impl Entry {
    pub fn new(combo: String, code: HotKeyCode, callback: Callback) -> Self {
        Self {
            combo,
            code,
            callback,
            error_handler: None,
            active: false,
            parked: false,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("combo", &self.combo)
            .field("code", &self.code)
            .field("active", &self.active)
            .field("parked", &self.parked)
            .finish()
    }
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
pub(crate) struct Registry {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    by_code: HashMap<HotKeyCode, HotKeyId>,
}

impl Registry {
    /// Insert an entry unless its code is already taken by a live entry.
    ///
    /// A rejected entry is handed back so the caller can drop it, and the
    /// callback it owns, after releasing the registry lock.
    pub fn insert(&mut self, entry: Entry) -> Result<HotKeyId, Entry> {
        if self.by_code.contains_key(&entry.code) {
            return Err(entry);
        }

        let code = entry.code;
        let id = match self.vacant.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                HotKeyId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                HotKeyId {
                    index,
                    generation: 0,
                }
            }
        };

        self.by_code.insert(code, id);
        Ok(id)
    }

    pub fn get(&self, id: HotKeyId) -> Option<&Entry> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, id: HotKeyId) -> Option<&mut Entry> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn remove(&mut self, id: HotKeyId) -> Option<Entry> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);
        self.by_code.remove(&entry.code);
        Some(entry)
    }

    pub fn lookup(&self, code: HotKeyCode) -> Option<HotKeyId> {
        self.by_code.get(&code).copied()
    }

    #[cfg(test)]
    pub fn ids(&self) -> Vec<HotKeyId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HotKeyId, &Entry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    HotKeyId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    entry,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.slots.iter_mut().filter_map(|slot| slot.entry.as_mut())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_code.len()
    }
}

/// Point-in-time view of a registered hotkey
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotKeyInfo {
    pub id: HotKeyId,
    pub combo: String,
    pub code: HotKeyCode,
    pub active: bool,
}

impl HotKeyInfo {
    pub(crate) fn new(id: HotKeyId, entry: &Entry) -> Self {
        Self {
            id,
            combo: entry.combo.clone(),
            code: entry.code,
            active: entry.active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::callback;

    fn entry(combo: &str, key: u32) -> Entry {
        Entry::new(
            combo.to_string(),
            HotKeyCode::new(0, key),
            callback::from_fn(|| ()),
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = Registry::default();
        let id = registry.insert(entry("F1", 59)).unwrap();
        assert_eq!(registry.lookup(HotKeyCode::new(0, 59)), Some(id));
        assert_eq!(registry.get(id).unwrap().combo, "F1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let mut registry = Registry::default();
        registry.insert(entry("F1", 59)).unwrap();
        let rejected = registry.insert(entry("f1", 59)).unwrap_err();
        assert_eq!(rejected.combo, "f1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_id_after_reuse() {
        let mut registry = Registry::default();
        let first = registry.insert(entry("F1", 59)).unwrap();
        assert!(registry.remove(first).is_some());
        assert!(registry.get(first).is_none());
        assert!(registry.lookup(HotKeyCode::new(0, 59)).is_none());

        let second = registry.insert(entry("F2", 60)).unwrap();
        assert_ne!(first, second);
        assert!(registry.get(first).is_none());
        assert!(registry.remove(first).is_none());
        assert_eq!(registry.get(second).unwrap().combo, "F2");
    }

    #[test]
    fn test_code_free_after_remove() {
        let mut registry = Registry::default();
        let id = registry.insert(entry("F1", 59)).unwrap();
        registry.remove(id);
        assert!(registry.insert(entry("F1", 59)).is_ok());
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut registry = Registry::default();
        let a = registry.insert(entry("F1", 59)).unwrap();
        let b = registry.insert(entry("F2", 60)).unwrap();
        registry.remove(a);
        assert_eq!(registry.ids(), vec![b]);
    }
}
