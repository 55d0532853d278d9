//! X11 key codes, modifier masks and ignored-modifier handling
//!
//! X keycodes are the evdev scan codes shifted by 8. Lock-style modifiers
//! (NumLock, ScrollLock and the unassigned Mod3) must not stop a hotkey from
//! firing, so every grab is repeated for each combination of them and
//! incoming events have them masked out.

use super::{evdev, HotKeyCode, Keymap};

/// Core modifier masks from the X protocol
pub mod mask {
    pub const SHIFT: u16 = 1 << 0;
    pub const LOCK: u16 = 1 << 1;
    pub const CONTROL: u16 = 1 << 2;
    pub const MOD1: u16 = 1 << 3;
    pub const MOD2: u16 = 1 << 4;
    pub const MOD3: u16 = 1 << 5;
    pub const MOD4: u16 = 1 << 6;
    pub const MOD5: u16 = 1 << 7;
}

/// NumLock, Mod3 and ScrollLock
pub const IGNORED_MODIFIERS: [u16; 3] = [mask::MOD2, mask::MOD3, mask::MOD5];

pub const IGNORED_MASK: u16 = mask::MOD2 | mask::MOD3 | mask::MOD5;

/// Number of grabs issued per registration
pub const IGNORED_COMBINATIONS: usize = 1 << IGNORED_MODIFIERS.len();

/// Only the eight core modifiers take part in matching; button bits do not
const MODIFIER_MASK: u16 = 0xFF;

pub const MODIFIERS: &[(&str, u32)] = &[
    ("SHIFT", mask::SHIFT as u32),
    ("CTRL", mask::CONTROL as u32),
    ("CONTROL", mask::CONTROL as u32),
    ("ALT", mask::MOD1 as u32),
    ("MENU", mask::MOD1 as u32),
    ("MOD1", mask::MOD1 as u32),
    ("MOD4", mask::MOD4 as u32),
    ("WIN", mask::MOD4 as u32),
    ("META", mask::MOD4 as u32),
    ("SUPER", mask::MOD4 as u32),
];

pub static KEYMAP: Keymap = Keymap {
    name: "x11",
    keys: evdev::KEYS,
    key_offset: 8,
    modifiers: MODIFIERS,
};

/// Every subset of the ignored modifiers, the empty set first
pub fn ignored_combinations() -> [u16; IGNORED_COMBINATIONS] {
    let mut combinations = [0; IGNORED_COMBINATIONS];
    for (subset, combination) in combinations.iter_mut().enumerate() {
        for (bit, modifier) in IGNORED_MODIFIERS.iter().enumerate() {
            if subset & (1 << bit) != 0 {
                *combination |= modifier;
            }
        }
    }
    combinations
}

/// Hotkey code for a key press with the given event state
pub fn event_code(state: u16, keycode: u8) -> HotKeyCode {
    let modifiers = state & MODIFIER_MASK & !IGNORED_MASK;
    HotKeyCode::new(u32::from(modifiers), u32::from(keycode))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eight_distinct_combinations() {
        let combinations = ignored_combinations();
        assert_eq!(combinations.len(), 8);
        assert_eq!(combinations[0], 0);
        for (i, a) in combinations.iter().enumerate() {
            assert_eq!(a & !IGNORED_MASK, 0);
            for b in &combinations[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(combinations.contains(&IGNORED_MASK));
    }

    #[test]
    fn test_keycode_offset() {
        let code = KEYMAP.translate("Ctrl+Shift+F6").unwrap();
        assert_eq!(code, HotKeyCode::new(u32::from(mask::CONTROL | mask::SHIFT), 72));
    }

    #[test]
    fn test_numlock_does_not_change_match() {
        let registered = KEYMAP.translate("Ctrl+Shift+F6").unwrap();
        let plain = event_code(mask::CONTROL | mask::SHIFT, 72);
        let numlock = event_code(mask::CONTROL | mask::SHIFT | mask::MOD2, 72);
        let all_locks = event_code(mask::CONTROL | mask::SHIFT | IGNORED_MASK, 72);
        assert_eq!(plain, registered);
        assert_eq!(numlock, registered);
        assert_eq!(all_locks, registered);
    }

    #[test]
    fn test_button_bits_are_dropped() {
        // Button1Mask
        let code = event_code(mask::MOD1 | 0x100, 38);
        assert_eq!(code, HotKeyCode::new(u32::from(mask::MOD1), 38));
    }

    #[test]
    fn test_capslock_still_counts() {
        let registered = KEYMAP.translate("Ctrl+A").unwrap();
        assert_ne!(event_code(mask::CONTROL | mask::LOCK, 38), registered);
    }
}
