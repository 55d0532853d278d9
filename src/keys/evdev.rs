//! Linux input-event key codes and modifier tracking
//!
//! Raw input devices report scan codes, not a modifier state, so the
//! current modifier mask is rebuilt from press/release events.

use super::{HotKeyCode, Keymap};

/// `EV_KEY` event type from `input-event-codes.h`
pub const EV_KEY: u16 = 0x01;

/// Modifier mask bits
pub mod mask {
    pub const ALT: u32 = 1;
    pub const CTRL: u32 = 2;
    pub const SHIFT: u32 = 4;
    pub const META: u32 = 8;
}

pub const MODIFIERS: &[(&str, u32)] = &[
    ("ALT", mask::ALT),
    ("LEFTALT", mask::ALT),
    ("RIGHTALT", mask::ALT),
    ("MENU", mask::ALT),
    ("MOD1", mask::ALT),
    ("CTRL", mask::CTRL),
    ("CONTROL", mask::CTRL),
    ("LEFTCTRL", mask::CTRL),
    ("RIGHTCTRL", mask::CTRL),
    ("SHIFT", mask::SHIFT),
    ("LEFTSHIFT", mask::SHIFT),
    ("RIGHTSHIFT", mask::SHIFT),
    ("MOD4", mask::META),
    ("WIN", mask::META),
    ("META", mask::META),
    ("SUPER", mask::META),
    ("LEFTMETA", mask::META),
    ("RIGHTMETA", mask::META),
];

/// Key names and codes from `linux/input-event-codes.h`
pub const KEYS: &[(&str, u32)] = &[
    ("ESC", 1),
    ("ESCAPE", 1),
    ("1", 2),
    ("2", 3),
    ("3", 4),
    ("4", 5),
    ("5", 6),
    ("6", 7),
    ("7", 8),
    ("8", 9),
    ("9", 10),
    ("0", 11),
    ("MINUS", 12),
    ("EQUAL", 13),
    ("BACKSPACE", 14),
    ("TAB", 15),
    ("Q", 16),
    ("W", 17),
    ("E", 18),
    ("R", 19),
    ("T", 20),
    ("Y", 21),
    ("U", 22),
    ("I", 23),
    ("O", 24),
    ("P", 25),
    ("LEFTBRACE", 26),
    ("RIGHTBRACE", 27),
    ("ENTER", 28),
    ("RETURN", 28),
    ("LEFTCTRL", 29),
    ("A", 30),
    ("S", 31),
    ("D", 32),
    ("F", 33),
    ("G", 34),
    ("H", 35),
    ("J", 36),
    ("K", 37),
    ("L", 38),
    ("SEMICOLON", 39),
    ("APOSTROPHE", 40),
    ("GRAVE", 41),
    ("LEFTSHIFT", 42),
    ("BACKSLASH", 43),
    ("Z", 44),
    ("X", 45),
    ("C", 46),
    ("V", 47),
    ("B", 48),
    ("N", 49),
    ("M", 50),
    ("COMMA", 51),
    ("DOT", 52),
    ("SLASH", 53),
    ("RIGHTSHIFT", 54),
    ("KPASTERISK", 55),
    ("LEFTALT", 56),
    ("SPACE", 57),
    ("CAPSLOCK", 58),
    ("F1", 59),
    ("F2", 60),
    ("F3", 61),
    ("F4", 62),
    ("F5", 63),
    ("F6", 64),
    ("F7", 65),
    ("F8", 66),
    ("F9", 67),
    ("F10", 68),
    ("NUMLOCK", 69),
    ("SCROLLLOCK", 70),
    ("KP7", 71),
    ("KP8", 72),
    ("KP9", 73),
    ("KPMINUS", 74),
    ("KP4", 75),
    ("KP5", 76),
    ("KP6", 77),
    ("KPPLUS", 78),
    ("KP1", 79),
    ("KP2", 80),
    ("KP3", 81),
    ("KP0", 82),
    ("KPDOT", 83),
    ("F11", 87),
    ("F12", 88),
    ("KPENTER", 96),
    ("RIGHTCTRL", 97),
    ("KPSLASH", 98),
    ("SYSRQ", 99),
    ("PRINT", 99),
    ("RIGHTALT", 100),
    ("HOME", 102),
    ("UP", 103),
    ("PAGEUP", 104),
    ("LEFT", 105),
    ("RIGHT", 106),
    ("END", 107),
    ("DOWN", 108),
    ("PAGEDOWN", 109),
    ("INSERT", 110),
    ("DELETE", 111),
    ("DEL", 111),
    ("MUTE", 113),
    ("VOLUMEDOWN", 114),
    ("VOLUMEUP", 115),
    ("PAUSE", 119),
    ("LEFTMETA", 125),
    ("RIGHTMETA", 126),
    ("COMPOSE", 127),
    ("NEXTSONG", 163),
    ("PLAYPAUSE", 164),
    ("PREVIOUSSONG", 165),
    ("STOPCD", 166),
    ("F13", 183),
    ("F14", 184),
    ("F15", 185),
    ("F16", 186),
    ("F17", 187),
    ("F18", 188),
    ("F19", 189),
    ("F20", 190),
    ("F21", 191),
    ("F22", 192),
    ("F23", 193),
    ("F24", 194),
];

pub static KEYMAP: Keymap = Keymap {
    name: "evdev",
    keys: KEYS,
    key_offset: 0,
    modifiers: MODIFIERS,
};

/// Mask bit contributed by a modifier scan code, 0 for ordinary keys
pub fn modifier_bit(scan_code: u16) -> u32 {
    match scan_code {
        56 | 100 => mask::ALT,
        29 | 97 => mask::CTRL,
        42 | 54 => mask::SHIFT,
        125 | 126 => mask::META,
        _ => 0,
    }
}

/// Live modifier mask rebuilt from raw key events
///
/// Left and right variants share a bit, so releasing either one clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierTracker {
    mask: u32,
}

impl ModifierTracker {
    pub fn mask(&self) -> u32 {
        self.mask
    }

    /// Feed one `input_event`; returns the hotkey code on a key-down
    pub fn feed(&mut self, kind: u16, code: u16, value: i32) -> Option<HotKeyCode> {
        if kind != EV_KEY {
            return None;
        }

        let bit = modifier_bit(code);
        if bit != 0 {
            if value == 0 {
                self.mask &= !bit;
            } else {
                self.mask |= bit;
            }
            return None;
        }

        // 1 = press, 2 = autorepeat, 0 = release
        (value == 1).then(|| HotKeyCode::new(self.mask, u32::from(code)))
    }

    pub fn reset(&mut self) {
        self.mask = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFTCTRL: u16 = 29;
    const LEFTSHIFT: u16 = 42;
    const RIGHTSHIFT: u16 = 54;
    const F6: u16 = 64;

    #[test]
    fn test_empty_tracker() {
        let tracker = ModifierTracker::default();
        assert_eq!(tracker.mask(), 0);
    }

    #[test]
    fn test_ctrl_shift_f6() {
        let mut tracker = ModifierTracker::default();
        assert_eq!(tracker.feed(EV_KEY, LEFTCTRL, 1), None);
        assert_eq!(tracker.feed(EV_KEY, LEFTSHIFT, 1), None);

        let code = tracker.feed(EV_KEY, F6, 1);
        assert_eq!(code, KEYMAP.translate("Ctrl+Shift+F6").ok());

        // release produces nothing
        assert_eq!(tracker.feed(EV_KEY, F6, 0), None);
    }

    #[test]
    fn test_release_clears_bit() {
        let mut tracker = ModifierTracker::default();
        tracker.feed(EV_KEY, LEFTCTRL, 1);
        tracker.feed(EV_KEY, LEFTCTRL, 0);
        assert_eq!(tracker.mask(), 0);
        assert_eq!(tracker.feed(EV_KEY, F6, 1), Some(HotKeyCode::new(0, 64)));
    }

    #[test]
    fn test_left_and_right_share_bit() {
        let mut tracker = ModifierTracker::default();
        tracker.feed(EV_KEY, RIGHTSHIFT, 1);
        assert_eq!(tracker.mask(), mask::SHIFT);
        tracker.feed(EV_KEY, LEFTSHIFT, 2);
        assert_eq!(tracker.mask(), mask::SHIFT);
    }

    #[test]
    fn test_autorepeat_does_not_fire() {
        let mut tracker = ModifierTracker::default();
        assert!(tracker.feed(EV_KEY, F6, 1).is_some());
        assert_eq!(tracker.feed(EV_KEY, F6, 2), None);
    }

    #[test]
    fn test_non_key_events_ignored() {
        let mut tracker = ModifierTracker::default();
        // EV_SYN and EV_MSC
        assert_eq!(tracker.feed(0x00, 0, 0), None);
        assert_eq!(tracker.feed(0x04, 4, 458_813), None);
        assert_eq!(tracker.feed(0x04, LEFTCTRL, 1), None);
        assert_eq!(tracker.mask(), 0);
    }
}
