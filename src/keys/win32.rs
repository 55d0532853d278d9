//! Windows virtual-key codes and `RegisterHotKey` modifier flags

use super::Keymap;

/// `MOD_*` flags accepted by `RegisterHotKey`
pub mod mask {
    pub const ALT: u32 = 0x0001;
    pub const CONTROL: u32 = 0x0002;
    pub const SHIFT: u32 = 0x0004;
    pub const WIN: u32 = 0x0008;
}

pub const MODIFIERS: &[(&str, u32)] = &[
    ("ALT", mask::ALT),
    ("MENU", mask::ALT),
    ("MOD1", mask::ALT),
    ("CTRL", mask::CONTROL),
    ("CONTROL", mask::CONTROL),
    ("SHIFT", mask::SHIFT),
    ("MOD4", mask::WIN),
    ("WIN", mask::WIN),
    ("META", mask::WIN),
    ("SUPER", mask::WIN),
];

pub const KEYS: &[(&str, u32)] = &[
    ("BACKSPACE", 0x08),
    ("BACK", 0x08),
    ("TAB", 0x09),
    ("ENTER", 0x0D),
    ("RETURN", 0x0D),
    ("PAUSE", 0x13),
    ("CAPSLOCK", 0x14),
    ("ESC", 0x1B),
    ("ESCAPE", 0x1B),
    ("SPACE", 0x20),
    ("PAGEUP", 0x21),
    ("PRIOR", 0x21),
    ("PAGEDOWN", 0x22),
    ("NEXT", 0x22),
    ("END", 0x23),
    ("HOME", 0x24),
    ("LEFT", 0x25),
    ("UP", 0x26),
    ("RIGHT", 0x27),
    ("DOWN", 0x28),
    ("PRINT", 0x2C),
    ("SNAPSHOT", 0x2C),
    ("INSERT", 0x2D),
    ("DELETE", 0x2E),
    ("DEL", 0x2E),
    ("0", 0x30),
    ("1", 0x31),
    ("2", 0x32),
    ("3", 0x33),
    ("4", 0x34),
    ("5", 0x35),
    ("6", 0x36),
    ("7", 0x37),
    ("8", 0x38),
    ("9", 0x39),
    ("A", 0x41),
    ("B", 0x42),
    ("C", 0x43),
    ("D", 0x44),
    ("E", 0x45),
    ("F", 0x46),
    ("G", 0x47),
    ("H", 0x48),
    ("I", 0x49),
    ("J", 0x4A),
    ("K", 0x4B),
    ("L", 0x4C),
    ("M", 0x4D),
    ("N", 0x4E),
    ("O", 0x4F),
    ("P", 0x50),
    ("Q", 0x51),
    ("R", 0x52),
    ("S", 0x53),
    ("T", 0x54),
    ("U", 0x55),
    ("V", 0x56),
    ("W", 0x57),
    ("X", 0x58),
    ("Y", 0x59),
    ("Z", 0x5A),
    ("KP0", 0x60),
    ("KP1", 0x61),
    ("KP2", 0x62),
    ("KP3", 0x63),
    ("KP4", 0x64),
    ("KP5", 0x65),
    ("KP6", 0x66),
    ("KP7", 0x67),
    ("KP8", 0x68),
    ("KP9", 0x69),
    ("KPASTERISK", 0x6A),
    ("KPPLUS", 0x6B),
    ("KPMINUS", 0x6D),
    ("KPDOT", 0x6E),
    ("KPSLASH", 0x6F),
    ("F1", 0x70),
    ("F2", 0x71),
    ("F3", 0x72),
    ("F4", 0x73),
    ("F5", 0x74),
    ("F6", 0x75),
    ("F7", 0x76),
    ("F8", 0x77),
    ("F9", 0x78),
    ("F10", 0x79),
    ("F11", 0x7A),
    ("F12", 0x7B),
    ("F13", 0x7C),
    ("F14", 0x7D),
    ("F15", 0x7E),
    ("F16", 0x7F),
    ("F17", 0x80),
    ("F18", 0x81),
    ("F19", 0x82),
    ("F20", 0x83),
    ("F21", 0x84),
    ("F22", 0x85),
    ("F23", 0x86),
    ("F24", 0x87),
    ("NUMLOCK", 0x90),
    ("SCROLLLOCK", 0x91),
    ("MUTE", 0xAD),
    ("VOLUMEDOWN", 0xAE),
    ("VOLUMEUP", 0xAF),
    ("NEXTSONG", 0xB0),
    ("PREVIOUSSONG", 0xB1),
    ("STOPCD", 0xB2),
    ("PLAYPAUSE", 0xB3),
    ("SEMICOLON", 0xBA),
    ("EQUAL", 0xBB),
    ("COMMA", 0xBC),
    ("MINUS", 0xBD),
    ("DOT", 0xBE),
    ("SLASH", 0xBF),
    ("GRAVE", 0xC0),
    ("LEFTBRACE", 0xDB),
    ("BACKSLASH", 0xDC),
    ("RIGHTBRACE", 0xDD),
    ("APOSTROPHE", 0xDE),
];

pub static KEYMAP: Keymap = Keymap {
    name: "win32",
    keys: KEYS,
    key_offset: 0,
    modifiers: MODIFIERS,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::HotKeyCode;

    #[test]
    fn test_letters_are_ascii() {
        assert_eq!(KEYMAP.key("a").unwrap(), u32::from(b'A'));
        assert_eq!(KEYMAP.key("Z").unwrap(), u32::from(b'Z'));
        assert_eq!(KEYMAP.key("7").unwrap(), u32::from(b'7'));
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(
            KEYMAP.translate("Ctrl+Shift+F6").unwrap(),
            HotKeyCode::new(mask::CONTROL | mask::SHIFT, 0x75)
        );
        assert_eq!(KEYMAP.key("F24").unwrap(), 0x87);
    }
}
