//! Key encoding for PTY input
//!
//! Converts logical key presses to the byte sequences a terminal program
//! expects on its input.

use bitflags::bitflags;

use crate::core::term::TerminalModes;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

/// A logical key, independent of where it came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Tab,
    Esc,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Delete,
    F(u8),
}

impl Key {
    /// Name used in configuration files
    pub fn name(self) -> String {
        match self {
            Key::Char(' ') => "space".to_string(),
            Key::Char(c) => c.to_string(),
            Key::Enter => "enter".to_string(),
            Key::Backspace => "backspace".to_string(),
            Key::Tab => "tab".to_string(),
            Key::Esc => "escape".to_string(),
            Key::Up => "up".to_string(),
            Key::Down => "down".to_string(),
            Key::Left => "left".to_string(),
            Key::Right => "right".to_string(),
            Key::Home => "home".to_string(),
            Key::End => "end".to_string(),
            Key::PageUp => "page_up".to_string(),
            Key::PageDown => "page_down".to_string(),
            Key::Delete => "delete".to_string(),
            Key::F(n) => format!("f{}", n),
        }
    }

    pub fn from_name(name: &str) -> Option<Key> {
        let key = match name {
            "space" => Key::Char(' '),
            "enter" => Key::Enter,
            "backspace" => Key::Backspace,
            "tab" => Key::Tab,
            "escape" | "esc" => Key::Esc,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "home" => Key::Home,
            "end" => Key::End,
            "page_up" => Key::PageUp,
            "page_down" => Key::PageDown,
            "delete" => Key::Delete,
            _ => {
                if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=12).contains(&n) {
                        return Some(Key::F(n));
                    }
                }
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }
}

/// A key together with the modifiers latched when it was pressed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub mods: Modifiers,
}

impl KeyPress {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            mods: Modifiers::empty(),
        }
    }

    pub fn with_mods(key: Key, mods: Modifiers) -> Self {
        Self { key, mods }
    }

    pub fn ctrl(ch: char) -> Self {
        Self::with_mods(Key::Char(ch), Modifiers::CTRL)
    }
}

/// Encodes key presses for a child process
pub struct KeyEncoder;

impl KeyEncoder {
    /// Bytes for `press` given the child's current terminal modes
    pub fn encode(press: KeyPress, modes: &TerminalModes) -> Vec<u8> {
        let mods = press.mods;

        match press.key {
            Key::Char(ch) => Self::map_char(ch, mods),

            Key::Enter => {
                if modes.linefeed_newline {
                    vec![0x0D, 0x0A]
                } else {
                    vec![0x0D]
                }
            }

            Key::Backspace => {
                if mods.contains(Modifiers::ALT) {
                    vec![0x1B, 0x7F]
                } else {
                    vec![0x7F]
                }
            }

            Key::Tab => {
                if mods.contains(Modifiers::SHIFT) {
                    b"\x1b[Z".to_vec()
                } else {
                    vec![0x09]
                }
            }

            Key::Esc => vec![0x1B],

            Key::Up => Self::arrow_key(b'A', mods, modes),
            Key::Down => Self::arrow_key(b'B', mods, modes),
            Key::Right => Self::arrow_key(b'C', mods, modes),
            Key::Left => Self::arrow_key(b'D', mods, modes),

            Key::Home => Self::special_key(b'H', mods),
            Key::End => Self::special_key(b'F', mods),
            Key::PageUp => Self::tilde_key(5, mods),
            Key::PageDown => Self::tilde_key(6, mods),
            Key::Delete => Self::tilde_key(3, mods),

            Key::F(n) => Self::function_key(n, mods),
        }
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        // Ctrl + letter = control character
        if mods.contains(Modifiers::CTRL) {
            let ctrl_code = if ch.is_ascii_alphabetic() {
                Some((ch.to_ascii_lowercase() as u8) - b'a' + 1)
            } else {
                match ch {
                    '@' | '`' | ' ' | '2' => Some(0x00),
                    '[' | '3' => Some(0x1B),
                    '\\' | '4' => Some(0x1C),
                    ']' | '5' => Some(0x1D),
                    '^' | '~' | '6' => Some(0x1E),
                    '_' | '?' | '/' | '7' => Some(0x1F),
                    _ => None,
                }
            };
            if let Some(code) = ctrl_code {
                return if mods.contains(Modifiers::ALT) {
                    vec![0x1B, code]
                } else {
                    vec![code]
                };
            }
        }

        // Alt + key = ESC + key
        let mut bytes = Vec::with_capacity(5);
        if mods.contains(Modifiers::ALT) {
            bytes.push(0x1B);
        }
        let mut utf8 = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
        bytes
    }

    /// Arrow key sequence
    fn arrow_key(key: u8, mods: Modifiers, modes: &TerminalModes) -> Vec<u8> {
        if !mods.is_empty() {
            // With modifiers: ESC [ 1 ; <mod> <key>
            let mod_code = Self::modifier_code(mods);
            format!("\x1b[1;{}{}", mod_code, key as char).into_bytes()
        } else if modes.application_cursor {
            // Application mode: ESC O <key>
            vec![0x1B, b'O', key]
        } else {
            vec![0x1B, b'[', key]
        }
    }

    /// Home/End sequence
    fn special_key(key: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            vec![0x1B, b'[', key]
        } else {
            let mod_code = Self::modifier_code(mods);
            format!("\x1b[1;{}{}", mod_code, key as char).into_bytes()
        }
    }

    /// Tilde key sequence (PageUp, PageDown, Delete)
    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            let mod_code = Self::modifier_code(mods);
            format!("\x1b[{};{}~", code, mod_code).into_bytes()
        }
    }

    fn function_key(n: u8, mods: Modifiers) -> Vec<u8> {
        // F1-F4 use SS3 final bytes, the rest use numbered tilde codes
        let tilde = match n {
            1..=4 => None,
            5 => Some(15),
            6 => Some(17),
            7 => Some(18),
            8 => Some(19),
            9 => Some(20),
            10 => Some(21),
            11 => Some(23),
            12 => Some(24),
            _ => return Vec::new(),
        };

        match tilde {
            Some(code) => Self::tilde_key(code, mods),
            None => {
                let key = b'P' + (n - 1);
                if mods.is_empty() {
                    vec![0x1B, b'O', key]
                } else {
                    let mod_code = Self::modifier_code(mods);
                    format!("\x1b[1;{}{}", mod_code, key as char).into_bytes()
                }
            }
        }
    }

    /// Calculate xterm modifier code
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(key: Key, mods: Modifiers) -> Vec<u8> {
        KeyEncoder::encode(KeyPress::with_mods(key, mods), &TerminalModes::default())
    }

    #[test]
    fn test_char_keys() {
        assert_eq!(encode(Key::Char('a'), Modifiers::empty()), b"a".to_vec());
        assert_eq!(encode(Key::Char('c'), Modifiers::CTRL), vec![0x03]);
        assert_eq!(encode(Key::Char('X'), Modifiers::CTRL), vec![0x18]);
        assert_eq!(encode(Key::Char('x'), Modifiers::ALT), vec![0x1B, b'x']);
        assert_eq!(encode(Key::Char('d'), Modifiers::CTRL | Modifiers::ALT), vec![0x1B, 0x04]);
        assert_eq!(encode(Key::Char('€'), Modifiers::empty()), "€".as_bytes().to_vec());
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(encode(Key::Up, Modifiers::empty()), b"\x1b[A".to_vec());
        assert_eq!(encode(Key::Up, Modifiers::CTRL), b"\x1b[1;5A".to_vec());

        let modes = TerminalModes {
            application_cursor: true,
            ..TerminalModes::default()
        };
        assert_eq!(
            KeyEncoder::encode(KeyPress::new(Key::Left), &modes),
            b"\x1bOD".to_vec()
        );
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(encode(Key::F(1), Modifiers::empty()), b"\x1bOP".to_vec());
        assert_eq!(encode(Key::F(5), Modifiers::empty()), b"\x1b[15~".to_vec());
        assert_eq!(encode(Key::F(12), Modifiers::empty()), b"\x1b[24~".to_vec());
        assert_eq!(encode(Key::F(2), Modifiers::SHIFT), b"\x1b[1;2Q".to_vec());
    }

    #[test]
    fn test_editing_keys() {
        assert_eq!(encode(Key::Backspace, Modifiers::empty()), vec![0x7F]);
        assert_eq!(encode(Key::Enter, Modifiers::empty()), vec![0x0D]);
        assert_eq!(encode(Key::Delete, Modifiers::empty()), b"\x1b[3~".to_vec());
        assert_eq!(encode(Key::Tab, Modifiers::SHIFT), b"\x1b[Z".to_vec());
    }

    #[test]
    fn test_key_names() {
        for key in [Key::Char(' '), Key::Enter, Key::PageDown, Key::F(11), Key::Char('q')] {
            assert_eq!(Key::from_name(&key.name()), Some(key));
        }
        assert_eq!(Key::from_name("f13"), None);
        assert_eq!(Key::from_name("bogus"), None);
    }
}
