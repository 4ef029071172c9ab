//! On-screen keyboard
//!
//! A fixed grid of keys per layer with a D-Pad driven cursor. Layer
//! switches are sticky; Ctrl and Alt latch for the next emitted key only.

use super::encode::{Key, KeyPress, Modifiers};
use super::Direction;

type Grid = &'static [&'static [&'static str]];

const NORMAL: Grid = &[
    &["Esc", "1", "2", "3", "4", "5", "6", "7", "8", "9", "0", "⌫"],
    &["Tab", "q", "w", "e", "r", "t", "y", "u", "i", "o", "p", "-"],
    &["Ctrl", "a", "s", "d", "f", "g", "h", "j", "k", "l", ";", "="],
    &["⇧", "z", "x", "c", "v", "b", "n", "m", ",", ".", "/", "↵"],
    &["Alt", "␣", "#+="],
];

const SHIFT: Grid = &[
    &["Esc", "!", "@", "#", "$", "%", "^", "&", "*", "(", ")", "⌫"],
    &["Tab", "Q", "W", "E", "R", "T", "Y", "U", "I", "O", "P", "_"],
    &["Ctrl", "A", "S", "D", "F", "G", "H", "J", "K", "L", ":", "+"],
    &["⇧", "Z", "X", "C", "V", "B", "N", "M", "<", ">", "?", "↵"],
    &["Alt", "␣", "#+="],
];

const SYMBOLS: Grid = &[
    &["F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12"],
    &["`", "~", "[", "]", "{", "}", "|", "\\", "(", ")", "\"", "'"],
    &["↑", "←", "↓", "→", "<", ">", "€", "£", "¥", "©", "®", "⌫"],
    &["±", "×", "÷", "§", "•", "…", "°", "™", "¢", "¶", "¬", "↵"],
    &["Alt", "␣", "ABC"],
];

/// Keyboard layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Layer {
    #[default]
    Normal,
    /// Shift-locked
    Shift,
    Symbols,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Normal, Layer::Shift, Layer::Symbols];

    pub fn name(self) -> &'static str {
        match self {
            Layer::Normal => "normal",
            Layer::Shift => "shift",
            Layer::Symbols => "symbols",
        }
    }

    fn grid(self) -> Grid {
        match self {
            Layer::Normal => NORMAL,
            Layer::Shift => SHIFT,
            Layer::Symbols => SYMBOLS,
        }
    }
}

/// Meaning of a key cap
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OskKey {
    Emit(Key),
    Ctrl,
    Alt,
    Shift,
    Symbols,
    Letters,
}

impl OskKey {
    fn from_label(label: &str) -> OskKey {
        match label {
            "Esc" => OskKey::Emit(Key::Esc),
            "Tab" => OskKey::Emit(Key::Tab),
            "⌫" => OskKey::Emit(Key::Backspace),
            "↵" => OskKey::Emit(Key::Enter),
            "␣" => OskKey::Emit(Key::Char(' ')),
            "↑" => OskKey::Emit(Key::Up),
            "↓" => OskKey::Emit(Key::Down),
            "←" => OskKey::Emit(Key::Left),
            "→" => OskKey::Emit(Key::Right),
            "Ctrl" => OskKey::Ctrl,
            "Alt" => OskKey::Alt,
            "⇧" => OskKey::Shift,
            "#+=" => OskKey::Symbols,
            "ABC" => OskKey::Letters,
            _ => {
                if let Some(n) = label.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
                    return OskKey::Emit(Key::F(n));
                }
                debug_assert_eq!(label.chars().count(), 1, "key cap {:?}", label);
                OskKey::Emit(Key::Char(label.chars().next().unwrap_or(' ')))
            }
        }
    }
}

/// Cursor, layer and latched modifiers of the on-screen keyboard
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Keyboard {
    layer: Layer,
    row: usize,
    col: usize,
    ctrl: bool,
    alt: bool,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Cursor as (row, col)
    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Key cap labels of the active layer
    pub fn rows(&self) -> Grid {
        self.layer.grid()
    }

    pub fn label(&self) -> &'static str {
        self.rows()[self.row][self.col]
    }

    pub fn current_key(&self) -> OskKey {
        OskKey::from_label(self.label())
    }

    /// Latched one-shot modifiers
    pub fn modifiers(&self) -> Modifiers {
        let mut mods = Modifiers::empty();
        mods.set(Modifiers::CTRL, self.ctrl);
        mods.set(Modifiers::ALT, self.alt);
        mods
    }

    /// Move the cursor, wrapping at the grid edges
    pub fn move_cursor(&mut self, dir: Direction) {
        let grid = self.rows();
        match dir {
            Direction::Up => {
                self.row = if self.row == 0 { grid.len() - 1 } else { self.row - 1 };
            }
            Direction::Down => {
                self.row = (self.row + 1) % grid.len();
            }
            Direction::Left => {
                let len = grid[self.row].len();
                self.col = if self.col == 0 { len - 1 } else { self.col - 1 };
            }
            Direction::Right => {
                self.col = (self.col + 1) % grid[self.row].len();
            }
        }
        self.clamp();
    }

    /// Toggle shift-lock; from symbols this goes to the shifted letters
    pub fn toggle_shift(&mut self) {
        let next = match self.layer {
            Layer::Shift => Layer::Normal,
            Layer::Normal | Layer::Symbols => Layer::Shift,
        };
        self.set_layer(next);
    }

    /// Toggle the symbols layer; leaving it unlocks shift
    pub fn toggle_symbols(&mut self) {
        let next = match self.layer {
            Layer::Symbols => Layer::Normal,
            Layer::Normal | Layer::Shift => Layer::Symbols,
        };
        self.set_layer(next);
    }

    pub fn set_layer(&mut self, layer: Layer) {
        self.layer = layer;
        self.clamp();
    }

    /// Activate the key under the cursor. Modifier and layer keys update
    /// state and emit nothing.
    pub fn press(&mut self) -> Option<KeyPress> {
        match self.current_key() {
            OskKey::Ctrl => {
                self.ctrl = !self.ctrl;
                None
            }
            OskKey::Alt => {
                self.alt = !self.alt;
                None
            }
            OskKey::Shift => {
                self.toggle_shift();
                None
            }
            OskKey::Symbols => {
                self.set_layer(Layer::Symbols);
                None
            }
            OskKey::Letters => {
                self.set_layer(Layer::Normal);
                None
            }
            OskKey::Emit(key) => Some(self.emit(key)),
        }
    }

    /// Attach and clear the latched modifiers
    pub fn emit(&mut self, key: Key) -> KeyPress {
        let press = KeyPress::with_mods(key, self.modifiers());
        self.ctrl = false;
        self.alt = false;
        press
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn clamp(&mut self) {
        let grid = self.rows();
        self.row = self.row.min(grid.len() - 1);
        self.col = self.col.min(grid[self.row].len() - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_wraps_and_clamps() {
        let mut kb = Keyboard::new();
        kb.move_cursor(Direction::Left);
        assert_eq!(kb.cursor(), (0, 11));
        assert_eq!(kb.label(), "⌫");

        kb.move_cursor(Direction::Up);
        // Bottom row has three keys
        assert_eq!(kb.cursor(), (4, 2));
        assert_eq!(kb.label(), "#+=");

        kb.move_cursor(Direction::Down);
        assert_eq!(kb.cursor(), (0, 2));
        kb.move_cursor(Direction::Right);
        assert_eq!(kb.label(), "3");
    }

    #[test]
    fn test_layers_are_sticky() {
        let mut kb = Keyboard::new();
        kb.move_cursor(Direction::Down);
        kb.move_cursor(Direction::Right);
        assert_eq!(kb.press(), Some(KeyPress::new(Key::Char('q'))));

        kb.toggle_shift();
        assert_eq!(kb.press(), Some(KeyPress::new(Key::Char('Q'))));
        assert_eq!(kb.press(), Some(KeyPress::new(Key::Char('Q'))));
        kb.toggle_shift();
        assert_eq!(kb.press(), Some(KeyPress::new(Key::Char('q'))));

        kb.toggle_symbols();
        assert_eq!(kb.layer(), Layer::Symbols);
        assert_eq!(kb.press(), Some(KeyPress::new(Key::Char('~'))));
        kb.toggle_symbols();
        assert_eq!(kb.layer(), Layer::Normal);
    }

    #[test]
    fn test_ctrl_latches_for_one_key() {
        let mut kb = Keyboard::new();
        kb.move_cursor(Direction::Down);
        kb.move_cursor(Direction::Down);
        assert_eq!(kb.current_key(), OskKey::Ctrl);
        assert_eq!(kb.press(), None);

        kb.move_cursor(Direction::Right);
        assert_eq!(kb.press(), Some(KeyPress::ctrl('a')));
        assert_eq!(kb.press(), Some(KeyPress::new(Key::Char('a'))));
    }

    #[test]
    fn test_every_cap_has_a_meaning() {
        for layer in Layer::ALL {
            for row in layer.grid() {
                for label in row.iter() {
                    match OskKey::from_label(label) {
                        OskKey::Emit(Key::Char(' ')) => assert_eq!(*label, "␣"),
                        OskKey::Emit(Key::Char(ch)) => {
                            assert_eq!(label.chars().collect::<Vec<_>>(), vec![ch], "{}", label)
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    #[test]
    fn test_special_caps() {
        let mut kb = Keyboard::new();
        kb.set_layer(Layer::Symbols);
        assert_eq!(kb.current_key(), OskKey::Emit(Key::F(1)));
        kb.move_cursor(Direction::Up);
        kb.move_cursor(Direction::Right);
        kb.move_cursor(Direction::Right);
        assert_eq!(kb.current_key(), OskKey::Letters);
        kb.press();
        assert_eq!(kb.layer(), Layer::Normal);
    }
}
