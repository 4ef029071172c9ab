//! Button layouts
//!
//! A layout maps a button or chord to an [`Action`] for one input
//! [`Context`]. Lookup is a pure function of context, keyboard layer and
//! the chord, so layouts can be swapped or overridden from config.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::buttons::ButtonSet;
use super::encode::Key;
use super::keyboard::Layer;
use super::Direction;

/// Where input is being routed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Context {
    Shell,
    Pty,
    /// Editor with the D-Pad moving the text cursor
    EditorFile,
    /// Editor with the D-Pad moving the on-screen keyboard cursor
    EditorKeyboard,
    Menu,
}

impl Context {
    pub const ALL: [Context; 5] = [
        Context::Shell,
        Context::Pty,
        Context::EditorFile,
        Context::EditorKeyboard,
        Context::Menu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Context::Shell => "shell",
            Context::Pty => "pty",
            Context::EditorFile => "editor",
            Context::EditorKeyboard => "editor_keyboard",
            Context::Menu => "menu",
        }
    }

    pub fn from_name(name: &str) -> Option<Context> {
        Context::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Whether the on-screen keyboard is usable in this context
    pub fn uses_keyboard(self) -> bool {
        !matches!(self, Context::Menu)
    }
}

/// Logical action bound to a button or chord
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Emit the on-screen key under the keyboard cursor
    PressKey,
    /// Emit a fixed key
    Key(Key),
    /// Emit Ctrl + letter
    Ctrl(char),
    /// Move the on-screen keyboard cursor
    Keyboard(Direction),
    ShiftLock,
    Symbols,
    HistoryPrev,
    HistoryNext,
    Autocomplete,
    ClearScreen,
    ScrollUp,
    ScrollDown,
    OpenMenu,
    Quit,
    /// Move the editor cursor extending the selection
    Select(Direction),
    Indent,
    Copy,
    Cut,
    Paste,
    SelectAll,
    Save,
    ExitEditor,
    ToggleNav,
    MenuMove(Direction),
    MenuActivate,
    MenuClose,
}

impl Action {
    pub fn name(self) -> String {
        let fixed = match self {
            Action::PressKey => "press_key",
            Action::Key(key) => return format!("key:{}", key.name()),
            Action::Ctrl(c) => return format!("ctrl_{}", c),
            Action::Keyboard(dir) => return format!("keyboard_{}", dir.name()),
            Action::ShiftLock => "shift_lock",
            Action::Symbols => "symbols",
            Action::HistoryPrev => "history_prev",
            Action::HistoryNext => "history_next",
            Action::Autocomplete => "autocomplete",
            Action::ClearScreen => "clear_screen",
            Action::ScrollUp => "scroll_up",
            Action::ScrollDown => "scroll_down",
            Action::OpenMenu => "menu",
            Action::Quit => "quit",
            Action::Select(dir) => return format!("select_{}", dir.name()),
            Action::Indent => "indent",
            Action::Copy => "copy",
            Action::Cut => "cut",
            Action::Paste => "paste",
            Action::SelectAll => "select_all",
            Action::Save => "save",
            Action::ExitEditor => "exit_editor",
            Action::ToggleNav => "toggle_nav",
            Action::MenuMove(dir) => return format!("menu_{}", dir.name()),
            Action::MenuActivate => "menu_activate",
            Action::MenuClose => "menu_close",
        };
        fixed.to_string()
    }

    /// Whether holding the binding should auto-repeat the action
    pub fn repeats(self) -> bool {
        matches!(
            self,
            Action::Keyboard(_)
                | Action::Select(_)
                | Action::MenuMove(_)
                | Action::HistoryPrev
                | Action::HistoryNext
                | Action::ScrollUp
                | Action::ScrollDown
                | Action::Key(Key::Up)
                | Action::Key(Key::Down)
                | Action::Key(Key::Left)
                | Action::Key(Key::Right)
                | Action::Key(Key::PageUp)
                | Action::Key(Key::PageDown)
                | Action::Key(Key::Backspace)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(key) = s.strip_prefix("key:") {
            return Key::from_name(key)
                .map(Action::Key)
                .ok_or_else(|| format!("unknown key '{}'", key));
        }
        if let Some(letter) = s.strip_prefix("ctrl_") {
            let mut chars = letter.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => Ok(Action::Ctrl(c.to_ascii_lowercase())),
                _ => Err(format!("invalid control key '{}'", s)),
            };
        }
        for (prefix, build) in [
            ("keyboard_", Action::Keyboard as fn(Direction) -> Action),
            ("select_", Action::Select),
            ("menu_", Action::MenuMove),
        ] {
            if let Some(dir) = s.strip_prefix(prefix).and_then(Direction::from_name) {
                return Ok(build(dir));
            }
        }
        let action = match s {
            "press_key" => Action::PressKey,
            "shift_lock" => Action::ShiftLock,
            "symbols" => Action::Symbols,
            "history_prev" => Action::HistoryPrev,
            "history_next" => Action::HistoryNext,
            "autocomplete" => Action::Autocomplete,
            "clear_screen" => Action::ClearScreen,
            "scroll_up" => Action::ScrollUp,
            "scroll_down" => Action::ScrollDown,
            "menu" => Action::OpenMenu,
            "quit" => Action::Quit,
            "indent" => Action::Indent,
            "copy" => Action::Copy,
            "cut" => Action::Cut,
            "paste" => Action::Paste,
            "select_all" => Action::SelectAll,
            "save" => Action::Save,
            "exit_editor" => Action::ExitEditor,
            "toggle_nav" => Action::ToggleNav,
            "menu_activate" => Action::MenuActivate,
            "menu_close" => Action::MenuClose,
            _ => return Err(format!("unknown action '{}'", s)),
        };
        Ok(action)
    }
}

/// One entry of a layout
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub buttons: ButtonSet,
    pub action: Action,
}

impl Binding {
    pub fn is_chord(&self) -> bool {
        self.buttons.bits().count_ones() > 1
    }
}

/// Per-context override tables: context (optionally `context.layer`) ->
/// chord -> action name, where `"none"` removes a binding
pub type KeymapOverrides = HashMap<String, HashMap<String, String>>;

/// Resolved layouts for every context and keyboard layer
#[derive(Clone, Debug)]
pub struct KeyMap {
    layouts: HashMap<(Context, Layer), Vec<Binding>>,
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::with_overrides(&KeymapOverrides::new())
    }
}

impl KeyMap {
    /// Default layouts with config overrides applied on top. Invalid
    /// entries are logged and skipped.
    pub fn with_overrides(overrides: &KeymapOverrides) -> Self {
        let mut layouts = HashMap::new();
        for context in Context::ALL {
            for layer in Layer::ALL {
                let mut bindings = default_layout(context);
                if let Some(table) = overrides.get(context.name()) {
                    apply_overrides(&mut bindings, context.name(), table);
                }
                let layered = format!("{}.{}", context.name(), layer.name());
                if let Some(table) = overrides.get(&layered) {
                    apply_overrides(&mut bindings, &layered, table);
                }
                layouts.insert((context, layer), bindings);
            }
        }
        for name in overrides.keys() {
            let context = name.split('.').next().unwrap_or_default();
            if Context::from_name(context).is_none() {
                tracing::warn!("Unknown keymap context '{}'", name);
            }
        }
        Self { layouts }
    }

    /// Every binding active in `context` on `layer`
    pub fn bindings(&self, context: Context, layer: Layer) -> &[Binding] {
        self.layouts
            .get(&(context, layer))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Action bound to exactly this button set
    pub fn lookup(&self, context: Context, layer: Layer, buttons: ButtonSet) -> Option<Action> {
        self.bindings(context, layer)
            .iter()
            .find(|b| b.buttons == buttons)
            .map(|b| b.action)
    }

    /// Whether `buttons` is part of some chord in this context
    pub fn in_chord(&self, context: Context, layer: Layer, buttons: ButtonSet) -> bool {
        self.bindings(context, layer)
            .iter()
            .any(|b| b.is_chord() && b.buttons.intersects(buttons))
    }

    /// Human-readable layout, one binding per line
    pub fn help_lines(&self, context: Context) -> Vec<String> {
        let mut lines: Vec<String> = self
            .bindings(context, Layer::Normal)
            .iter()
            .map(|b| format!("  {:<14} {}", b.buttons.label(), b.action))
            .collect();
        lines.sort();
        lines
    }
}

fn apply_overrides(bindings: &mut Vec<Binding>, section: &str, table: &HashMap<String, String>) {
    for (chord, action) in table {
        let Some(buttons) = ButtonSet::parse(chord) else {
            tracing::warn!("[keymap.{}] unknown button chord '{}'", section, chord);
            continue;
        };
        bindings.retain(|b| b.buttons != buttons);
        if action == "none" {
            continue;
        }
        match action.parse::<Action>() {
            Ok(action) => bindings.push(Binding { buttons, action }),
            Err(err) => tracing::warn!("[keymap.{}] {}: {}", section, chord, err),
        }
    }
}

fn default_layout(context: Context) -> Vec<Binding> {
    use Action as A;
    use ButtonSet as S;

    let mut table: Vec<(ButtonSet, Action)> = Vec::new();
    let keyboard_dpad = [
        (S::UP, A::Keyboard(Direction::Up)),
        (S::DOWN, A::Keyboard(Direction::Down)),
        (S::LEFT, A::Keyboard(Direction::Left)),
        (S::RIGHT, A::Keyboard(Direction::Right)),
    ];

    match context {
        Context::Shell => {
            table.extend([
                (S::A, A::PressKey),
                (S::B, A::Key(Key::Backspace)),
                (S::X, A::Key(Key::Char(' '))),
                (S::Y, A::Key(Key::Enter)),
                (S::L1, A::ShiftLock),
                (S::R1, A::Symbols),
                (S::L2, A::ScrollUp),
                (S::R2, A::ScrollDown),
                (S::GUIDE, A::Autocomplete),
                (S::START, A::OpenMenu),
                (S::L2 | S::R2, A::ClearScreen),
                (S::SELECT | S::UP, A::HistoryPrev),
                (S::SELECT | S::DOWN, A::HistoryNext),
                (S::SELECT | S::LEFT, A::Key(Key::Left)),
                (S::SELECT | S::RIGHT, A::Key(Key::Right)),
                (S::START | S::SELECT, A::Quit),
            ]);
            table.extend(keyboard_dpad);
        }
        Context::Pty => {
            table.extend([
                (S::A, A::PressKey),
                (S::B, A::Key(Key::Backspace)),
                (S::X, A::Key(Key::Char(' '))),
                (S::Y, A::Key(Key::Enter)),
                (S::L1, A::ShiftLock),
                (S::R1, A::Symbols),
                (S::L2, A::ScrollUp),
                (S::R2, A::ScrollDown),
                (S::GUIDE, A::Key(Key::Tab)),
                (S::START, A::OpenMenu),
                (S::L2 | S::R2, A::Ctrl('c')),
                (S::L2 | S::L1, A::Ctrl('x')),
                (S::L2 | S::R1, A::Ctrl('d')),
                (S::R2 | S::L1, A::Ctrl('z')),
                (S::R2 | S::R1, A::Key(Key::Tab)),
                (S::SELECT | S::UP, A::Key(Key::Up)),
                (S::SELECT | S::DOWN, A::Key(Key::Down)),
                (S::SELECT | S::LEFT, A::Key(Key::Left)),
                (S::SELECT | S::RIGHT, A::Key(Key::Right)),
                (S::START | S::SELECT, A::Quit),
            ]);
            table.extend(keyboard_dpad);
        }
        Context::EditorFile | Context::EditorKeyboard => {
            table.extend([
                (S::A, A::PressKey),
                (S::B, A::Key(Key::Backspace)),
                (S::X, A::Key(Key::Char(' '))),
                (S::Y, A::Key(Key::Enter)),
                (S::L1, A::ShiftLock),
                (S::R1, A::Symbols),
                (S::GUIDE, A::Indent),
                (S::START, A::ToggleNav),
                (S::SELECT | S::UP, A::Select(Direction::Up)),
                (S::SELECT | S::DOWN, A::Select(Direction::Down)),
                (S::SELECT | S::LEFT, A::Select(Direction::Left)),
                (S::SELECT | S::RIGHT, A::Select(Direction::Right)),
                (S::L2 | S::UP, A::Key(Key::PageUp)),
                (S::L2 | S::DOWN, A::Key(Key::PageDown)),
                (S::R2 | S::LEFT, A::Key(Key::Home)),
                (S::R2 | S::RIGHT, A::Key(Key::End)),
                (S::L1 | S::X, A::Copy),
                (S::L1 | S::Y, A::Cut),
                (S::R1 | S::X, A::Paste),
                (S::R1 | S::B, A::Key(Key::Delete)),
                (S::R1 | S::Y, A::SelectAll),
                (S::L2 | S::A, A::Save),
                (S::L2 | S::B, A::ExitEditor),
            ]);
            if context == Context::EditorFile {
                table.extend([
                    (S::UP, A::Key(Key::Up)),
                    (S::DOWN, A::Key(Key::Down)),
                    (S::LEFT, A::Key(Key::Left)),
                    (S::RIGHT, A::Key(Key::Right)),
                ]);
            } else {
                table.extend(keyboard_dpad);
            }
        }
        Context::Menu => {
            table.extend([
                (S::UP, A::MenuMove(Direction::Up)),
                (S::DOWN, A::MenuMove(Direction::Down)),
                (S::LEFT, A::MenuMove(Direction::Left)),
                (S::RIGHT, A::MenuMove(Direction::Right)),
                (S::A, A::MenuActivate),
                (S::B, A::MenuClose),
                (S::START, A::MenuClose),
            ]);
        }
    }

    table
        .into_iter()
        .map(|(buttons, action)| Binding { buttons, action })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_button_differs_by_context() {
        let map = KeyMap::default();
        assert_eq!(
            map.lookup(Context::Shell, Layer::Normal, ButtonSet::L2 | ButtonSet::R2),
            Some(Action::ClearScreen)
        );
        assert_eq!(
            map.lookup(Context::Pty, Layer::Normal, ButtonSet::L2 | ButtonSet::R2),
            Some(Action::Ctrl('c'))
        );
        assert_eq!(
            map.lookup(Context::Shell, Layer::Normal, ButtonSet::GUIDE),
            Some(Action::Autocomplete)
        );
        assert_eq!(
            map.lookup(Context::Pty, Layer::Normal, ButtonSet::GUIDE),
            Some(Action::Key(Key::Tab))
        );
        assert_eq!(map.lookup(Context::Menu, Layer::Normal, ButtonSet::GUIDE), None);
    }

    #[test]
    fn test_overrides_replace_and_remove() {
        let mut overrides = KeymapOverrides::new();
        overrides.insert(
            "shell".to_string(),
            HashMap::from([
                ("GUIDE".to_string(), "key:tab".to_string()),
                ("L2+R2".to_string(), "none".to_string()),
                ("B".to_string(), "not_an_action".to_string()),
            ]),
        );
        overrides.insert(
            "shell.symbols".to_string(),
            HashMap::from([("X".to_string(), "key:enter".to_string())]),
        );
        let map = KeyMap::with_overrides(&overrides);

        assert_eq!(
            map.lookup(Context::Shell, Layer::Normal, ButtonSet::GUIDE),
            Some(Action::Key(Key::Tab))
        );
        assert_eq!(map.lookup(Context::Shell, Layer::Normal, ButtonSet::L2 | ButtonSet::R2), None);
        // Invalid action drops the binding rather than keeping a stale one
        assert_eq!(map.lookup(Context::Shell, Layer::Normal, ButtonSet::B), None);
        assert_eq!(
            map.lookup(Context::Shell, Layer::Symbols, ButtonSet::X),
            Some(Action::Key(Key::Enter))
        );
        assert_eq!(
            map.lookup(Context::Shell, Layer::Normal, ButtonSet::X),
            Some(Action::Key(Key::Char(' ')))
        );
    }

    #[test]
    fn test_action_names_parse_back() {
        for action in [
            Action::PressKey,
            Action::Key(Key::PageUp),
            Action::Ctrl('z'),
            Action::Keyboard(Direction::Left),
            Action::Select(Direction::Down),
            Action::MenuMove(Direction::Right),
            Action::OpenMenu,
            Action::ExitEditor,
        ] {
            assert_eq!(action.name().parse::<Action>(), Ok(action));
        }
        assert!("ctrl_".parse::<Action>().is_err());
    }

    #[test]
    fn test_chord_membership() {
        let map = KeyMap::default();
        assert!(map.in_chord(Context::Pty, Layer::Normal, ButtonSet::L2));
        assert!(map.in_chord(Context::Shell, Layer::Normal, ButtonSet::UP));
        assert!(!map.in_chord(Context::Shell, Layer::Normal, ButtonSet::A));
        assert!(!map.in_chord(Context::Menu, Layer::Normal, ButtonSet::UP));
    }
}
