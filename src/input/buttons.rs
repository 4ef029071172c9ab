//! Controller buttons and per-tick button state

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Set of logical buttons, sampled once per tick
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ButtonSet: u16 {
        const A      = 1 << 0;
        const B      = 1 << 1;
        const X      = 1 << 2;
        const Y      = 1 << 3;
        const L1     = 1 << 4;
        const R1     = 1 << 5;
        const L2     = 1 << 6;
        const R2     = 1 << 7;
        const UP     = 1 << 8;
        const DOWN   = 1 << 9;
        const LEFT   = 1 << 10;
        const RIGHT  = 1 << 11;
        const SELECT = 1 << 12;
        const START  = 1 << 13;
        const GUIDE  = 1 << 14;
    }
}

/// A logical controller button
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    A,
    B,
    X,
    Y,
    L1,
    R1,
    L2,
    R2,
    Up,
    Down,
    Left,
    Right,
    Select,
    Start,
    Guide,
}

impl Button {
    pub const ALL: [Button; 15] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::L1,
        Button::R1,
        Button::L2,
        Button::R2,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::Select,
        Button::Start,
        Button::Guide,
    ];

    pub fn flag(self) -> ButtonSet {
        match self {
            Button::A => ButtonSet::A,
            Button::B => ButtonSet::B,
            Button::X => ButtonSet::X,
            Button::Y => ButtonSet::Y,
            Button::L1 => ButtonSet::L1,
            Button::R1 => ButtonSet::R1,
            Button::L2 => ButtonSet::L2,
            Button::R2 => ButtonSet::R2,
            Button::Up => ButtonSet::UP,
            Button::Down => ButtonSet::DOWN,
            Button::Left => ButtonSet::LEFT,
            Button::Right => ButtonSet::RIGHT,
            Button::Select => ButtonSet::SELECT,
            Button::Start => ButtonSet::START,
            Button::Guide => ButtonSet::GUIDE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::L1 => "L1",
            Button::R1 => "R1",
            Button::L2 => "L2",
            Button::R2 => "R2",
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::Left => "LEFT",
            Button::Right => "RIGHT",
            Button::Select => "SELECT",
            Button::Start => "START",
            Button::Guide => "GUIDE",
        }
    }

    /// Parse a button name; D-Pad names accept a `DPAD_` prefix
    pub fn from_name(name: &str) -> Option<Button> {
        let upper = name.trim().to_ascii_uppercase();
        let upper = upper.strip_prefix("DPAD_").unwrap_or(&upper);
        Button::ALL.into_iter().find(|b| b.name() == upper)
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ButtonSet {
    /// Logical buttons in this set, in declaration order
    pub fn buttons(self) -> impl Iterator<Item = Button> {
        Button::ALL.into_iter().filter(move |b| self.contains(b.flag()))
    }

    /// Parse `"L2+R2"` style chord names
    pub fn parse(text: &str) -> Option<ButtonSet> {
        let mut set = ButtonSet::empty();
        for part in text.split('+') {
            set |= Button::from_name(part)?.flag();
        }
        (!set.is_empty()).then_some(set)
    }

    /// `"L2+R2"` style display name
    pub fn label(self) -> String {
        self.buttons().map(Button::name).collect::<Vec<_>>().join("+")
    }
}

impl From<Button> for ButtonSet {
    fn from(button: Button) -> Self {
        button.flag()
    }
}

/// Raw events from a controller backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Raw button index as reported by the device
    Raw { index: u8, pressed: bool },
    /// Already-mapped logical button
    Button { button: Button, pressed: bool },
    /// Analog stick axis: 0 = horizontal, 1 = vertical
    Axis { axis: u8, value: i16 },
}

/// Mapping from raw device button indices to logical buttons
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonMap {
    by_index: HashMap<u8, Button>,
}

impl ButtonMap {
    /// Build from `name -> index` pairs; unknown names are skipped
    pub fn from_indices<'a>(entries: impl IntoIterator<Item = (&'a String, &'a u8)>) -> Self {
        let mut by_index = HashMap::new();
        for (name, index) in entries {
            match Button::from_name(name) {
                Some(button) => {
                    by_index.insert(*index, button);
                }
                None => tracing::warn!("Unknown button name in [buttons]: {}", name),
            }
        }
        Self { by_index }
    }

    pub fn get(&self, index: u8) -> Option<Button> {
        self.by_index.get(&index).copied()
    }
}

impl Default for ButtonMap {
    fn default() -> Self {
        let defaults = default_button_indices();
        Self::from_indices(defaults.iter())
    }
}

/// Default raw indices for a handheld's built-in controller
pub fn default_button_indices() -> BTreeMap<String, u8> {
    [
        ("A", 0),
        ("B", 1),
        ("X", 2),
        ("Y", 3),
        ("L1", 4),
        ("R1", 5),
        ("L2", 6),
        ("R2", 7),
        ("DPAD_UP", 8),
        ("DPAD_DOWN", 9),
        ("DPAD_LEFT", 10),
        ("DPAD_RIGHT", 11),
        ("SELECT", 12),
        ("START", 13),
        ("GUIDE", 16),
    ]
    .into_iter()
    .map(|(name, index)| (name.to_string(), index))
    .collect()
}

/// Held buttons plus stick directions, updated from raw events
#[derive(Clone, Debug, Default)]
pub struct ControllerState {
    map: ButtonMap,
    axis_threshold: i16,
    buttons: ButtonSet,
    stick: ButtonSet,
}

impl ControllerState {
    pub fn new(map: ButtonMap, axis_threshold: i16) -> Self {
        Self {
            map,
            axis_threshold,
            buttons: ButtonSet::empty(),
            stick: ButtonSet::empty(),
        }
    }

    pub fn apply(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Raw { index, pressed } => match self.map.get(index) {
                Some(button) => self.buttons.set(button.flag(), pressed),
                None => tracing::trace!("Unmapped controller button {}", index),
            },
            ControllerEvent::Button { button, pressed } => self.buttons.set(button.flag(), pressed),
            ControllerEvent::Axis { axis, value } => {
                let (neg, pos) = match axis {
                    0 => (ButtonSet::LEFT, ButtonSet::RIGHT),
                    1 => (ButtonSet::UP, ButtonSet::DOWN),
                    _ => return,
                };
                self.stick.remove(neg | pos);
                let threshold = self.axis_threshold.max(1);
                if value <= -threshold {
                    self.stick.insert(neg);
                } else if value >= threshold {
                    self.stick.insert(pos);
                }
            }
        }
    }

    /// Snapshot of everything held right now; stick directions read as D-Pad
    pub fn snapshot(&self) -> ButtonSet {
        self.buttons | self.stick
    }

    pub fn release_all(&mut self) {
        self.buttons = ButtonSet::empty();
        self.stick = ButtonSet::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chord_names() {
        assert_eq!(ButtonSet::parse("L2+R2"), Some(ButtonSet::L2 | ButtonSet::R2));
        assert_eq!(ButtonSet::parse("select+dpad_up"), Some(ButtonSet::SELECT | ButtonSet::UP));
        assert_eq!(ButtonSet::parse("L3"), None);
        assert_eq!((ButtonSet::R2 | ButtonSet::L2).label(), "L2+R2");
    }

    #[test]
    fn test_raw_indices_map_to_buttons() {
        let mut state = ControllerState::new(ButtonMap::default(), 16384);
        state.apply(ControllerEvent::Raw { index: 6, pressed: true });
        state.apply(ControllerEvent::Raw { index: 7, pressed: true });
        state.apply(ControllerEvent::Raw { index: 42, pressed: true });
        assert_eq!(state.snapshot(), ButtonSet::L2 | ButtonSet::R2);

        state.apply(ControllerEvent::Raw { index: 6, pressed: false });
        assert_eq!(state.snapshot(), ButtonSet::R2);
    }

    #[test]
    fn test_stick_reads_as_dpad() {
        let mut state = ControllerState::new(ButtonMap::default(), 16384);
        state.apply(ControllerEvent::Axis { axis: 1, value: -20000 });
        assert_eq!(state.snapshot(), ButtonSet::UP);
        state.apply(ControllerEvent::Axis { axis: 1, value: 1000 });
        assert_eq!(state.snapshot(), ButtonSet::empty());
        state.apply(ControllerEvent::Axis { axis: 0, value: 30000 });
        assert_eq!(state.snapshot(), ButtonSet::RIGHT);
    }
}
