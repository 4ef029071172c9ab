//! Controller input.
//!
//! - **buttons**: logical buttons, raw index mapping and the held-button snapshot
//! - **keymap**: per-context layouts mapping buttons and chords to actions
//! - **keyboard**: on-screen keyboard grid, layers and latched modifiers
//! - **translator**: the per-tick state machine turning snapshots into output
//! - **encode**: key presses to the bytes a terminal program reads

pub mod buttons;
pub mod encode;
pub mod keyboard;
pub mod keymap;
pub mod translator;

pub use buttons::{Button, ButtonMap, ButtonSet, ControllerEvent, ControllerState};
pub use encode::{Key, KeyEncoder, KeyPress, Modifiers};
pub use keyboard::{Keyboard, Layer, OskKey};
pub use keymap::{Action, Binding, Context, KeyMap, KeymapOverrides};
pub use translator::{InputTranslator, Output, Tick};

/// D-Pad direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    pub fn from_name(name: &str) -> Option<Direction> {
        match name {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }
}
