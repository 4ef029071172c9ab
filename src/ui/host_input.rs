//! Host keyboard as a controller
//!
//! Maps desktop keys onto logical buttons so the engine can be driven
//! without a gamepad. Most terminals only report key presses, so a press
//! is held for a short while and released automatically; terminals that
//! support the keyboard enhancement protocol report real releases.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::input::{Button, ButtonMap, ButtonSet, ControllerEvent, ControllerState};

/// How long a press without a release event counts as held
pub const SYNTH_HOLD_MS: u64 = 120;

/// Events the main loop handles itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostEvent {
    /// Host window resized to (cols, rows)
    Resize(u16, u16),
    /// Ctrl+Q on the host keyboard
    Quit,
}

/// Desktop key for each button
pub fn map_key(code: KeyCode) -> Option<Button> {
    let button = match code {
        KeyCode::Up => Button::Up,
        KeyCode::Down => Button::Down,
        KeyCode::Left => Button::Left,
        KeyCode::Right => Button::Right,
        KeyCode::Char('z') => Button::A,
        KeyCode::Char('x') => Button::B,
        KeyCode::Char('a') => Button::X,
        KeyCode::Char('s') => Button::Y,
        KeyCode::Char('q') => Button::L1,
        KeyCode::Char('w') => Button::R1,
        KeyCode::Char('1') => Button::L2,
        KeyCode::Char('2') => Button::R2,
        KeyCode::Enter => Button::Start,
        KeyCode::Backspace => Button::Select,
        KeyCode::Tab => Button::Guide,
        _ => return None,
    };
    Some(button)
}

pub struct HostInput {
    state: ControllerState,
    /// Release events are reported by the host
    precise: bool,
    /// Synthesized holds and their release deadlines
    holds: Vec<(Button, u64)>,
}

impl HostInput {
    pub fn new(map: ButtonMap, axis_threshold: i16, precise: bool) -> Self {
        Self {
            state: ControllerState::new(map, axis_threshold),
            precise,
            holds: Vec::new(),
        }
    }

    /// Drain pending host events without blocking
    pub fn poll(&mut self, now_ms: u64) -> io::Result<Vec<HostEvent>> {
        let mut out = Vec::new();
        while event::poll(Duration::ZERO)? {
            if let Some(host) = self.handle(event::read()?, now_ms) {
                out.push(host);
            }
        }
        Ok(out)
    }

    pub fn handle(&mut self, event: Event, now_ms: u64) -> Option<HostEvent> {
        match event {
            Event::Key(key) => self.handle_key(key, now_ms),
            Event::Resize(cols, rows) => Some(HostEvent::Resize(cols, rows)),
            Event::FocusLost => {
                self.state.release_all();
                self.holds.clear();
                None
            }
            _ => None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent, now_ms: u64) -> Option<HostEvent> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('q') {
            return Some(HostEvent::Quit);
        }
        let code = match key.code {
            KeyCode::Char(c) => KeyCode::Char(c.to_ascii_lowercase()),
            other => other,
        };
        let button = map_key(code)?;
        let pressed = key.kind != KeyEventKind::Release;
        self.state.apply(ControllerEvent::Button { button, pressed });

        if !self.precise && pressed {
            let until = now_ms + SYNTH_HOLD_MS;
            match self.holds.iter_mut().find(|(b, _)| *b == button) {
                Some(hold) => hold.1 = until,
                None => self.holds.push((button, until)),
            }
        }
        None
    }

    /// Buttons held at `now_ms`, releasing synthesized holds that ran out
    pub fn snapshot(&mut self, now_ms: u64) -> ButtonSet {
        let state = &mut self.state;
        self.holds.retain(|&(button, until)| {
            let keep = now_ms < until;
            if !keep {
                state.apply(ControllerEvent::Button { button, pressed: false });
            }
            keep
        });
        self.state.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, kind: KeyEventKind) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        })
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key(KeyCode::Char('z')), Some(Button::A));
        assert_eq!(map_key(KeyCode::Char('2')), Some(Button::R2));
        assert_eq!(map_key(KeyCode::Enter), Some(Button::Start));
        assert_eq!(map_key(KeyCode::Backspace), Some(Button::Select));
        assert_eq!(map_key(KeyCode::Char('m')), None);
    }

    #[test]
    fn test_synthesized_hold_expires() {
        let mut input = HostInput::new(ButtonMap::default(), 16384, false);
        input.handle(key(KeyCode::Char('1'), KeyEventKind::Press), 0);
        input.handle(key(KeyCode::Char('2'), KeyEventKind::Press), 5);
        assert_eq!(input.snapshot(10), ButtonSet::L2 | ButtonSet::R2);
        assert_eq!(input.snapshot(SYNTH_HOLD_MS + 1), ButtonSet::R2);
        assert_eq!(input.snapshot(SYNTH_HOLD_MS + 10), ButtonSet::empty());
    }

    #[test]
    fn test_repeat_extends_hold() {
        let mut input = HostInput::new(ButtonMap::default(), 16384, false);
        input.handle(key(KeyCode::Up, KeyEventKind::Press), 0);
        input.handle(key(KeyCode::Up, KeyEventKind::Press), 100);
        assert_eq!(input.snapshot(150), ButtonSet::UP);
    }

    #[test]
    fn test_precise_mode_waits_for_release() {
        let mut input = HostInput::new(ButtonMap::default(), 16384, true);
        input.handle(key(KeyCode::Char('Z'), KeyEventKind::Press), 0);
        assert_eq!(input.snapshot(10_000), ButtonSet::A);
        input.handle(key(KeyCode::Char('z'), KeyEventKind::Release), 10_001);
        assert_eq!(input.snapshot(10_002), ButtonSet::empty());
    }

    #[test]
    fn test_host_events() {
        let mut input = HostInput::new(ButtonMap::default(), 16384, false);
        assert_eq!(input.handle(Event::Resize(80, 24), 0), Some(HostEvent::Resize(80, 24)));
        let quit = Event::Key(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL));
        assert_eq!(input.handle(quit, 0), Some(HostEvent::Quit));
        assert_eq!(input.snapshot(1), ButtonSet::empty());
    }
}
