//! Controller-to-keystroke translation
//!
//! [`InputTranslator`] samples the complete button snapshot once per tick.
//! Chords are matched against the snapshot, so two buttons pressed in the
//! same tick (or within the grace window) fire the chord exactly once and
//! neither single-button action. Output is either a key for the local line
//! editor, raw bytes for the child, or an action for the mode controller.

use crate::config::InputConfig;
use crate::core::term::TerminalModes;
use crate::history::CommandHistory;

use super::buttons::{Button, ButtonSet};
use super::encode::{KeyEncoder, KeyPress};
use super::keyboard::Keyboard;
use super::keymap::{Action, Binding, Context, KeyMap};

/// What one tick of input produced
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Output {
    /// Key for the shell line buffer or the editor
    Edit(KeyPress),
    /// Bytes to forward to the child
    Bytes(Vec<u8>),
    /// Replace the whole input line (history recall)
    ReplaceLine(String),
    /// Handled by the mode controller
    Action(Action),
}

/// One sampled tick
#[derive(Clone, Copy, Debug)]
pub struct Tick<'a> {
    pub context: Context,
    pub held: ButtonSet,
    pub now_ms: u64,
    pub modes: &'a TerminalModes,
}

#[derive(Clone, Copy, Debug)]
struct Repeat {
    buttons: ButtonSet,
    action: Action,
    started_ms: u64,
    last_ms: u64,
}

/// Input translation state machine
pub struct InputTranslator {
    keymap: KeyMap,
    timing: InputConfig,
    keyboard: Keyboard,
    context: Option<Context>,
    tick: u64,
    prev: ButtonSet,
    /// Buttons whose press already produced something; ignored until released
    consumed: ButtonSet,
    /// Chord members waiting for a partner, with the tick they went down
    pending: Vec<(Button, u64)>,
    repeat: Option<Repeat>,
}

impl InputTranslator {
    pub fn new(keymap: KeyMap, timing: InputConfig) -> Self {
        Self {
            keymap,
            timing,
            keyboard: Keyboard::new(),
            context: None,
            tick: 0,
            prev: ButtonSet::empty(),
            consumed: ButtonSet::empty(),
            pending: Vec::new(),
            repeat: None,
        }
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut Keyboard {
        &mut self.keyboard
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    /// Buttons held at the last tick
    pub fn held(&self) -> ButtonSet {
        self.prev
    }

    /// Process one snapshot
    pub fn update(&mut self, tick: Tick<'_>, history: &mut CommandHistory) -> Vec<Output> {
        self.tick += 1;
        let held = tick.held;

        // Buttons still down from another context must not fire here
        if self.context != Some(tick.context) {
            if self.context.is_some() {
                self.consumed |= self.prev;
            }
            self.pending.clear();
            self.repeat = None;
            self.context = Some(tick.context);
        }

        let pressed = held.difference(self.prev);
        self.consumed &= held;
        self.prev = held;

        let mut fired: Vec<(ButtonSet, Action)> = Vec::new();
        self.repeat_tick(held, tick.now_ms, &mut fired);
        self.match_chords(tick.context, held, pressed, &mut fired);
        self.resolve_pending(tick.context, held, &mut fired);
        self.press_singles(tick.context, pressed, &mut fired);

        let mut out = Vec::new();
        for (buttons, action) in fired {
            if action.repeats() && !buttons.is_empty() {
                self.repeat = Some(Repeat {
                    buttons,
                    action,
                    started_ms: tick.now_ms,
                    last_ms: tick.now_ms,
                });
            }
            self.apply(action, tick, history, &mut out);
        }
        out
    }

    /// Chords fire when every member is held and at least one member is
    /// new this tick or still inside its grace window.
    fn match_chords(
        &mut self,
        context: Context,
        held: ButtonSet,
        pressed: ButtonSet,
        fired: &mut Vec<(ButtonSet, Action)>,
    ) {
        let mut fresh = pressed.difference(self.consumed) | self.pending_set();
        if fresh.is_empty() {
            return;
        }

        let mut chords: Vec<Binding> = self
            .keymap
            .bindings(context, self.keyboard.layer())
            .iter()
            .filter(|b| b.is_chord())
            .copied()
            .collect();
        chords.sort_by_key(|b| std::cmp::Reverse(b.buttons.bits().count_ones()));

        for chord in chords {
            if held.contains(chord.buttons) && chord.buttons.intersects(fresh) {
                tracing::trace!("Chord {} -> {}", chord.buttons.label(), chord.action);
                fresh.remove(chord.buttons);
                self.consumed |= chord.buttons;
                self.pending.retain(|(b, _)| !chord.buttons.contains(b.flag()));
                fired.push((chord.buttons, chord.action));
            }
        }
    }

    /// Pending buttons fire their single action on release. Repeating
    /// actions also fire once the grace window runs out; the rest wait for
    /// release so a slow chord never triggers its members.
    fn resolve_pending(
        &mut self,
        context: Context,
        held: ButtonSet,
        fired: &mut Vec<(ButtonSet, Action)>,
    ) {
        let grace = u64::from(self.timing.combo_grace_ticks);
        let now = self.tick;
        let layer = self.keyboard.layer();
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for (button, since) in std::mem::take(&mut self.pending) {
            let released = !held.contains(button.flag());
            let action = self.keymap.lookup(context, layer, button.flag());
            if released {
                // A tap has nothing left to repeat
                if let Some(action) = action {
                    fired.push((ButtonSet::empty(), action));
                }
            } else if now.saturating_sub(since) < grace {
                still_pending.push((button, since));
            } else {
                match action {
                    Some(action) if action.repeats() => {
                        self.consumed |= button.flag();
                        fired.push((button.flag(), action));
                    }
                    Some(_) => still_pending.push((button, since)),
                    None => self.consumed |= button.flag(),
                }
            }
        }
        self.pending = still_pending;
    }

    fn press_singles(
        &mut self,
        context: Context,
        pressed: ButtonSet,
        fired: &mut Vec<(ButtonSet, Action)>,
    ) {
        let layer = self.keyboard.layer();
        let grace = self.timing.combo_grace_ticks;
        for button in pressed.difference(self.consumed).buttons() {
            let flag = button.flag();
            if grace > 0 && self.keymap.in_chord(context, layer, flag) {
                self.pending.push((button, self.tick));
                continue;
            }
            self.consumed |= flag;
            if let Some(action) = self.keymap.lookup(context, layer, flag) {
                fired.push((flag, action));
            }
        }
    }

    fn repeat_tick(&mut self, held: ButtonSet, now_ms: u64, fired: &mut Vec<(ButtonSet, Action)>) {
        let Some(mut repeat) = self.repeat else {
            return;
        };
        if !held.contains(repeat.buttons) {
            self.repeat = None;
            return;
        }

        let elapsed = now_ms.saturating_sub(repeat.started_ms);
        if elapsed < self.timing.repeat_delay_ms {
            return;
        }
        let start = self.timing.repeat_rate_start_ms;
        let min = self.timing.repeat_rate_min_ms.min(start);
        let accel = self.timing.repeat_accel_ms.max(1);
        let progress = (elapsed - self.timing.repeat_delay_ms).min(accel);
        let interval = start - (start - min) * progress / accel;

        if now_ms.saturating_sub(repeat.last_ms) >= interval {
            repeat.last_ms = now_ms;
            // Fired with an empty button set so it does not restart the timer
            fired.push((ButtonSet::empty(), repeat.action));
        }
        self.repeat = Some(repeat);
    }

    fn pending_set(&self) -> ButtonSet {
        self.pending
            .iter()
            .fold(ButtonSet::empty(), |set, (b, _)| set | b.flag())
    }

    fn apply(&mut self, action: Action, tick: Tick<'_>, history: &mut CommandHistory, out: &mut Vec<Output>) {
        match action {
            Action::PressKey => {
                if tick.context.uses_keyboard() {
                    if let Some(press) = self.keyboard.press() {
                        out.push(Self::key_output(press, tick));
                    }
                }
            }
            Action::Key(key) => out.push(Self::key_output(KeyPress::new(key), tick)),
            Action::Ctrl(ch) => out.push(Self::key_output(KeyPress::ctrl(ch), tick)),
            Action::Keyboard(dir) => self.keyboard.move_cursor(dir),
            Action::ShiftLock => self.keyboard.toggle_shift(),
            Action::Symbols => self.keyboard.toggle_symbols(),
            Action::HistoryPrev => {
                if let Some(line) = history.previous() {
                    out.push(Output::ReplaceLine(line));
                }
            }
            Action::HistoryNext => {
                if let Some(line) = history.next() {
                    out.push(Output::ReplaceLine(line));
                }
            }
            other => out.push(Output::Action(other)),
        }
    }

    fn key_output(press: KeyPress, tick: Tick<'_>) -> Output {
        if tick.context == Context::Pty {
            Output::Bytes(KeyEncoder::encode(press, tick.modes))
        } else {
            Output::Edit(press)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::encode::Key;
    use crate::input::{Direction, Layer};

    struct Harness {
        translator: InputTranslator,
        history: CommandHistory,
        modes: TerminalModes,
        now_ms: u64,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                translator: InputTranslator::new(KeyMap::default(), InputConfig::default()),
                history: CommandHistory::new(100),
                modes: TerminalModes::default(),
                now_ms: 0,
            }
        }

        /// Advance one ~16ms frame with `held` down
        fn tick(&mut self, context: Context, held: ButtonSet) -> Vec<Output> {
            self.now_ms += 16;
            let tick = Tick {
                context,
                held,
                now_ms: self.now_ms,
                modes: &self.modes,
            };
            self.translator.update(tick, &mut self.history)
        }

        fn ticks(&mut self, context: Context, held: ButtonSet, n: usize) -> Vec<Output> {
            (0..n).flat_map(|_| self.tick(context, held)).collect()
        }
    }

    #[test]
    fn test_simultaneous_chord_sends_ctrl_c_once() {
        let mut h = Harness::new();
        let mut out = h.tick(Context::Pty, ButtonSet::L2 | ButtonSet::R2);
        out.extend(h.ticks(Context::Pty, ButtonSet::L2 | ButtonSet::R2, 30));
        out.extend(h.ticks(Context::Pty, ButtonSet::empty(), 5));
        assert_eq!(out, vec![Output::Bytes(vec![0x03])]);
    }

    #[test]
    fn test_staggered_chord_within_grace_window() {
        let mut h = Harness::new();
        let mut out = h.tick(Context::Pty, ButtonSet::L2);
        out.extend(h.tick(Context::Pty, ButtonSet::L2 | ButtonSet::R2));
        out.extend(h.ticks(Context::Pty, ButtonSet::R2, 3));
        out.extend(h.ticks(Context::Pty, ButtonSet::empty(), 3));
        assert_eq!(out, vec![Output::Bytes(vec![0x03])]);
    }

    #[test]
    fn test_lone_chord_member_fires_after_grace() {
        let mut h = Harness::new();
        let out = h.ticks(Context::Shell, ButtonSet::L2, 2);
        assert!(out.is_empty());
        let out = h.ticks(Context::Shell, ButtonSet::L2, 2);
        assert_eq!(out, vec![Output::Action(Action::ScrollUp)]);

        // Quick tap fires on release
        let mut h = Harness::new();
        let mut out = h.tick(Context::Shell, ButtonSet::R2);
        out.extend(h.ticks(Context::Shell, ButtonSet::empty(), 4));
        assert_eq!(out, vec![Output::Action(Action::ScrollDown)]);
    }

    #[test]
    fn test_slow_chord_does_not_fire_its_members() {
        let mut h = Harness::new();
        let out = h.ticks(Context::EditorFile, ButtonSet::L1, 10);
        assert!(out.is_empty());
        let mut out = h.ticks(Context::EditorFile, ButtonSet::L1 | ButtonSet::X, 2);
        out.extend(h.ticks(Context::EditorFile, ButtonSet::empty(), 2));
        assert_eq!(out, vec![Output::Action(Action::Copy)]);
        assert_eq!(h.translator.keyboard().layer(), Layer::Normal);

        // Held alone and released, the member still acts
        h.ticks(Context::EditorFile, ButtonSet::L1, 10);
        let out = h.tick(Context::EditorFile, ButtonSet::empty());
        assert!(out.is_empty());
        assert_eq!(h.translator.keyboard().layer(), Layer::Shift);
    }

    #[test]
    fn test_unmapped_buttons_are_ignored() {
        let mut h = Harness::new();
        let out = h.ticks(Context::Menu, ButtonSet::GUIDE | ButtonSet::L1, 10);
        assert!(out.is_empty());
    }

    #[test]
    fn test_keyboard_press_in_shell_and_pty() {
        let mut h = Harness::new();
        h.translator.keyboard_mut().move_cursor(Direction::Down);
        h.translator.keyboard_mut().move_cursor(Direction::Right);

        let out = h.tick(Context::Shell, ButtonSet::A);
        assert_eq!(out, vec![Output::Edit(KeyPress::new(Key::Char('q')))]);
        h.tick(Context::Shell, ButtonSet::empty());

        let out = h.tick(Context::Pty, ButtonSet::A);
        assert_eq!(out, vec![Output::Bytes(b"q".to_vec())]);
        h.tick(Context::Pty, ButtonSet::empty());

        let out = h.tick(Context::Pty, ButtonSet::Y);
        assert_eq!(out, vec![Output::Bytes(vec![0x0D])]);
    }

    #[test]
    fn test_history_chord_recalls_copies() {
        let mut h = Harness::new();
        for cmd in ["ls", "pwd", "echo hi"] {
            h.history.add(cmd);
        }
        let out = h.tick(Context::Shell, ButtonSet::SELECT | ButtonSet::UP);
        assert_eq!(out, vec![Output::ReplaceLine("echo hi".to_string())]);
        h.tick(Context::Shell, ButtonSet::SELECT);
        let out = h.tick(Context::Shell, ButtonSet::SELECT | ButtonSet::UP);
        assert_eq!(out, vec![Output::ReplaceLine("pwd".to_string())]);
        assert_eq!(h.history.entries()[1].command, "pwd");
    }

    #[test]
    fn test_dpad_repeat_accelerates() {
        let mut h = Harness::new();
        // ~2 seconds of holding Right
        let mut fired_at = Vec::new();
        for i in 0..125 {
            let out = h.tick(Context::EditorFile, ButtonSet::RIGHT);
            if !out.is_empty() {
                assert_eq!(out, vec![Output::Edit(KeyPress::new(Key::Right))]);
                fired_at.push(i);
            }
        }
        // First move waits out the chord grace window
        assert_eq!(fired_at[0], 3);
        assert!(fired_at.len() >= 6, "{:?}", fired_at);
        let gaps: Vec<usize> = fired_at.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] > gaps[gaps.len() - 1], "{:?}", gaps);

        let mut h = Harness::new();
        h.ticks(Context::Shell, ButtonSet::RIGHT, 25);
        // Before the repeat delay only the initial move has happened
        assert_eq!(h.translator.keyboard().cursor(), (0, 1));
    }

    #[test]
    fn test_context_switch_swallows_held_buttons() {
        let mut h = Harness::new();
        h.ticks(Context::Shell, ButtonSet::Y, 1);
        let out = h.ticks(Context::Pty, ButtonSet::Y, 5);
        assert!(out.is_empty());
        let out = h.tick(Context::Pty, ButtonSet::empty());
        assert!(out.is_empty());
        let out = h.tick(Context::Pty, ButtonSet::Y);
        assert_eq!(out, vec![Output::Bytes(vec![0x0D])]);
    }
}
