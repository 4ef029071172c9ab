//! VT sequence parser
//!
//! Decodes UTF-8 output and ANSI/VT escape sequences and applies them to the
//! terminal state. Every sequence introduced by ESC is consumed up to its
//! final byte (or string terminator) even when it is not recognised. C0
//! controls other than BS, HT, LF, VT, FF, CR and ESC are dropped, and
//! malformed UTF-8 is rendered as U+FFFD.

use super::state::{AttrFlags, Color, TermState};

const REPLACEMENT: char = '\u{FFFD}';
const MAX_STRING_LEN: usize = 4096;

/// Response that needs to be sent back to the PTY
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Operating status report: ESC [ 0 n
    StatusOk,
    /// Device attributes response
    DeviceAttributes,
    /// Secondary device attributes response
    SecondaryDeviceAttributes,
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col).into_bytes(),
            Response::StatusOk => b"\x1b[0n".to_vec(),
            // VT220
            Response::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
        }
    }
}

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
    string_kind: StringKind,
    osc_data: Vec<u8>,
    utf8: Utf8Decoder,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    /// Malformed CSI: swallow bytes until a final byte shows up
    CsiIgnore,
    /// OSC, DCS, SOS, PM or APC body
    String,
    /// ESC seen inside a string, expecting `\`
    StringEscape,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum StringKind {
    Osc,
    Ignored,
}

#[derive(Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

impl Utf8Decoder {
    fn pending(&self) -> bool {
        self.need > 0
    }

    fn reset(&mut self) {
        self.len = 0;
        self.need = 0;
    }
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            string_kind: StringKind::Ignored,
            osc_data: Vec::new(),
            utf8: Utf8Decoder::default(),
        }
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, state: &mut TermState) -> Option<Response> {
        // A multi-byte character cut short by anything but a continuation byte
        if self.utf8.pending() && byte & 0xC0 != 0x80 {
            self.utf8.reset();
            state.put_char(REPLACEMENT);
        }

        let in_string = matches!(self.state, ParserState::String | ParserState::StringEscape);
        if byte < 0x20 && !in_string {
            self.control(byte, state);
            return None;
        }

        match self.state {
            ParserState::Ground => {
                self.ground(byte, state);
                None
            }
            ParserState::Escape => self.escape(byte, state),
            ParserState::EscapeIntermediate => {
                self.escape_intermediate(byte);
                None
            }
            ParserState::CsiEntry => self.csi_entry(byte, state),
            ParserState::CsiParam => self.csi_param(byte, state),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, state),
            ParserState::CsiIgnore => {
                if (0x40..=0x7E).contains(&byte) {
                    self.state = ParserState::Ground;
                }
                None
            }
            ParserState::String => {
                self.string_byte(byte, state);
                None
            }
            ParserState::StringEscape => self.string_escape(byte, state),
        }
    }

    /// Whether the parser is in the middle of a sequence or character
    pub fn is_idle(&self) -> bool {
        self.state == ParserState::Ground && !self.utf8.pending()
    }

    fn control(&mut self, byte: u8, state: &mut TermState) {
        match byte {
            0x1B => self.enter_escape(),
            0x08 => {
                state.active_cursor_mut().clear_wrap_state();
                state.backspace();
            }
            0x09 => {
                state.active_cursor_mut().clear_wrap_state();
                state.horizontal_tab();
            }
            0x0A..=0x0C => {
                state.linefeed();
                if state.modes.linefeed_newline {
                    state.carriage_return();
                }
            }
            0x0D => state.carriage_return(),
            // CAN / SUB abort any sequence in progress
            0x18 | 0x1A => self.state = ParserState::Ground,
            _ => {}
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn ground(&mut self, byte: u8, state: &mut TermState) {
        match byte {
            0x20..=0x7E => state.put_char(byte as char),
            0x7F => {}
            _ => self.utf8_byte(byte, state),
        }
    }

    fn utf8_byte(&mut self, byte: u8, state: &mut TermState) {
        if self.utf8.pending() {
            let d = &mut self.utf8;
            d.buf[d.len] = byte;
            d.len += 1;
            if d.len == d.need {
                let ch = std::str::from_utf8(&d.buf[..d.len])
                    .ok()
                    .and_then(|s| s.chars().next())
                    .unwrap_or(REPLACEMENT);
                d.reset();
                state.put_char(ch);
            }
            return;
        }

        let need = match byte {
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => 0,
        };
        if need == 0 {
            state.put_char(REPLACEMENT);
            return;
        }
        self.utf8.buf[0] = byte;
        self.utf8.len = 1;
        self.utf8.need = need;
    }

    fn escape(&mut self, byte: u8, state: &mut TermState) -> Option<Response> {
        self.state = ParserState::Ground;
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
            }
            b']' => self.enter_string(StringKind::Osc),
            b'P' | b'X' | b'^' | b'_' => self.enter_string(StringKind::Ignored),
            b'7' => state.save_cursor(),
            b'8' => {
                state.active_cursor_mut().clear_wrap_state();
                state.restore_cursor();
            }
            b'D' => {
                state.active_cursor_mut().clear_wrap_state();
                state.index();
            }
            b'E' => {
                state.active_cursor_mut().clear_wrap_state();
                state.carriage_return();
                state.index();
            }
            b'M' => {
                state.active_cursor_mut().clear_wrap_state();
                state.reverse_index();
            }
            b'c' => state.reset(),
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            0x30..=0x7E => {
                tracing::debug!("Unknown ESC sequence: final={:?}", byte as char);
            }
            _ => {
                // Not a valid final byte: drop the ESC and treat the byte as text
                self.ground(byte, state);
            }
        }
        None
    }

    fn escape_intermediate(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            // Charset designations and friends are not modelled
            _ => self.state = ParserState::Ground,
        }
    }

    fn enter_string(&mut self, kind: StringKind) {
        self.state = ParserState::String;
        self.string_kind = kind;
        self.osc_data.clear();
    }

    fn string_byte(&mut self, byte: u8, state: &mut TermState) {
        match byte {
            0x07 => {
                self.finish_string(state);
                self.state = ParserState::Ground;
            }
            0x1B => self.state = ParserState::StringEscape,
            0x18 | 0x1A => self.state = ParserState::Ground,
            _ => {
                if self.string_kind == StringKind::Osc && self.osc_data.len() < MAX_STRING_LEN {
                    self.osc_data.push(byte);
                }
            }
        }
    }

    fn string_escape(&mut self, byte: u8, state: &mut TermState) -> Option<Response> {
        self.finish_string(state);
        if byte == b'\\' {
            self.state = ParserState::Ground;
            return None;
        }
        // Unterminated string followed by a new sequence
        self.enter_escape();
        if byte < 0x20 {
            self.control(byte, state);
            return None;
        }
        self.escape(byte, state)
    }

    fn finish_string(&mut self, state: &mut TermState) {
        if self.string_kind != StringKind::Osc {
            return;
        }
        let data = String::from_utf8_lossy(&self.osc_data);
        if let Some((code, text)) = data.split_once(';') {
            if matches!(code, "0" | "1" | "2") {
                state.title = text.to_string();
            }
        }
    }

    fn csi_entry(&mut self, byte: u8, state: &mut TermState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.params.push(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'<' | b'!' | b'=' => {
                self.intermediates.push(byte);
                self.state = ParserState::CsiParam;
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => return self.execute_csi(byte, state),
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn csi_param(&mut self, byte: u8, state: &mut TermState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Sub-parameters are flattened into the main list
            b';' | b':' => {
                self.params.push(self.current_param.take().unwrap_or(0));
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    self.params.push(p);
                }
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.params.push(p);
                }
                return self.execute_csi(byte, state);
            }
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn csi_intermediate(&mut self, byte: u8, state: &mut TermState) -> Option<Response> {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            0x40..=0x7E => return self.execute_csi(byte, state),
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn execute_csi(&mut self, final_byte: u8, state: &mut TermState) -> Option<Response> {
        self.state = ParserState::Ground;

        let is_private = self.intermediates.contains(&b'?');
        let is_gt = self.intermediates.contains(&b'>');
        let other = self
            .intermediates
            .iter()
            .any(|b| !matches!(b, b'?' | b'>'));
        let params = &self.params;
        let first_or = |default: u16| params.first().copied().filter(|&p| p != 0).unwrap_or(default);

        if final_byte != b'm' {
            state.active_cursor_mut().clear_wrap_state();
        }

        if other {
            tracing::debug!(
                "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                self.intermediates,
                params,
                final_byte as char
            );
            return None;
        }

        match (is_private, is_gt, final_byte) {
            // Cursor movement
            (false, false, b'A') => state.cursor_up(first_or(1)),
            (false, false, b'B') | (false, false, b'e') => state.cursor_down(first_or(1)),
            (false, false, b'C') | (false, false, b'a') => state.cursor_forward(first_or(1)),
            (false, false, b'D') => state.cursor_backward(first_or(1)),
            (false, false, b'E') => {
                // CNL - Cursor Next Line
                state.cursor_down(first_or(1));
                state.carriage_return();
            }
            (false, false, b'F') => {
                // CPL - Cursor Previous Line
                state.cursor_up(first_or(1));
                state.carriage_return();
            }
            (false, false, b'G') | (false, false, b'`') => state.set_column(first_or(1)),
            (false, false, b'H') | (false, false, b'f') => {
                let row = first_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                state.cursor_position(row, col);
            }
            (false, false, b'd') => state.set_row(first_or(1)),

            // Erase
            (false, false, b'J') => state.erase_in_display(params.first().copied().unwrap_or(0)),
            (false, false, b'K') => state.erase_in_line(params.first().copied().unwrap_or(0)),

            // Line and character editing
            (false, false, b'L') => state.insert_lines(first_or(1)),
            (false, false, b'M') => state.delete_lines(first_or(1)),
            (false, false, b'@') => state.insert_chars(first_or(1)),
            (false, false, b'P') => state.delete_chars(first_or(1)),
            (false, false, b'X') => state.erase_chars(first_or(1)),

            // Scroll
            (false, false, b'S') => state.scroll_up(first_or(1)),
            (false, false, b'T') => state.scroll_down(first_or(1)),
            (false, false, b'r') => {
                let top = first_or(1);
                let bottom = params.get(1).copied().filter(|&p| p != 0).unwrap_or(state.rows);
                state.set_scroll_region(top, bottom);
                state.cursor_position(1, 1);
            }

            // SGR - Select Graphic Rendition
            (false, false, b'm') => Self::execute_sgr(params, state),

            (false, false, b's') => state.save_cursor(),
            (false, false, b'u') => state.restore_cursor(),

            // Device Status Report
            (false, false, b'n') => {
                return match params.first() {
                    Some(5) => Some(Response::StatusOk),
                    Some(6) => {
                        let cursor = state.active_cursor();
                        Some(Response::CursorPosition(cursor.row + 1, cursor.col + 1))
                    }
                    _ => None,
                };
            }

            // Device Attributes
            (false, false, b'c') => return Some(Response::DeviceAttributes),
            (false, true, b'c') => return Some(Response::SecondaryDeviceAttributes),

            // Private modes (DEC)
            (true, false, b'h') | (true, false, b'l') => {
                let enable = final_byte == b'h';
                for &p in params {
                    state.set_private_mode(p, enable);
                }
            }

            // Standard modes
            (false, false, b'h') | (false, false, b'l') => {
                let enable = final_byte == b'h';
                for &p in params {
                    match p {
                        4 => state.modes.insert_mode = enable,
                        20 => state.modes.linefeed_newline = enable,
                        _ => {}
                    }
                }
            }

            _ => {
                tracing::debug!(
                    "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                    self.intermediates,
                    params,
                    final_byte as char
                );
            }
        }
        None
    }

    fn execute_sgr(params: &[u16], state: &mut TermState) {
        if params.is_empty() {
            state.current_attrs.reset();
            return;
        }

        let attrs = &mut state.current_attrs;
        let mut iter = params.iter().copied();

        while let Some(param) = iter.next() {
            match param {
                0 => attrs.reset(),
                1 => attrs.flags |= AttrFlags::BOLD,
                2 => attrs.flags |= AttrFlags::DIM,
                3 => attrs.flags |= AttrFlags::ITALIC,
                4 => attrs.flags |= AttrFlags::UNDERLINE,
                5 => attrs.flags |= AttrFlags::BLINK,
                7 => attrs.flags |= AttrFlags::INVERSE,
                8 => attrs.flags |= AttrFlags::HIDDEN,
                9 => attrs.flags |= AttrFlags::STRIKETHROUGH,

                22 => attrs.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
                23 => attrs.flags &= !AttrFlags::ITALIC,
                24 => attrs.flags &= !AttrFlags::UNDERLINE,
                25 => attrs.flags &= !AttrFlags::BLINK,
                27 => attrs.flags &= !AttrFlags::INVERSE,
                28 => attrs.flags &= !AttrFlags::HIDDEN,
                29 => attrs.flags &= !AttrFlags::STRIKETHROUGH,

                30..=37 => attrs.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.fg = color;
                    }
                }
                39 => attrs.fg = Color::Default,

                40..=47 => attrs.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.bg = color;
                    }
                }
                49 => attrs.bg = Color::Default,

                90..=97 => attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => attrs.bg = Color::Indexed((param - 100 + 8) as u8),

                _ => {}
            }
        }
    }

    /// `5;n` (256 colors) or `2;r;g;b` (truecolor)
    fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
        match iter.next()? {
            5 => iter.next().map(|n| Color::Indexed(n as u8)),
            2 => {
                let r = iter.next().unwrap_or(0) as u8;
                let g = iter.next().unwrap_or(0) as u8;
                let b = iter.next().unwrap_or(0) as u8;
                Some(Color::Rgb(r, g, b))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut VtParser, state: &mut TermState, bytes: &[u8]) -> Vec<Response> {
        bytes
            .iter()
            .filter_map(|b| parser.feed(*b, state))
            .collect()
    }

    #[test]
    fn test_cursor_movement() {
        let mut state = TermState::new(24, 80, 100);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[5;10H");

        assert_eq!(state.active_cursor().row, 4);
        assert_eq!(state.active_cursor().col, 9);
    }

    #[test]
    fn test_sgr_colors() {
        let mut state = TermState::new(24, 80, 100);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[1;31;48;5;200m");

        assert_eq!(state.current_attrs.fg, Color::Indexed(1));
        assert_eq!(state.current_attrs.bg, Color::Indexed(200));
        assert!(state.current_attrs.flags.contains(AttrFlags::BOLD));
    }

    #[test]
    fn test_utf8_split_across_feeds() {
        let mut state = TermState::new(4, 20, 100);
        let mut parser = VtParser::new();
        let bytes = "é".as_bytes();

        feed_all(&mut parser, &mut state, &bytes[..1]);
        assert!(!parser.is_idle());
        feed_all(&mut parser, &mut state, &bytes[1..]);

        assert_eq!(state.primary.rows[0].text(), "é");
    }

    #[test]
    fn test_invalid_utf8_renders_replacement() {
        let mut state = TermState::new(4, 20, 100);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"a\xffb\xc3c");

        assert_eq!(state.primary.rows[0].text(), "a\u{FFFD}b\u{FFFD}c");
    }

    #[test]
    fn test_unknown_sequences_are_consumed() {
        let mut state = TermState::new(4, 20, 100);
        let mut parser = VtParser::new();

        feed_all(
            &mut parser,
            &mut state,
            b"a\x1b[>4;2m\x1b[?1337z\x1bP1$r0m\x1b\\\x1b(Bb",
        );

        assert_eq!(state.primary.rows[0].text(), "ab");
        assert!(parser.is_idle());
    }

    #[test]
    fn test_malformed_csi_swallowed_until_final() {
        let mut state = TermState::new(4, 20, 100);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b[12\x80\x81zok");

        assert_eq!(state.primary.rows[0].text(), "ok");
    }

    #[test]
    fn test_osc_title() {
        let mut state = TermState::new(4, 20, 100);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"\x1b]0;vim main.rs\x07x");

        assert_eq!(state.title, "vim main.rs");
        assert_eq!(state.primary.rows[0].text(), "x");
    }

    #[test]
    fn test_cursor_position_report() {
        let mut state = TermState::new(24, 80, 100);
        let mut parser = VtParser::new();

        let responses = feed_all(&mut parser, &mut state, b"\x1b[3;7H\x1b[6n");

        assert_eq!(responses, vec![Response::CursorPosition(3, 7)]);
        assert_eq!(responses[0].to_bytes(), b"\x1b[3;7R".to_vec());
    }

    #[test]
    fn test_erase_line_and_backspace() {
        let mut state = TermState::new(4, 20, 100);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"hello\x08\x08\x1b[K");

        assert_eq!(state.primary.rows[0].text(), "hel");
        assert_eq!(state.active_cursor().col, 3);
    }

    #[test]
    fn test_stray_controls_dropped() {
        let mut state = TermState::new(4, 20, 100);
        let mut parser = VtParser::new();

        feed_all(&mut parser, &mut state, b"a\x00\x07\x0eb\x7fc");

        assert_eq!(state.primary.rows[0].text(), "abc");
    }
}
