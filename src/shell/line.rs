//! Single-line input buffer for Shell mode

use unicode_width::UnicodeWidthChar;

use crate::input::{Key, KeyPress, Modifiers};

/// What a key did to the line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
    None,
    /// Enter: the submitted line; the buffer is left empty
    Submit(String),
    /// Ctrl+C
    Interrupt,
    /// Ctrl+L
    ClearScreen,
    /// Tab
    Complete,
    /// Input refused at `max_len`
    Full,
}

/// Editable line with a character cursor
#[derive(Clone, Debug)]
pub struct LineBuffer {
    chars: Vec<char>,
    cursor: usize,
    max_len: usize,
}

impl LineBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            chars: Vec::new(),
            cursor: 0,
            max_len: max_len.max(1),
        }
    }

    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Cursor as a character index
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Column of the cursor in terminal cells
    pub fn cursor_column(&self) -> usize {
        self.chars[..self.cursor]
            .iter()
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }

    /// Replace the whole line, cursor at the end
    pub fn set(&mut self, text: &str) {
        self.chars = text.chars().take(self.max_len).collect();
        self.cursor = self.chars.len();
    }

    /// Replace the line and place the cursor at character `cursor`
    pub fn set_with_cursor(&mut self, text: &str, cursor: usize) {
        self.set(text);
        self.cursor = cursor.min(self.chars.len());
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.cursor = 0;
    }

    pub fn take(&mut self) -> String {
        let text = self.text();
        self.clear();
        text
    }

    /// Insert at the cursor; false when the line is full
    pub fn insert(&mut self, ch: char) -> bool {
        if self.chars.len() >= self.max_len {
            return false;
        }
        self.chars.insert(self.cursor, ch);
        self.cursor += 1;
        true
    }

    pub fn insert_str(&mut self, text: &str) -> bool {
        text.chars().all(|ch| self.insert(ch))
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.chars.remove(self.cursor);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.chars.len() {
            self.chars.remove(self.cursor);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.chars.len());
    }

    /// Apply one key from the translator
    pub fn apply(&mut self, press: KeyPress) -> LineEvent {
        if press.mods.contains(Modifiers::CTRL) {
            if let Key::Char(ch) = press.key {
                return self.apply_ctrl(ch.to_ascii_lowercase());
            }
        }
        match press.key {
            Key::Char(ch) => {
                if !self.insert(ch) {
                    return LineEvent::Full;
                }
            }
            Key::Enter => return LineEvent::Submit(self.take()),
            Key::Backspace => self.backspace(),
            Key::Delete => self.delete(),
            Key::Left => self.move_left(),
            Key::Right => self.move_right(),
            Key::Home => self.cursor = 0,
            Key::End => self.cursor = self.chars.len(),
            Key::Tab => return LineEvent::Complete,
            Key::Esc => self.clear(),
            Key::Up | Key::Down | Key::PageUp | Key::PageDown | Key::F(_) => {}
        }
        LineEvent::None
    }

    fn apply_ctrl(&mut self, ch: char) -> LineEvent {
        match ch {
            'c' => return LineEvent::Interrupt,
            'l' => return LineEvent::ClearScreen,
            'a' => self.cursor = 0,
            'e' => self.cursor = self.chars.len(),
            'u' => {
                self.chars.drain(..self.cursor);
                self.cursor = 0;
            }
            'k' => self.chars.truncate(self.cursor),
            'w' => {
                let mut start = self.cursor;
                while start > 0 && self.chars[start - 1] == ' ' {
                    start -= 1;
                }
                while start > 0 && self.chars[start - 1] != ' ' {
                    start -= 1;
                }
                self.chars.drain(start..self.cursor);
                self.cursor = start;
            }
            _ => {}
        }
        LineEvent::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> LineBuffer {
        let mut line = LineBuffer::new(2500);
        for ch in text.chars() {
            line.apply(KeyPress::new(Key::Char(ch)));
        }
        line
    }

    #[test]
    fn test_insert_in_the_middle() {
        let mut line = typed("ehlo");
        line.apply(KeyPress::new(Key::Home));
        line.apply(KeyPress::new(Key::Right));
        line.apply(KeyPress::new(Key::Char('c')));
        line.apply(KeyPress::new(Key::Char('h')));
        line.apply(KeyPress::new(Key::Delete));
        assert_eq!(line.text(), "echlo");
        assert_eq!(line.cursor(), 3);
    }

    #[test]
    fn test_enter_submits_and_clears() {
        let mut line = typed("ls -la");
        assert_eq!(
            line.apply(KeyPress::new(Key::Enter)),
            LineEvent::Submit("ls -la".to_string())
        );
        assert!(line.is_empty());
    }

    #[test]
    fn test_max_length_refuses_input() {
        let mut line = LineBuffer::new(3);
        assert!(line.insert_str("abc"));
        assert_eq!(line.apply(KeyPress::new(Key::Char('d'))), LineEvent::Full);
        assert_eq!(line.text(), "abc");
        line.set("abcdef");
        assert_eq!(line.text(), "abc");
    }

    #[test]
    fn test_ctrl_keys() {
        let mut line = typed("echo hello world");
        assert_eq!(line.apply(KeyPress::ctrl('w')), LineEvent::None);
        assert_eq!(line.text(), "echo hello ");
        assert_eq!(line.apply(KeyPress::ctrl('c')), LineEvent::Interrupt);
        assert_eq!(line.apply(KeyPress::ctrl('l')), LineEvent::ClearScreen);
        line.apply(KeyPress::ctrl('a'));
        line.apply(KeyPress::new(Key::Right));
        line.apply(KeyPress::ctrl('k'));
        assert_eq!(line.text(), "e");
        assert_eq!(line.apply(KeyPress::new(Key::Tab)), LineEvent::Complete);
    }

    #[test]
    fn test_cursor_column_counts_wide_chars() {
        let line = typed("a日b");
        assert_eq!(line.cursor_column(), 4);
    }
}
