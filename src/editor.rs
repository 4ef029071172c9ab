//! Built-in text editor buffer
//!
//! Lines of text with a cursor, an optional selection anchored where
//! selection began, and a dirty flag. Columns count characters. The
//! clipboard is not owned here; copy, cut and paste take it explicitly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::clipboard::Clipboard;
use crate::input::{Direction, Key, KeyPress, Modifiers};

/// Spaces inserted by the indent action
pub const INDENT: &str = "    ";

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Position in the buffer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

#[derive(Clone, Debug)]
pub struct Editor {
    path: PathBuf,
    lines: Vec<String>,
    cursor: Pos,
    /// Column kept across vertical moves through shorter lines
    preferred_col: usize,
    anchor: Option<Pos>,
    /// First visible (line, column)
    scroll: Pos,
    dirty: bool,
}

impl Editor {
    /// Open `path`; a missing file starts empty
    pub fn open(path: &Path) -> Result<Self, EditorError> {
        let text = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(EditorError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self::from_text(path, &text))
    }

    pub fn from_text(path: &Path, text: &str) -> Self {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        if text.ends_with('\n') || lines.is_empty() {
            lines.push(String::new());
        }
        Self {
            path: path.to_path_buf(),
            lines,
            cursor: Pos::default(),
            preferred_col: 0,
            anchor: None,
            scroll: Pos::default(),
            dirty: false,
        }
    }

    pub fn save(&mut self) -> Result<(), EditorError> {
        fs::write(&self.path, self.text()).map_err(|source| EditorError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.dirty = false;
        tracing::info!("Saved {}", self.path.display());
        Ok(())
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn cursor(&self) -> Pos {
        self.cursor
    }

    pub fn scroll(&self) -> Pos {
        self.scroll
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Ordered selection range, if a selection was started
    pub fn selection(&self) -> Option<(Pos, Pos)> {
        let anchor = self.anchor?;
        Some(if anchor <= self.cursor {
            (anchor, self.cursor)
        } else {
            (self.cursor, anchor)
        })
    }

    pub fn has_selection(&self) -> bool {
        matches!(self.selection(), Some((start, end)) if start != end)
    }

    pub fn selected_text(&self) -> String {
        let Some((start, end)) = self.selection() else {
            return String::new();
        };
        if start.line == end.line {
            return char_slice(&self.lines[start.line], start.col, end.col).to_string();
        }
        let mut pieces = vec![char_slice(&self.lines[start.line], start.col, usize::MAX)];
        for line in &self.lines[start.line + 1..end.line] {
            pieces.push(line.as_str());
        }
        pieces.push(char_slice(&self.lines[end.line], 0, end.col));
        pieces.join("\n")
    }

    /// Remove the selected range; false when there is none
    pub fn delete_selection(&mut self) -> bool {
        let Some((start, end)) = self.selection() else {
            return false;
        };
        let head = char_slice(&self.lines[start.line], 0, start.col).to_string();
        let tail = char_slice(&self.lines[end.line], end.col, usize::MAX).to_string();
        self.lines.splice(start.line..=end.line, [head + &tail]);
        self.cursor = start;
        self.preferred_col = start.col;
        self.anchor = None;
        self.dirty = true;
        true
    }

    /// Insert at the cursor, replacing any selection
    pub fn insert_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.has_selection() {
            self.delete_selection();
        }
        self.anchor = None;

        let line = &self.lines[self.cursor.line];
        let head = char_slice(line, 0, self.cursor.col).to_string();
        let tail = char_slice(line, self.cursor.col, usize::MAX).to_string();
        let parts: Vec<&str> = text.split('\n').collect();
        let last = parts.len() - 1;

        let mut new_lines: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
        new_lines[0].insert_str(0, &head);
        new_lines[last].push_str(&tail);
        let count = new_lines.len();
        self.lines.splice(self.cursor.line..=self.cursor.line, new_lines);

        if last == 0 {
            self.cursor.col += parts[0].chars().count();
        } else {
            self.cursor.line += count - 1;
            self.cursor.col = parts[last].chars().count();
        }
        self.preferred_col = self.cursor.col;
        self.dirty = true;
    }

    pub fn newline(&mut self) {
        self.insert_text("\n");
    }

    pub fn indent(&mut self) {
        self.insert_text(INDENT);
    }

    pub fn backspace(&mut self) {
        if self.has_selection() {
            self.delete_selection();
            return;
        }
        self.anchor = None;
        if self.cursor.col > 0 {
            let line = &mut self.lines[self.cursor.line];
            remove_char(line, self.cursor.col - 1);
            self.cursor.col -= 1;
        } else if self.cursor.line > 0 {
            let current = self.lines.remove(self.cursor.line);
            self.cursor.line -= 1;
            let prev = &mut self.lines[self.cursor.line];
            self.cursor.col = prev.chars().count();
            prev.push_str(&current);
        } else {
            return;
        }
        self.preferred_col = self.cursor.col;
        self.dirty = true;
    }

    pub fn delete_forward(&mut self) {
        if self.has_selection() {
            self.delete_selection();
            return;
        }
        self.anchor = None;
        let len = self.lines[self.cursor.line].chars().count();
        if self.cursor.col < len {
            remove_char(&mut self.lines[self.cursor.line], self.cursor.col);
        } else if self.cursor.line + 1 < self.lines.len() {
            let next = self.lines.remove(self.cursor.line + 1);
            self.lines[self.cursor.line].push_str(&next);
        } else {
            return;
        }
        self.dirty = true;
    }

    /// Move by lines and/or columns; `selecting` extends the selection
    pub fn move_cursor(&mut self, delta_line: isize, delta_col: isize, selecting: bool) {
        self.begin_move(selecting);
        if delta_line != 0 {
            self.cursor.line = offset(self.cursor.line, delta_line, self.lines.len() - 1);
            self.cursor.col = self.preferred_col.min(self.line_len());
        }
        if delta_col != 0 {
            self.cursor.col = offset(self.cursor.col, delta_col, self.line_len());
            self.preferred_col = self.cursor.col;
        }
    }

    pub fn move_direction(&mut self, dir: Direction, selecting: bool) {
        match dir {
            Direction::Up => self.move_cursor(-1, 0, selecting),
            Direction::Down => self.move_cursor(1, 0, selecting),
            Direction::Left => self.move_cursor(0, -1, selecting),
            Direction::Right => self.move_cursor(0, 1, selecting),
        }
    }

    pub fn move_home(&mut self, selecting: bool) {
        self.begin_move(selecting);
        self.cursor.col = 0;
        self.preferred_col = 0;
    }

    pub fn move_end(&mut self, selecting: bool) {
        self.begin_move(selecting);
        self.cursor.col = self.line_len();
        self.preferred_col = self.cursor.col;
    }

    pub fn move_page(&mut self, pages: isize, lines_per_page: usize, selecting: bool) {
        let delta = pages.saturating_mul(lines_per_page.max(1) as isize);
        self.begin_move(selecting);
        self.cursor.line = offset(self.cursor.line, delta, self.lines.len() - 1);
        self.cursor.col = self.preferred_col.min(self.line_len());
    }

    pub fn select_all(&mut self) {
        self.anchor = Some(Pos::default());
        self.cursor.line = self.lines.len() - 1;
        self.cursor.col = self.line_len();
        self.preferred_col = self.cursor.col;
    }

    /// Copy the selection; false when nothing is selected
    pub fn copy(&self, clipboard: &mut Clipboard) -> bool {
        if !self.has_selection() {
            return false;
        }
        clipboard.set(self.selected_text());
        true
    }

    pub fn cut(&mut self, clipboard: &mut Clipboard) -> bool {
        if !self.copy(clipboard) {
            return false;
        }
        self.delete_selection()
    }

    pub fn paste(&mut self, clipboard: &Clipboard) -> bool {
        match clipboard.get() {
            Some(text) => {
                self.insert_text(text);
                true
            }
            None => false,
        }
    }

    /// Apply a key from the translator
    pub fn apply(&mut self, press: KeyPress, lines_per_page: usize) {
        let selecting = press.mods.contains(Modifiers::SHIFT);
        match press.key {
            Key::Char(ch) => {
                if !press.mods.intersects(Modifiers::CTRL | Modifiers::ALT) {
                    let mut buf = [0u8; 4];
                    self.insert_text(ch.encode_utf8(&mut buf));
                }
            }
            Key::Enter => self.newline(),
            Key::Tab => self.indent(),
            Key::Backspace => self.backspace(),
            Key::Delete => self.delete_forward(),
            Key::Up => self.move_cursor(-1, 0, selecting),
            Key::Down => self.move_cursor(1, 0, selecting),
            Key::Left => self.move_cursor(0, -1, selecting),
            Key::Right => self.move_cursor(0, 1, selecting),
            Key::Home => self.move_home(selecting),
            Key::End => self.move_end(selecting),
            Key::PageUp => self.move_page(-1, lines_per_page, selecting),
            Key::PageDown => self.move_page(1, lines_per_page, selecting),
            Key::Esc => self.anchor = None,
            Key::F(_) => {}
        }
    }

    /// Scroll so the cursor is inside a `rows`×`cols` window
    pub fn ensure_visible(&mut self, rows: usize, cols: usize) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        if self.cursor.line < self.scroll.line {
            self.scroll.line = self.cursor.line;
        } else if self.cursor.line >= self.scroll.line + rows {
            self.scroll.line = self.cursor.line + 1 - rows;
        }
        if self.cursor.col < self.scroll.col {
            self.scroll.col = self.cursor.col;
        } else if self.cursor.col >= self.scroll.col + cols {
            self.scroll.col = self.cursor.col + 1 - cols;
        }
    }

    fn begin_move(&mut self, selecting: bool) {
        if selecting {
            self.anchor.get_or_insert(self.cursor);
        } else {
            self.anchor = None;
        }
    }

    fn line_len(&self) -> usize {
        self.lines[self.cursor.line].chars().count()
    }
}

fn offset(value: usize, delta: isize, max: usize) -> usize {
    value.saturating_add_signed(delta).min(max)
}

/// Characters `start..end` of `s`, clamped
fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let byte = |n: usize| s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len());
    let (a, b) = (byte(start), byte(end));
    &s[a..b.max(a)]
}

fn remove_char(s: &mut String, index: usize) {
    if let Some((byte, _)) = s.char_indices().nth(index) {
        s.remove(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor(text: &str) -> Editor {
        Editor::from_text(Path::new("/tmp/unused.txt"), text)
    }

    #[test]
    fn test_load_splits_lines() {
        assert_eq!(editor("a\nb\n").lines(), &["a", "b", ""]);
        assert_eq!(editor("a\nb").lines(), &["a", "b"]);
        assert_eq!(editor("").lines(), &[""]);
        assert_eq!(editor("x\r\ny").lines(), &["x", "y"]);
    }

    #[test]
    fn test_insert_and_backspace_join_lines() {
        let mut ed = editor("hello\nworld");
        ed.move_end(false);
        ed.insert_text(" there\nnew");
        assert_eq!(ed.lines(), &["hello there", "new", "world"]);
        assert_eq!(ed.cursor(), Pos::new(1, 3));
        assert!(ed.is_dirty());

        ed.move_cursor(1, 0, false);
        ed.move_home(false);
        ed.backspace();
        assert_eq!(ed.lines(), &["hello there", "newworld"]);
        assert_eq!(ed.cursor(), Pos::new(1, 3));
    }

    #[test]
    fn test_preferred_column_survives_short_lines() {
        let mut ed = editor("long line\nab\nanother long");
        ed.move_cursor(0, 7, false);
        ed.move_cursor(1, 0, false);
        assert_eq!(ed.cursor(), Pos::new(1, 2));
        ed.move_cursor(1, 0, false);
        assert_eq!(ed.cursor(), Pos::new(2, 7));
    }

    #[test]
    fn test_select_copy_paste() {
        let mut clipboard = Clipboard::new(false);
        let mut ed = editor("one two\nthree");
        ed.move_cursor(0, 4, false);
        ed.move_direction(Direction::Down, true);
        assert_eq!(ed.selected_text(), "two\nthre");
        assert!(ed.copy(&mut clipboard));

        ed.move_end(false);
        assert!(!ed.has_selection());
        assert!(ed.paste(&clipboard));
        assert_eq!(ed.lines(), &["one two", "threetwo", "thre"]);
        assert_eq!(ed.cursor(), Pos::new(2, 4));
    }

    #[test]
    fn test_cut_and_select_all() {
        let mut clipboard = Clipboard::new(false);
        let mut ed = editor("abc\ndef");
        assert!(!ed.cut(&mut clipboard));
        ed.select_all();
        assert_eq!(ed.selected_text(), "abc\ndef");
        assert!(ed.cut(&mut clipboard));
        assert_eq!(ed.lines(), &[""]);
        assert_eq!(clipboard.get(), Some("abc\ndef"));
    }

    #[test]
    fn test_typing_replaces_selection_backwards() {
        let mut ed = editor("hello");
        ed.move_end(false);
        ed.move_cursor(0, -2, true);
        ed.apply(KeyPress::new(Key::Char('p')), 10);
        assert_eq!(ed.lines(), &["help"]);
    }

    #[test]
    fn test_delete_forward_joins() {
        let mut ed = editor("ab\ncd");
        ed.move_end(false);
        ed.delete_forward();
        assert_eq!(ed.lines(), &["abcd"]);
        ed.move_end(false);
        ed.delete_forward();
        assert_eq!(ed.lines(), &["abcd"]);
    }

    #[test]
    fn test_page_and_visibility() {
        let text: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        let mut ed = editor(&text.join("\n"));
        ed.apply(KeyPress::new(Key::PageDown), 20);
        assert_eq!(ed.cursor().line, 20);
        ed.ensure_visible(10, 40);
        assert_eq!(ed.scroll().line, 11);
        ed.move_page(5, 20, false);
        assert_eq!(ed.cursor().line, 49);
        ed.move_page(-5, 20, false);
        assert_eq!(ed.cursor().line, 0);
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        let mut ed = Editor::open(&path).unwrap();
        assert_eq!(ed.lines(), &[""]);
        ed.insert_text("first\nsecond\n");
        ed.save().unwrap();
        assert!(!ed.is_dirty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        assert_eq!(Editor::open(&path).unwrap().lines(), &["first", "second", ""]);
    }

    #[test]
    fn test_multibyte_columns() {
        let mut ed = editor("añb");
        ed.move_cursor(0, 2, false);
        ed.backspace();
        assert_eq!(ed.lines(), &["ab"]);
        ed.insert_text("é");
        assert_eq!(ed.lines(), &["aéb"]);
    }
}
