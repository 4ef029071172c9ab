//! Frame renderer using crossterm
//!
//! Rendering is split in two: [`compose`] turns the controller's state into
//! a [`Frame`] of styled cells, and [`Renderer`] writes a frame to the host
//! terminal, redrawing only rows that changed since the previous frame.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Color as CtColor, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen, LeaveAlternateScreen},
};
use unicode_width::UnicodeWidthChar;

use crate::app::{EditorNav, Layout, Mode, ModeController};
use crate::config::{Rgb, Theme};
use crate::core::term::{AttrFlags, Color as TermColor, Row};
use crate::input::{Context, Layer, Modifiers};

/// Message prefixes drawn in the system color
const SYSTEM_PREFIXES: [&str; 4] = ["[System]", "[Autocomplete]", "[History]", "[Exit Code]"];

/// Width of the editor's line-number gutter
pub const GUTTER: u16 = 5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Style {
    pub fg: CtColor,
    pub bg: CtColor,
    pub flags: AttrFlags,
}

impl Style {
    pub fn new(fg: Rgb, bg: Rgb) -> Self {
        Self {
            fg: fg.to_crossterm(),
            bg: bg.to_crossterm(),
            flags: AttrFlags::empty(),
        }
    }

    pub fn bold(mut self) -> Self {
        self.flags |= AttrFlags::BOLD;
        self
    }
}

/// One grid cell; wide glyphs are followed by an empty continuation cell
#[derive(Clone, Debug, PartialEq)]
pub struct FrameCell {
    pub ch: String,
    pub style: Style,
}

/// Composed picture of the whole grid
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub rows: Vec<Vec<FrameCell>>,
    /// Host cursor as (col, row), hidden when `None`
    pub cursor: Option<(u16, u16)>,
}

impl Frame {
    fn new(rows: u16, cols: u16, style: Style) -> Self {
        let blank = FrameCell {
            ch: " ".to_string(),
            style,
        };
        Self {
            rows: vec![vec![blank; usize::from(cols)]; usize::from(rows)],
            cursor: None,
        }
    }

    pub fn cols(&self) -> u16 {
        self.rows.first().map_or(0, |r| r.len() as u16)
    }

    /// Plain text of a row, trailing spaces trimmed
    pub fn text(&self, row: usize) -> String {
        self.rows
            .get(row)
            .map(|cells| cells.iter().map(|c| c.ch.as_str()).collect::<String>())
            .unwrap_or_default()
            .trim_end()
            .to_string()
    }

    /// Style of the cell at (row, col)
    pub fn style_at(&self, row: usize, col: usize) -> Option<Style> {
        self.rows.get(row)?.get(col).map(|c| c.style)
    }

    fn fill(&mut self, row: u16, style: Style) {
        if let Some(cells) = self.rows.get_mut(usize::from(row)) {
            for cell in cells {
                cell.ch = " ".to_string();
                cell.style = style;
            }
        }
    }

    /// Write `text` starting at `col`; returns the column after it. Text
    /// past the right edge is cut, never wrapped.
    fn put(&mut self, row: u16, col: u16, text: &str, style: Style) -> u16 {
        let Some(cells) = self.rows.get_mut(usize::from(row)) else {
            return col;
        };
        let cols = cells.len();
        let mut at = usize::from(col);
        for ch in text.chars() {
            let width = ch.width().unwrap_or(0);
            if width == 0 {
                continue;
            }
            if at + width > cols {
                break;
            }
            cells[at] = FrameCell {
                ch: ch.to_string(),
                style,
            };
            for cont in 1..width {
                cells[at + cont] = FrameCell {
                    ch: String::new(),
                    style,
                };
            }
            at += width;
        }
        at as u16
    }

    /// Same as [`put`](Self::put) but right-aligned against the edge
    fn put_right(&mut self, row: u16, text: &str, style: Style) {
        let width: usize = text.chars().filter_map(|c| c.width()).sum();
        let col = usize::from(self.cols()).saturating_sub(width);
        self.put(row, col as u16, text, style);
    }
}

/// Build the frame for the controller's current state
pub fn compose(app: &ModeController) -> Frame {
    let layout = app.layout();
    let theme = app.theme();
    let base = Style::new(theme.output_text, theme.background);
    let mut frame = Frame::new(layout.total_rows, layout.cols, base);

    if layout.header_rows > 0 {
        let style = Style::new(theme.header, theme.input_bg).bold();
        frame.fill(0, style);
        frame.put(0, 1, &app.header_text(), style);
    }

    if app.underlying_mode() == Mode::Editor {
        draw_editor(&mut frame, app, &layout);
    } else {
        draw_screen(&mut frame, app, &layout);
    }

    draw_input_line(&mut frame, app, &layout);

    let status_style = match app.status() {
        Some(_) => Style::new(theme.output_system, theme.background),
        None => Style::new(theme.help_text, theme.background),
    };
    let status = app.status().map(str::to_string).unwrap_or_else(|| hint(app.context()).to_string());
    frame.put(layout.status_row(), 0, &status, status_style);

    if layout.keyboard_rows > 0 {
        draw_keyboard(&mut frame, app, &layout);
    }

    if app.mode() == Mode::Menu {
        draw_menu(&mut frame, app, &layout);
        frame.cursor = None;
    }

    frame
}

/// One-line control reminder per context
fn hint(context: Context) -> &'static str {
    match context {
        Context::Shell => "A:key B:del X:space Y:enter Guide:complete Start:menu",
        Context::Pty => "A:key Y:enter L2+R2:Ctrl+C Sel+D-Pad:arrows Start:menu",
        Context::EditorFile => "L2+A:save L2+B:exit Sel+D-Pad:select Start:keyboard",
        Context::EditorKeyboard => "D-Pad:keyboard A:key L2+A:save L2+B:exit Start:file",
        Context::Menu => "D-Pad:move A:select B:close",
    }
}

fn line_color(text: &str, prompt: &str, theme: &Theme) -> Rgb {
    if text.starts_with("[Error]") {
        theme.output_error
    } else if SYSTEM_PREFIXES.iter().any(|p| text.starts_with(p)) {
        theme.output_system
    } else if !prompt.is_empty() && text.starts_with(prompt) {
        theme.output_prompt
    } else {
        theme.output_text
    }
}

fn draw_screen(frame: &mut Frame, app: &ModeController, layout: &Layout) {
    let theme = app.theme();
    let screen = app.screen();
    let offset = app.scroll_offset();
    // Child output is never recolored by prefix
    let passthrough = app.underlying_mode() == Mode::PtyPassthrough;
    let prompt = if passthrough {
        None
    } else {
        Some(app.prompt())
    };

    for (i, row) in screen.read_viewport(offset).enumerate() {
        let y = layout.header_rows + i as u16;
        let default_fg = match &prompt {
            Some(prompt) => line_color(&row.text(), prompt, theme),
            None => theme.output_text,
        };
        draw_row(frame, y, row, default_fg, theme.background);
    }

    if offset > 0 {
        let style = Style::new(theme.background, theme.output_system);
        frame.put_right(layout.header_rows, &format!("[↑ {} lines]", offset), style);
    } else if passthrough && screen.cursor_visible() {
        let (row, col) = screen.cursor();
        frame.cursor = Some((col, layout.header_rows + row));
    }
}

/// Copy one screen row, mapping default colors to the theme
fn draw_row(frame: &mut Frame, y: u16, row: &Row, default_fg: Rgb, default_bg: Rgb) {
    let Some(cells) = frame.rows.get_mut(usize::from(y)) else {
        return;
    };
    let mut col = 0usize;
    for cell in &row.cells {
        if col >= cells.len() {
            break;
        }
        let fg = match cell.attrs.fg {
            TermColor::Default => default_fg.to_crossterm(),
            other => other.to_crossterm(),
        };
        let bg = match cell.attrs.bg {
            TermColor::Default => default_bg.to_crossterm(),
            other => other.to_crossterm(),
        };
        cells[col] = FrameCell {
            ch: if cell.is_continuation() {
                String::new()
            } else {
                cell.display_char().to_string()
            },
            style: Style {
                fg,
                bg,
                flags: cell.attrs.flags,
            },
        };
        col += 1;
    }
}

fn draw_editor(frame: &mut Frame, app: &ModeController, layout: &Layout) {
    let Some(editor) = app.editor() else {
        return;
    };
    let theme = app.theme();
    let text_style = Style::new(theme.output_text, theme.background);
    let gutter_style = Style::new(theme.help_text, theme.background);
    let selected_style = Style::new(theme.output_text, theme.selection_bg);
    let scroll = editor.scroll();
    let selection = editor.selection();
    let width = usize::from(layout.cols.saturating_sub(GUTTER));

    for (i, line) in editor.lines().iter().enumerate().skip(scroll.line).take(usize::from(layout.screen_rows)) {
        let y = layout.header_rows + (i - scroll.line) as u16;
        frame.put(y, 0, &format!("{:>4} ", i + 1), gutter_style);
        let mut x = GUTTER;
        for (c, ch) in line.chars().enumerate().skip(scroll.col).take(width) {
            let inside = selection.is_some_and(|(start, end)| {
                let pos = crate::editor::Pos::new(i, c);
                pos >= start && pos < end
            });
            let style = if inside { selected_style } else { text_style };
            let mut buf = [0u8; 4];
            x = frame.put(y, x, ch.encode_utf8(&mut buf), style);
        }
    }

    let cursor = editor.cursor();
    if cursor.line >= scroll.line && cursor.col >= scroll.col {
        let row = cursor.line - scroll.line;
        let col = cursor.col - scroll.col;
        if row < usize::from(layout.screen_rows) && col < width {
            frame.cursor = Some((GUTTER + col as u16, layout.header_rows + row as u16));
        }
    }
}

fn draw_input_line(frame: &mut Frame, app: &ModeController, layout: &Layout) {
    let theme = app.theme();
    let y = layout.input_row();
    let bg = Style::new(theme.input_text, theme.input_bg);
    frame.fill(y, bg);

    match app.underlying_mode() {
        Mode::Shell | Mode::Menu => {
            let line = app.line();
            let counter = format!("{}/{}", line.len(), line.max_len());
            frame.put_right(y, &counter, Style::new(theme.input_counter, theme.input_bg));

            let prompt = format!("{} ", app.prompt());
            let start = frame.put(y, 0, &prompt, Style::new(theme.output_prompt, theme.input_bg));
            let avail = usize::from(layout.cols.saturating_sub(start + counter.len() as u16 + 1));
            let (visible, cursor_col) = input_window(&line.text(), line.cursor(), avail);
            frame.put(y, start, &visible, bg);
            frame.cursor = Some((start + cursor_col as u16, y));
        }
        Mode::PtyPassthrough => {
            let command = app.session().map(|s| s.command()).unwrap_or_default();
            frame.put(y, 0, &format!("[PTY] {}", command), Style::new(theme.help_text, theme.input_bg));
        }
        Mode::Editor => {
            if let Some(editor) = app.editor() {
                let cursor = editor.cursor();
                let nav = match app.editor_nav() {
                    EditorNav::File => "FILE",
                    EditorNav::Keyboard => "KEYS",
                };
                let mut info = format!("Ln {}, Col {}  [{}]", cursor.line + 1, cursor.col + 1, nav);
                if editor.has_selection() {
                    info.push_str(&format!("  {} selected", editor.selected_text().chars().count()));
                }
                frame.put(y, 0, &info, Style::new(theme.help_text, theme.input_bg));
            }
        }
    }
}

/// Slice of `text` that fits in `width` columns with the cursor visible,
/// plus the cursor's column inside that slice
pub fn input_window(text: &str, cursor: usize, width: usize) -> (String, usize) {
    let chars: Vec<char> = text.chars().collect();
    let cursor = cursor.min(chars.len());
    let col_of = |from: usize, to: usize| -> usize { chars[from..to].iter().filter_map(|c| c.width()).sum() };

    let mut start = 0;
    while start < cursor && col_of(start, cursor) >= width.max(1) {
        start += 1;
    }
    let mut visible = String::new();
    let mut used = 0;
    for &ch in &chars[start..] {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        visible.push(ch);
        used += w;
    }
    (visible, col_of(start, cursor))
}

fn draw_keyboard(frame: &mut Frame, app: &ModeController, layout: &Layout) {
    let theme = app.theme();
    let keyboard = app.keyboard();
    let (cur_row, cur_col) = keyboard.cursor();
    let mods = keyboard.modifiers();
    let top = layout.keyboard_top();

    for (r, keys) in keyboard.rows().iter().enumerate() {
        let y = top + r as u16;
        if y >= layout.total_rows {
            break;
        }
        frame.fill(y, Style::new(theme.keyboard_text, theme.background));
        let key_width = (usize::from(layout.cols) / keys.len()).max(2);
        for (c, label) in keys.iter().enumerate() {
            let locked = match *label {
                "⇧" => keyboard.layer() == Layer::Shift,
                "#+=" | "ABC" => keyboard.layer() == Layer::Symbols,
                "Ctrl" => mods.contains(Modifiers::CTRL),
                "Alt" => mods.contains(Modifiers::ALT),
                _ => false,
            };
            let bg = if (r, c) == (cur_row, cur_col) {
                theme.keyboard_selected
            } else if locked {
                theme.keyboard_locked
            } else {
                theme.keyboard_key
            };
            let style = Style::new(theme.keyboard_text, bg);
            let x = (c * key_width) as u16;
            let cap = center(label, key_width - 1);
            frame.put(y, x, &cap, style);
        }
    }
}

fn center(label: &str, width: usize) -> String {
    let len: usize = label.chars().filter_map(|c| c.width()).sum();
    let pad = width.saturating_sub(len);
    let left = pad / 2;
    format!("{}{}{}", " ".repeat(left), label, " ".repeat(pad - left))
}

fn draw_menu(frame: &mut Frame, app: &ModeController, layout: &Layout) {
    let theme = app.theme();
    let lines = app.menu().lines(&app.menu_values());
    let inner = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0).max(12);
    let width = (inner + 4) as u16;
    let height = lines.len() as u16 + 2;
    let x = layout.cols.saturating_sub(width) / 2;
    let y = layout.header_rows + layout.screen_rows.saturating_sub(height) / 2;

    let border = Style::new(theme.header, theme.input_bg);
    let item = Style::new(theme.output_text, theme.input_bg);
    let selected = Style::new(theme.keyboard_text, theme.keyboard_selected).bold();

    let bar = "─".repeat(usize::from(width) - 2);
    let title = " Menu ";
    let top = format!("┌{}{}┐", title, "─".repeat(usize::from(width) - 2 - title.len()));
    frame.put(y, x, &top, border);
    for (i, line) in lines.iter().enumerate() {
        let row = y + 1 + i as u16;
        let style = if i == app.menu().selected_index() { selected } else { item };
        frame.put(row, x, "│", border);
        frame.put(row, x + 1, &format!(" {:<w$} ", line, w = inner), style);
        frame.put(row, x + width - 1, "│", border);
    }
    frame.put(y + height - 1, x, &format!("└{}┘", bar), border);
}

/// Host terminal writer
pub struct Renderer {
    /// Frame currently on screen
    prev: Option<Frame>,
    initialized: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            prev: None,
            initialized: false,
        }
    }

    /// Enter raw mode and the alternate screen
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, DisableLineWrap, Hide, Clear(ClearType::All), MoveTo(0, 0))?;
        self.initialized = true;
        self.prev = None;
        tracing::debug!("Renderer initialized");
        Ok(())
    }

    /// Restore the host terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset), Show, EnableLineWrap);
        let _ = execute!(stdout, LeaveAlternateScreen);
        let _ = stdout.flush();
        terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Forget what is on screen; the next frame is drawn in full
    pub fn invalidate(&mut self) {
        self.prev = None;
    }

    pub fn render(&mut self, frame: Frame) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        // Synchronized update
        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        let full = match &self.prev {
            Some(prev) => prev.rows.len() != frame.rows.len() || prev.cols() != frame.cols(),
            None => true,
        };
        if full {
            queue!(out, ResetColor, Clear(ClearType::All))?;
        }
        for (y, row) in frame.rows.iter().enumerate() {
            let unchanged = !full && self.prev.as_ref().and_then(|p| p.rows.get(y)) == Some(row);
            if !unchanged {
                write_row(&mut out, y as u16, row)?;
            }
        }

        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;
        if let Some((col, row)) = frame.cursor {
            queue!(out, MoveTo(col, row), Show)?;
        }
        write!(out, "\x1b[?2026l")?;
        out.flush()?;

        self.prev = Some(frame);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Write one row, batching runs of equal style
fn write_row<W: Write>(out: &mut W, y: u16, row: &[FrameCell]) -> io::Result<()> {
    queue!(out, MoveTo(0, y))?;
    let mut run = String::with_capacity(256);
    let mut current: Option<Style> = None;
    for cell in row {
        if cell.ch.is_empty() {
            continue;
        }
        if current != Some(cell.style) {
            if let Some(style) = current {
                apply_style(out, &style)?;
                write!(out, "{}", run)?;
                run.clear();
            }
            current = Some(cell.style);
        }
        run.push_str(&cell.ch);
    }
    if let Some(style) = current {
        apply_style(out, &style)?;
        write!(out, "{}", run)?;
    }
    Ok(())
}

fn apply_style<W: Write>(out: &mut W, style: &Style) -> io::Result<()> {
    queue!(out, SetAttribute(Attribute::Reset))?;
    let flags = style.flags;
    if flags.contains(AttrFlags::BOLD) {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if flags.contains(AttrFlags::DIM) {
        queue!(out, SetAttribute(Attribute::Dim))?;
    }
    if flags.contains(AttrFlags::ITALIC) {
        queue!(out, SetAttribute(Attribute::Italic))?;
    }
    if flags.contains(AttrFlags::UNDERLINE) {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    if flags.contains(AttrFlags::BLINK) {
        queue!(out, SetAttribute(Attribute::SlowBlink))?;
    }
    if flags.contains(AttrFlags::INVERSE) {
        queue!(out, SetAttribute(Attribute::Reverse))?;
    }
    if flags.contains(AttrFlags::HIDDEN) {
        queue!(out, SetAttribute(Attribute::Hidden))?;
    }
    if flags.contains(AttrFlags::STRIKETHROUGH) {
        queue!(out, SetAttribute(Attribute::CrossedOut))?;
    }
    queue!(out, SetForegroundColor(style.fg), SetBackgroundColor(style.bg))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn controller() -> (ModeController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let app = ModeController::new(Config::default(), dir.path().to_path_buf());
        (app, dir)
    }

    fn find_row(frame: &Frame, needle: &str) -> Option<usize> {
        (0..frame.rows.len()).find(|&r| frame.text(r).contains(needle))
    }

    #[test]
    fn test_layout_regions() {
        let (app, _dir) = controller();
        let layout = app.layout();
        let frame = compose(&app);
        assert_eq!(frame.rows.len(), usize::from(layout.total_rows));
        assert!(frame.text(0).contains("padterm [SHELL]"));
        assert!(frame.text(usize::from(layout.input_row())).ends_with("0/2500"));
        assert!(frame.text(usize::from(layout.keyboard_top())).contains("Esc"));
        assert_eq!(frame.cursor.map(|(_, row)| row), Some(layout.input_row()));
    }

    #[test]
    fn test_message_prefixes_are_colored() {
        let (mut app, _dir) = controller();
        app.screen_mut().write_line("[Error] boom");
        app.screen_mut().write_line("[System] fine");
        app.screen_mut().write_line("plain");
        let frame = compose(&app);
        let theme = app.theme().clone();

        let err = find_row(&frame, "[Error] boom").unwrap();
        assert_eq!(frame.style_at(err, 0).unwrap().fg, theme.output_error.to_crossterm());
        let sys = find_row(&frame, "[System] fine").unwrap();
        assert_eq!(frame.style_at(sys, 0).unwrap().fg, theme.output_system.to_crossterm());
        let plain = find_row(&frame, "plain").unwrap();
        assert_eq!(frame.style_at(plain, 0).unwrap().fg, theme.output_text.to_crossterm());
    }

    #[test]
    fn test_menu_overlay_marks_selection() {
        let (mut app, _dir) = controller();
        app.open_menu();
        let frame = compose(&app);
        assert!(find_row(&frame, "> Resume").is_some());
        assert!(find_row(&frame, "Theme: < Classic >").is_some());
        assert!(frame.cursor.is_none());
    }

    #[test]
    fn test_editor_view_has_gutter() {
        let (mut app, dir) = controller();
        std::fs::write(dir.path().join("a.txt"), "first\nsecond\n").unwrap();
        app.submit("edit a.txt");
        let frame = compose(&app);
        let layout = app.layout();
        let first = usize::from(layout.header_rows);
        assert_eq!(frame.text(first), "   1 first");
        assert_eq!(frame.text(first + 1), "   2 second");
        assert!(frame.text(usize::from(layout.input_row())).starts_with("Ln 1, Col 1  [FILE]"));
        assert_eq!(frame.cursor, Some((GUTTER, layout.header_rows)));
    }

    #[test]
    fn test_input_window_keeps_cursor_visible() {
        assert_eq!(input_window("hello", 5, 10), ("hello".to_string(), 5));
        let (visible, col) = input_window("abcdefghij", 10, 4);
        assert_eq!(visible, "hij");
        assert_eq!(col, 3);
        let (visible, col) = input_window("abcdefghij", 0, 4);
        assert_eq!(visible, "abcd");
        assert_eq!(col, 0);
    }

    #[test]
    fn test_put_cuts_wide_glyphs_at_edge() {
        let style = Style::new(Rgb::new(0, 0, 0), Rgb::new(255, 255, 255));
        let mut frame = Frame::new(1, 5, style);
        let end = frame.put(0, 0, "ab日本", style);
        assert_eq!(end, 4);
        assert_eq!(frame.text(0), "ab日");
        assert_eq!(frame.rows[0][3].ch, "");
    }
}
