//! Terminal screen model.
//!
//! [`ScreenBuffer`] is the surface the rest of the crate talks to: it owns
//! the grid state and the sequence parser, and takes raw output bytes.

mod parser;
mod state;

pub use parser::{Response, VtParser};
pub use state::{
    AttrFlags, Cell, CellAttrs, Color, CursorState, Grid, Row, TermState, TerminalModes, Viewport,
};

/// Character grid with scrollback, fed from a child's output stream
pub struct ScreenBuffer {
    state: TermState,
    parser: VtParser,
    replies: Vec<u8>,
}

impl ScreenBuffer {
    pub fn new(rows: u16, cols: u16, scrollback_limit: usize) -> Self {
        Self {
            state: TermState::new(rows, cols, scrollback_limit),
            parser: VtParser::new(),
            replies: Vec::new(),
        }
    }

    /// Consume output bytes. Never fails; malformed input degrades to
    /// replacement glyphs or is dropped.
    pub fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if let Some(response) = self.parser.feed(byte, &mut self.state) {
                self.replies.extend(response.to_bytes());
            }
        }
    }

    /// Write text followed by CRLF
    pub fn write_line(&mut self, text: &str) {
        self.write(text.as_bytes());
        self.write(b"\r\n");
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.state.resize(rows, cols);
    }

    /// Evict `n` top rows into scrollback and expose blank rows at the bottom
    pub fn scroll_up(&mut self, n: u16) {
        self.state.scroll_up(n);
    }

    /// Rows visible `scroll_offset` lines back from the live bottom
    pub fn read_viewport(&self, scroll_offset: usize) -> Viewport<'_> {
        self.state.active_grid().viewport(scroll_offset)
    }

    /// Clear the screen and home the cursor, keeping scrollback
    pub fn clear(&mut self) {
        self.state.erase_in_display(2);
        self.state.cursor_position(1, 1);
        self.state.active_cursor_mut().clear_wrap_state();
    }

    pub fn rows(&self) -> u16 {
        self.state.rows
    }

    pub fn cols(&self) -> u16 {
        self.state.cols
    }

    /// Cursor as (row, col)
    pub fn cursor(&self) -> (u16, u16) {
        let cursor = self.state.active_cursor();
        (cursor.row, cursor.col)
    }

    pub fn cursor_visible(&self) -> bool {
        self.state.active_cursor().visible
    }

    pub fn scrollback_len(&self) -> usize {
        self.state.active_grid().scrollback.len()
    }

    /// Evicted rows, oldest first
    pub fn scrollback(&self) -> impl Iterator<Item = &Row> {
        self.state.active_grid().scrollback.iter()
    }

    pub fn is_alternate_screen(&self) -> bool {
        self.state.using_alternate
    }

    /// Whether the alternate screen was switched on since the last call
    pub fn take_alt_screen_entered(&mut self) -> bool {
        std::mem::take(&mut self.state.alt_screen_entered)
    }

    pub fn application_cursor(&self) -> bool {
        self.state.modes.application_cursor
    }

    pub fn modes(&self) -> &TerminalModes {
        &self.state.modes
    }

    pub fn title(&self) -> &str {
        &self.state.title
    }

    /// Row indices changed since the last call
    pub fn take_dirty_rows(&mut self) -> Vec<usize> {
        self.state.active_grid_mut().take_dirty()
    }

    pub fn needs_full_redraw(&self) -> bool {
        self.state.active_grid().full_redraw
    }

    pub fn mark_all_dirty(&mut self) {
        self.state.active_grid_mut().mark_all_dirty();
    }

    /// Answers to terminal queries (cursor reports, device attributes)
    /// that should be written back to the child.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    /// Reset parser and grid state, as after the child exits mid-sequence
    pub fn reset_modes(&mut self) {
        self.parser = VtParser::new();
        if self.state.using_alternate {
            self.state.set_private_mode(1049, false);
        }
        self.state.alt_screen_entered = false;
        self.state.current_attrs.reset();
        self.state.modes = TerminalModes::default();
        self.state.scroll_region = (0, self.state.rows - 1);
        self.state.active_cursor_mut().visible = true;
    }
}
