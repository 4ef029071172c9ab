//! Terminal state management
//!
//! This module defines the character grid, scrollback, cursor state and
//! attributes that the control-sequence parser acts on.

use bitflags::bitflags;
use std::collections::VecDeque;
use unicode_width::UnicodeWidthChar;

/// Terminal state holding all screen data
pub struct TermState {
    pub rows: u16,
    pub cols: u16,
    pub primary: Grid,
    pub alternate: Grid,
    pub using_alternate: bool,
    pub primary_cursor: CursorState,
    pub alternate_cursor: CursorState,
    pub current_attrs: CellAttrs,
    pub modes: TerminalModes,
    pub title: String,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    pub scroll_region: (u16, u16),
    /// Latched whenever the alternate screen is switched on
    pub alt_screen_entered: bool,
}

impl TermState {
    pub fn new(rows: u16, cols: u16, scrollback_limit: usize) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        Self {
            rows,
            cols,
            primary: Grid::new(rows, cols, scrollback_limit),
            alternate: Grid::new(rows, cols, 0),
            using_alternate: false,
            primary_cursor: CursorState::default(),
            alternate_cursor: CursorState::default(),
            current_attrs: CellAttrs::default(),
            modes: TerminalModes::default(),
            title: String::new(),
            scroll_region: (0, rows - 1),
            alt_screen_entered: false,
        }
    }

    /// Full reset (RIS). Scrollback survives so earlier output stays reachable.
    pub fn reset(&mut self) {
        let scrollback = std::mem::take(&mut self.primary.scrollback);
        let limit = self.primary.scrollback_limit;
        *self = Self::new(self.rows, self.cols, limit);
        self.primary.scrollback = scrollback;
    }

    pub fn active_grid(&self) -> &Grid {
        if self.using_alternate {
            &self.alternate
        } else {
            &self.primary
        }
    }

    pub fn active_grid_mut(&mut self) -> &mut Grid {
        if self.using_alternate {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    pub fn active_cursor(&self) -> &CursorState {
        if self.using_alternate {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    pub fn active_cursor_mut(&mut self) -> &mut CursorState {
        if self.using_alternate {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    /// Resize both grids. Rows that would push the cursor off the bottom are
    /// evicted into scrollback; everything else is truncated or padded.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1);
        let cols = cols.max(1);
        self.rows = rows;
        self.cols = cols;

        let row = self.primary.resize(rows, cols, self.primary_cursor.row);
        self.primary_cursor.row = row;
        let row = self.alternate.resize(rows, cols, self.alternate_cursor.row);
        self.alternate_cursor.row = row;
        self.scroll_region = (0, rows - 1);

        let max_col = cols - 1;
        for cursor in [&mut self.primary_cursor, &mut self.alternate_cursor] {
            cursor.col = cursor.col.min(max_col);
            cursor.clear_wrap_state();
        }
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;

        if width == 0 {
            // Combining character - append to previous cell
            self.append_to_previous_cell(ch);
            return;
        }
        if width > self.cols {
            return;
        }

        if self.active_cursor().pending_wrap {
            self.wrap_to_next_line();
        }
        self.active_cursor_mut().wrapped_eol = false;

        // A wide character that does not fit in the remaining columns
        if self.active_cursor().col + width > self.cols {
            if self.modes.auto_wrap {
                self.wrap_to_next_line();
            } else {
                self.active_cursor_mut().col = self.cols - width;
            }
        }

        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        self.handle_wide_char_overwrite(row, col);

        let attrs = self.current_attrs.clone();
        let cols = self.cols as usize;
        let grid = self.active_grid_mut();
        grid.rows[row].cells[col] = Cell {
            grapheme: ch.to_string(),
            width: width as u8,
            attrs: attrs.clone(),
        };
        if width == 2 && col + 1 < cols {
            grid.rows[row].cells[col + 1] = Cell::continuation(&attrs);
        }
        grid.mark_dirty(row);

        self.advance_after_write(width);
    }

    /// Move the cursor past a freshly written glyph. Wrapping is eager so
    /// the cursor never leaves the grid; on the last line of the scroll
    /// region the wrap is held back until the next glyph arrives so that
    /// filling the bottom-right cell does not scroll the screen.
    fn advance_after_write(&mut self, width: u16) {
        let cols = self.cols;
        let bottom = self.scroll_region.1;
        let last_row = self.rows - 1;
        let auto_wrap = self.modes.auto_wrap;

        let (row, new_col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col + width)
        };
        if new_col < cols {
            self.active_cursor_mut().col = new_col;
            return;
        }
        if !auto_wrap {
            self.active_cursor_mut().col = cols - 1;
            return;
        }
        if row == bottom || row == last_row {
            let cursor = self.active_cursor_mut();
            cursor.col = cols - 1;
            cursor.pending_wrap = true;
            return;
        }

        self.active_grid_mut().rows[row as usize].wrapped = true;
        let cursor = self.active_cursor_mut();
        cursor.col = 0;
        cursor.row = row + 1;
        cursor.wrapped_eol = true;
    }

    fn wrap_to_next_line(&mut self) {
        let row = self.active_cursor().row as usize;
        self.active_grid_mut().rows[row].wrapped = true;
        {
            let cursor = self.active_cursor_mut();
            cursor.col = 0;
            cursor.pending_wrap = false;
        }
        self.index();
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let pending = self.active_cursor().pending_wrap;
        if col == 0 && !pending {
            return;
        }
        let grid = self.active_grid_mut();
        let mut c = if pending { col } else { col - 1 };
        if grid.rows[row].cells[c].is_continuation() && c > 0 {
            c -= 1;
        }
        grid.rows[row].cells[c].grapheme.push(ch);
        grid.mark_dirty(row);
    }

    fn handle_wide_char_overwrite(&mut self, row: usize, col: usize) {
        let attrs = self.current_attrs.clone();
        let cols = self.cols as usize;
        let grid = self.active_grid_mut();

        // Right half of a wide char
        if col > 0 && grid.rows[row].cells[col].is_continuation() {
            grid.rows[row].cells[col - 1] = Cell::blank(&attrs);
        }

        // Left half of a wide char
        if grid.rows[row].cells[col].width == 2 && col + 1 < cols {
            grid.rows[row].cells[col + 1] = Cell::blank(&attrs);
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        let cursor = self.active_cursor_mut();
        cursor.col = 0;
        cursor.pending_wrap = false;
    }

    /// Line feed received from the byte stream. A line feed that directly
    /// follows an eager wrap is absorbed, since the wrap already moved down.
    pub fn linefeed(&mut self) {
        let cursor = self.active_cursor_mut();
        cursor.pending_wrap = false;
        if cursor.wrapped_eol {
            cursor.wrapped_eol = false;
            return;
        }
        self.index();
    }

    /// Index - cursor down, scroll if at the bottom of the scroll region
    pub fn index(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_bottom = self.scroll_region.1;

        if cursor_row == scroll_bottom {
            self.scroll_up(1);
        } else if cursor_row < self.rows - 1 {
            self.active_cursor_mut().row += 1;
        }
    }

    /// Reverse index - cursor up, scroll if at top
    pub fn reverse_index(&mut self) {
        let cursor_row = self.active_cursor().row;
        if cursor_row == self.scroll_region.0 {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_sub(1);
    }

    /// Horizontal tab (stops every 8 columns)
    pub fn horizontal_tab(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = (((cursor.col / 8) + 1) * 8).min(cols - 1);
    }

    /// Scroll the scroll region up by n lines. Rows leaving the top of the
    /// primary screen are kept in scrollback.
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;
        let keep = top == 0;

        let grid = self.active_grid_mut();
        for _ in 0..n.min(bottom - top + 1) {
            let removed = grid.rows.remove(top as usize);
            if keep {
                grid.push_to_scrollback(removed);
            }
            grid.rows.insert(bottom as usize, Row::new(cols));
        }
        grid.mark_all_dirty();
    }

    /// Scroll the scroll region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;

        let grid = self.active_grid_mut();
        for _ in 0..n.min(bottom - top + 1) {
            grid.rows.remove(bottom as usize);
            grid.rows.insert(top as usize, Row::new(cols));
        }
        grid.mark_all_dirty();
    }

    pub fn cursor_up(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        let rows = self.rows;
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_add(n).min(rows - 1);
    }

    pub fn cursor_forward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_add(n).min(cols - 1);
    }

    pub fn cursor_backward(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        let rows = self.rows;
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.row = row.saturating_sub(1).min(rows - 1);
        cursor.col = col.saturating_sub(1).min(cols - 1);
    }

    pub fn set_column(&mut self, col: u16) {
        let cols = self.cols;
        self.active_cursor_mut().col = col.saturating_sub(1).min(cols - 1);
    }

    pub fn set_row(&mut self, row: u16) {
        let rows = self.rows;
        self.active_cursor_mut().row = row.saturating_sub(1).min(rows - 1);
    }

    /// Erase in display
    pub fn erase_in_display(&mut self, mode: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let attrs = self.current_attrs.clone();
        match mode {
            0 => {
                self.erase_in_line(0);
                let grid = self.active_grid_mut();
                for r in (cursor_row + 1)..grid.rows.len() {
                    grid.rows[r].clear(&attrs);
                }
            }
            1 => {
                {
                    let grid = self.active_grid_mut();
                    for r in 0..cursor_row {
                        grid.rows[r].clear(&attrs);
                    }
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                let grid = self.active_grid_mut();
                for row in &mut grid.rows {
                    row.clear(&attrs);
                }
                if mode == 3 {
                    grid.scrollback.clear();
                }
            }
            _ => {}
        }
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let attrs = self.current_attrs.clone();
        let grid = self.active_grid_mut();
        let line = &mut grid.rows[row];
        let len = line.cells.len();

        match mode {
            0 => line.cells[col.min(len)..].iter_mut().for_each(|c| c.clear(&attrs)),
            1 => line.cells[..(col + 1).min(len)]
                .iter_mut()
                .for_each(|c| c.clear(&attrs)),
            2 => line.clear(&attrs),
            _ => {}
        }
        grid.mark_dirty(row);
    }

    /// Insert blank lines at the cursor row, pushing lines below downwards
    pub fn insert_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row;
        let (top, bottom) = self.scroll_region;
        if cursor_row < top || cursor_row > bottom {
            return;
        }
        let cols = self.cols;
        let grid = self.active_grid_mut();
        for _ in 0..n.min(bottom - cursor_row + 1) {
            grid.rows.remove(bottom as usize);
            grid.rows.insert(cursor_row as usize, Row::new(cols));
        }
        grid.mark_all_dirty();
    }

    /// Delete lines at the cursor row, pulling lines below upwards
    pub fn delete_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row;
        let (top, bottom) = self.scroll_region;
        if cursor_row < top || cursor_row > bottom {
            return;
        }
        let cols = self.cols;
        let grid = self.active_grid_mut();
        for _ in 0..n.min(bottom - cursor_row + 1) {
            grid.rows.remove(cursor_row as usize);
            grid.rows.insert(bottom as usize, Row::new(cols));
        }
        grid.mark_all_dirty();
    }

    /// ICH - shift cells right from the cursor, dropping cells off the edge
    pub fn insert_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let grid = self.active_grid_mut();
        let cells = &mut grid.rows[row].cells;
        for _ in 0..n.min(cells.len() as u16) {
            cells.pop();
            cells.insert(col, Cell::default());
        }
        grid.mark_dirty(row);
    }

    /// DCH - remove cells at the cursor, shifting the rest left
    pub fn delete_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let grid = self.active_grid_mut();
        let cells = &mut grid.rows[row].cells;
        for _ in 0..n.min(cells.len() as u16) {
            cells.remove(col);
            cells.push(Cell::default());
        }
        grid.mark_dirty(row);
    }

    /// ECH - blank n cells starting at the cursor
    pub fn erase_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let attrs = self.current_attrs.clone();
        let grid = self.active_grid_mut();
        let cells = &mut grid.rows[row].cells;
        let end = (col + n as usize).min(cells.len());
        cells[col..end].iter_mut().for_each(|c| c.clear(&attrs));
        grid.mark_dirty(row);
    }

    /// Set scroll region (1-indexed, inclusive)
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let rows = self.rows;
        let top = top.saturating_sub(1).min(rows - 1);
        let bottom = bottom.saturating_sub(1).min(rows - 1);
        if top < bottom {
            self.scroll_region = (top, bottom);
        }
    }

    pub fn save_cursor(&mut self) {
        let (col, row) = {
            let cursor = self.active_cursor();
            (cursor.col, cursor.row)
        };
        let attrs = self.current_attrs.clone();
        self.active_cursor_mut().saved = Some(SavedCursor { col, row, attrs });
    }

    pub fn restore_cursor(&mut self) {
        let saved = self.active_cursor().saved.clone();
        if let Some(saved) = saved {
            let rows = self.rows;
            let cols = self.cols;
            let cursor = self.active_cursor_mut();
            cursor.col = saved.col.min(cols - 1);
            cursor.row = saved.row.min(rows - 1);
            self.current_attrs = saved.attrs;
        }
    }

    /// Set private mode
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.application_cursor = enable,
            7 => self.modes.auto_wrap = enable,
            25 => self.active_cursor_mut().visible = enable,
            47 | 1047 => {
                if enable {
                    self.enter_alternate(false);
                } else {
                    self.using_alternate = false;
                    self.primary.mark_all_dirty();
                }
            }
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.save_cursor();
                    self.enter_alternate(true);
                } else {
                    self.using_alternate = false;
                    self.restore_cursor();
                    self.primary.mark_all_dirty();
                }
            }
            2004 => self.modes.bracketed_paste = enable,
            _ => {}
        }
    }

    fn enter_alternate(&mut self, reset_cursor: bool) {
        if !self.using_alternate {
            self.alternate = Grid::new(self.rows, self.cols, 0);
        }
        self.using_alternate = true;
        if reset_cursor {
            self.alternate_cursor = CursorState::default();
        }
        self.alt_screen_entered = true;
        self.alternate.mark_all_dirty();
    }
}

/// A grid of rows plus the scrollback that has scrolled off its top
pub struct Grid {
    /// Visible rows
    pub rows: Vec<Row>,
    /// Oldest first
    pub scrollback: VecDeque<Row>,
    pub scrollback_limit: usize,
    pub full_redraw: bool,
}

impl Grid {
    pub fn new(rows: u16, cols: u16, scrollback_limit: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            scrollback: VecDeque::new(),
            scrollback_limit,
            full_redraw: true,
        }
    }

    /// Resize the grid, returning the cursor row adjusted for any rows that
    /// were moved into scrollback.
    pub fn resize(&mut self, new_rows: u16, new_cols: u16, cursor_row: u16) -> u16 {
        let new_rows = new_rows as usize;
        let mut cursor_row = cursor_row as usize;

        if cursor_row >= new_rows {
            let excess = cursor_row + 1 - new_rows;
            for _ in 0..excess {
                let row = self.rows.remove(0);
                self.push_to_scrollback(row);
            }
            cursor_row -= excess;
        }
        self.rows.truncate(new_rows);
        while self.rows.len() < new_rows {
            self.rows.push(Row::new(new_cols));
        }

        for row in self.rows.iter_mut().chain(self.scrollback.iter_mut()) {
            row.resize(new_cols);
        }
        self.mark_all_dirty();
        cursor_row as u16
    }

    /// Append an evicted row, dropping the oldest once over the limit
    pub fn push_to_scrollback(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        self.scrollback.push_back(row);
        while self.scrollback.len() > self.scrollback_limit {
            self.scrollback.pop_front();
        }
    }

    /// Get a row by absolute position (0 = oldest scrollback line)
    pub fn row_absolute(&self, abs_row: usize) -> Option<&Row> {
        let total_scrollback = self.scrollback.len();
        if abs_row < total_scrollback {
            self.scrollback.get(abs_row)
        } else {
            self.rows.get(abs_row - total_scrollback)
        }
    }

    /// Visible window `scroll_offset` lines back from the live bottom
    pub fn viewport(&self, scroll_offset: usize) -> Viewport<'_> {
        let offset = scroll_offset.min(self.scrollback.len());
        let start = self.scrollback.len() - offset;
        Viewport {
            grid: self,
            next: start,
            end: start + self.rows.len(),
        }
    }

    pub fn mark_dirty(&mut self, line: usize) {
        if let Some(row) = self.rows.get_mut(line) {
            row.dirty = true;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        self.full_redraw = true;
        for row in &mut self.rows {
            row.dirty = true;
        }
    }

    /// Indices of rows changed since the last call
    pub fn take_dirty(&mut self) -> Vec<usize> {
        self.full_redraw = false;
        self.rows
            .iter_mut()
            .enumerate()
            .filter_map(|(i, row)| std::mem::replace(&mut row.dirty, false).then_some(i))
            .collect()
    }
}

/// Lazy, restartable walk over the rows visible at a scroll offset
#[derive(Clone)]
pub struct Viewport<'a> {
    grid: &'a Grid,
    next: usize,
    end: usize,
}

impl<'a> Iterator for Viewport<'a> {
    type Item = &'a Row;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let row = self.grid.row_absolute(self.next);
        self.next += 1;
        row
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.end - self.next;
        (len, Some(len))
    }
}

impl ExactSizeIterator for Viewport<'_> {}

/// A single row
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub wrapped: bool,
    pub dirty: bool,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            wrapped: false,
            dirty: true,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
        self.dirty = true;
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            cell.clear(attrs);
        }
        self.wrapped = false;
        self.dirty = true;
    }

    /// Row contents as text with trailing blanks removed
    pub fn text(&self) -> String {
        let mut text: String = self
            .cells
            .iter()
            .filter(|c| !c.is_continuation())
            .map(|c| c.display_char())
            .collect();
        let trimmed = text.trim_end_matches(' ').len();
        text.truncate(trimmed);
        text
    }
}

/// A single cell
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub grapheme: String,
    pub width: u8,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            attrs: CellAttrs::default(),
        }
    }
}

impl Cell {
    pub fn blank(attrs: &CellAttrs) -> Self {
        Self {
            grapheme: " ".to_string(),
            width: 1,
            attrs: attrs.clone(),
        }
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        self.grapheme.clear();
        self.width = 1;
        self.attrs = attrs.clone();
    }

    pub fn continuation(attrs: &CellAttrs) -> Self {
        Self {
            grapheme: String::new(),
            width: 0,
            attrs: attrs.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    /// Get the display character (space if empty)
    pub fn display_char(&self) -> &str {
        if self.grapheme.is_empty() {
            " "
        } else {
            &self.grapheme
        }
    }
}

/// Cell attributes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    /// Convert to crossterm color
    pub fn to_crossterm(self) -> crossterm::style::Color {
        match self {
            Color::Default => crossterm::style::Color::Reset,
            Color::Indexed(n) => crossterm::style::Color::AnsiValue(n),
            Color::Rgb(r, g, b) => crossterm::style::Color::Rgb { r, g, b },
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

/// Cursor state
#[derive(Clone)]
pub struct CursorState {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
    pub saved: Option<SavedCursor>,
    /// Cursor sits on the last column of the bottom line and the next glyph
    /// wraps first.
    pub pending_wrap: bool,
    /// The last glyph wrapped the cursor onto a new line.
    pub wrapped_eol: bool,
}

impl CursorState {
    pub fn clear_wrap_state(&mut self) {
        self.pending_wrap = false;
        self.wrapped_eol = false;
    }
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            saved: None,
            pending_wrap: false,
            wrapped_eol: false,
        }
    }
}

/// Saved cursor state
#[derive(Clone)]
pub struct SavedCursor {
    pub col: u16,
    pub row: u16,
    pub attrs: CellAttrs,
}

/// Terminal modes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TerminalModes {
    pub application_cursor: bool,
    pub auto_wrap: bool,
    pub insert_mode: bool,
    pub linefeed_newline: bool,
    pub bracketed_paste: bool,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            application_cursor: false,
            auto_wrap: true,
            insert_mode: false,
            linefeed_newline: false,
            bracketed_paste: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_str(state: &mut TermState, s: &str) {
        for ch in s.chars() {
            state.put_char(ch);
        }
    }

    #[test]
    fn test_wide_char_occupies_two_cells() {
        let mut state = TermState::new(4, 10, 100);
        state.put_char('漢');
        let row = &state.primary.rows[0];
        assert_eq!(row.cells[0].width, 2);
        assert!(row.cells[1].is_continuation());
        assert_eq!(state.primary_cursor.col, 2);
    }

    #[test]
    fn test_bottom_right_cell_does_not_scroll() {
        let mut state = TermState::new(3, 4, 100);
        state.cursor_position(3, 1);
        put_str(&mut state, "abcd");
        assert!(state.primary.scrollback.is_empty());
        assert_eq!(state.primary_cursor.row, 2);
        assert_eq!(state.primary_cursor.col, 3);

        state.put_char('e');
        assert_eq!(state.primary.scrollback.len(), 1);
        assert_eq!(state.primary.rows[2].text(), "e");
    }

    #[test]
    fn test_linefeed_after_wrap_is_absorbed() {
        let mut state = TermState::new(4, 4, 100);
        put_str(&mut state, "abcd");
        assert_eq!((state.primary_cursor.row, state.primary_cursor.col), (1, 0));
        state.carriage_return();
        state.linefeed();
        put_str(&mut state, "x");
        assert_eq!(state.primary.rows[1].text(), "x");
    }

    #[test]
    fn test_scrollback_is_bounded() {
        let mut state = TermState::new(2, 4, 3);
        for _ in 0..10 {
            state.put_char('z');
            state.carriage_return();
            state.linefeed();
        }
        assert_eq!(state.primary.scrollback.len(), 3);
    }

    #[test]
    fn test_alternate_screen_latch() {
        let mut state = TermState::new(4, 10, 100);
        put_str(&mut state, "keep");
        state.set_private_mode(1049, true);
        assert!(state.alt_screen_entered);
        put_str(&mut state, "xx");
        state.set_private_mode(1049, false);
        assert_eq!(state.primary.rows[0].text(), "keep");
        assert_eq!(state.primary_cursor.col, 4);
    }

    #[test]
    fn test_take_dirty_clears_flags() {
        let mut grid = Grid::new(3, 5, 10);
        assert_eq!(grid.take_dirty(), vec![0, 1, 2]);
        assert!(grid.take_dirty().is_empty());
        grid.mark_dirty(1);
        assert_eq!(grid.take_dirty(), vec![1]);
    }
}
