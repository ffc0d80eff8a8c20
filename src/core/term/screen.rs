//! Screen buffer: a grid of styled cells plus cursor state.
//!
//! The grid is owned by one session and mutated only through the operations
//! below, which keep the cursor inside `0..rows` x `0..cols` at all times.

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

/// Foreground/background color of a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    /// Whatever the renderer's palette defines as default.
    #[default]
    Default,
    /// ANSI indexed color (0-15 classic, 16-255 extended).
    Indexed(u8),
    /// 24-bit color.
    Rgb(u8, u8, u8),
}

bitflags! {
    /// Text attribute flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StyleFlags: u8 {
        const BOLD          = 0b0000_0001;
        const DIM           = 0b0000_0010;
        const ITALIC        = 0b0000_0100;
        const UNDERLINE     = 0b0000_1000;
        const BLINK         = 0b0001_0000;
        const INVERSE       = 0b0010_0000;
        const HIDDEN        = 0b0100_0000;
        const STRIKETHROUGH = 0b1000_0000;
    }
}

/// The rendition carried forward until changed by an SGR sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub flags: StyleFlags,
}

impl Style {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One character position in the grid.
///
/// A double-width character occupies two cells: the head holds the character
/// with `width == 2`, the spacer that follows has `width == 0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub width: u8,
    pub style: Style,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            width: 1,
            style: Style::default(),
        }
    }
}

impl Cell {
    fn blank(style: Style) -> Self {
        Self {
            ch: ' ',
            width: 1,
            style,
        }
    }

    fn spacer(style: Style) -> Self {
        Self {
            ch: ' ',
            width: 0,
            style,
        }
    }

    /// True for the trailing half of a double-width character.
    pub fn is_spacer(&self) -> bool {
        self.width == 0
    }
}

/// Cursor position and visibility.
#[derive(Clone, Copy, Debug)]
pub struct Cursor {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct SavedCursor {
    col: u16,
    row: u16,
    pen: Style,
}

/// Input-relevant terminal modes.
#[derive(Clone, Copy, Debug)]
pub struct Modes {
    pub auto_wrap: bool,
    pub application_cursor: bool,
    pub bracketed_paste: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            auto_wrap: true,
            application_cursor: false,
            bracketed_paste: false,
        }
    }
}

const TAB_WIDTH: u16 = 8;

/// The addressable cell grid of one terminal.
pub struct Screen {
    cols: u16,
    rows: u16,
    lines: Vec<Vec<Cell>>,
    cursor: Cursor,
    pen: Style,
    saved: Option<SavedCursor>,
    /// Scroll region (top, bottom), 0-indexed, inclusive.
    scroll_region: (u16, u16),
    modes: Modes,
    /// Window title set via OSC 0/1/2.
    pub title: String,
}

impl Screen {
    pub fn new(cols: u16, rows: u16) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            lines: (0..rows).map(|_| vec![Cell::default(); cols as usize]).collect(),
            cursor: Cursor::default(),
            pen: Style::default(),
            saved: None,
            scroll_region: (0, rows - 1),
            modes: Modes::default(),
            title: String::new(),
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn modes(&self) -> Modes {
        self.modes
    }

    pub fn line(&self, row: u16) -> Option<&[Cell]> {
        self.lines.get(row as usize).map(|l| l.as_slice())
    }

    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.lines.get(row as usize).and_then(|l| l.get(col as usize))
    }

    pub fn pen_mut(&mut self) -> &mut Style {
        &mut self.pen
    }

    /// Plain text of one row, trailing blanks trimmed.
    #[allow(dead_code)]
    pub fn row_text(&self, row: u16) -> String {
        let mut text = String::new();
        if let Some(line) = self.line(row) {
            for cell in line.iter().filter(|c| !c.is_spacer()) {
                text.push(cell.ch);
            }
        }
        let trimmed = text.trim_end().len();
        text.truncate(trimmed);
        text
    }

    fn blank_line(&self) -> Vec<Cell> {
        vec![Cell::default(); self.cols as usize]
    }

    /// Write a printable character at the cursor and advance it, wrapping to
    /// the next row (scrolling at the bottom of the scroll region) when the
    /// end of the line is passed.
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;
        // Zero-width input (combining marks and the like) is dropped rather
        // than corrupting the grid.
        if width == 0 || width > self.cols {
            return;
        }

        if self.cursor.col + width > self.cols {
            if self.modes.auto_wrap {
                self.cursor.col = 0;
                self.linefeed();
            } else {
                self.cursor.col = self.cols - width;
            }
        }

        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;

        self.unsplit_wide(row, col);
        if width == 2 {
            self.unsplit_wide(row, col + 1);
        }

        self.lines[row][col] = Cell {
            ch,
            width: width as u8,
            style: self.pen,
        };
        if width == 2 {
            self.lines[row][col + 1] = Cell::spacer(self.pen);
        }

        self.cursor.col += width;
        if self.cursor.col >= self.cols {
            if self.modes.auto_wrap {
                self.cursor.col = 0;
                self.linefeed();
            } else {
                self.cursor.col = self.cols - 1;
            }
        }
    }

    /// Overwriting either half of a double-width character blanks the other
    /// half so no orphaned spacer survives.
    fn unsplit_wide(&mut self, row: usize, col: usize) {
        if col >= self.cols as usize {
            return;
        }
        if self.lines[row][col].is_spacer() && col > 0 {
            self.lines[row][col - 1] = Cell::blank(self.pen);
        }
        if self.lines[row][col].width == 2 && col + 1 < self.cols as usize {
            self.lines[row][col + 1] = Cell::blank(self.pen);
        }
    }

    pub fn carriage_return(&mut self) {
        self.cursor.col = 0;
    }

    /// Move the cursor down one row, scrolling when at the bottom of the
    /// scroll region.
    pub fn linefeed(&mut self) {
        if self.cursor.row == self.scroll_region.1 {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
        }
    }

    pub fn backspace(&mut self) {
        self.cursor.col = self.cursor.col.saturating_sub(1);
    }

    /// Advance to the next tab stop (fixed 8-column stops), clamped to the
    /// last column.
    pub fn horizontal_tab(&mut self) {
        self.cursor.col = ((self.cursor.col / TAB_WIDTH + 1) * TAB_WIDTH).min(self.cols - 1);
    }

    /// Scroll the region up by `n`: the top row is discarded, a blank row
    /// appears at the bottom.
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        for _ in 0..n.min(bottom - top + 1) {
            self.lines.remove(top as usize);
            self.lines.insert(bottom as usize, self.blank_line());
        }
    }

    /// Scroll the region down by `n`: a blank row appears at the top.
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        for _ in 0..n.min(bottom - top + 1) {
            self.lines.remove(bottom as usize);
            self.lines.insert(top as usize, self.blank_line());
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        self.cursor.row = self.cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.cursor.row = (self.cursor.row + n).min(self.rows - 1);
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor.col = (self.cursor.col + n).min(self.cols - 1);
    }

    pub fn cursor_backward(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_sub(n);
    }

    /// Absolute cursor position, 1-indexed parameters clamped into bounds.
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor.row = row.saturating_sub(1).min(self.rows - 1);
        self.cursor.col = col.saturating_sub(1).min(self.cols - 1);
    }

    /// Absolute column (CHA), 1-indexed.
    pub fn cursor_column(&mut self, col: u16) {
        self.cursor.col = col.saturating_sub(1).min(self.cols - 1);
    }

    /// Absolute row (VPA), 1-indexed.
    pub fn cursor_row(&mut self, row: u16) {
        self.cursor.row = row.saturating_sub(1).min(self.rows - 1);
    }

    fn clear_line(&mut self, row: usize) {
        let pen = self.pen;
        for cell in &mut self.lines[row] {
            *cell = Cell::blank(pen);
        }
    }

    /// Erase in display: 0 = cursor to end, 1 = start to cursor, 2/3 = all.
    pub fn erase_in_display(&mut self, mode: u16) {
        let row = self.cursor.row as usize;
        match mode {
            0 => {
                self.erase_in_line(0);
                for r in row + 1..self.rows as usize {
                    self.clear_line(r);
                }
            }
            1 => {
                for r in 0..row {
                    self.clear_line(r);
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                for r in 0..self.rows as usize {
                    self.clear_line(r);
                }
            }
            _ => {}
        }
    }

    /// Erase in line: 0 = cursor to end, 1 = start through cursor, 2 = all.
    pub fn erase_in_line(&mut self, mode: u16) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let pen = self.pen;
        let line = &mut self.lines[row];
        let range = match mode {
            0 => col..line.len(),
            1 => 0..(col + 1).min(line.len()),
            2 => 0..line.len(),
            _ => return,
        };
        for cell in &mut line[range] {
            *cell = Cell::blank(pen);
        }
    }

    /// Insert blank lines at the cursor, pushing rows below it out of the
    /// scroll region. No-op when the cursor is outside the region.
    pub fn insert_lines(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let row = self.cursor.row;
        if row < top || row > bottom {
            return;
        }
        for _ in 0..n.min(bottom - row + 1) {
            self.lines.remove(bottom as usize);
            self.lines.insert(row as usize, self.blank_line());
        }
    }

    /// Delete lines at the cursor, pulling blank rows in at the bottom of the
    /// scroll region.
    pub fn delete_lines(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let row = self.cursor.row;
        if row < top || row > bottom {
            return;
        }
        for _ in 0..n.min(bottom - row + 1) {
            self.lines.remove(row as usize);
            self.lines.insert(bottom as usize, self.blank_line());
        }
    }

    /// Insert blank cells at the cursor, shifting the rest of the line right.
    pub fn insert_chars(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let pen = self.pen;
        for _ in 0..n.min(self.cols - self.cursor.col) {
            self.lines[row].pop();
            self.lines[row].insert(col, Cell::blank(pen));
        }
    }

    /// Delete cells at the cursor, shifting the rest of the line left.
    pub fn delete_chars(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let pen = self.pen;
        for _ in 0..n.min(self.cols - self.cursor.col) {
            self.lines[row].remove(col);
            self.lines[row].push(Cell::blank(pen));
        }
    }

    /// Blank `n` cells starting at the cursor without shifting.
    pub fn erase_chars(&mut self, n: u16) {
        let row = self.cursor.row as usize;
        let col = self.cursor.col as usize;
        let pen = self.pen;
        let end = (col + n as usize).min(self.cols as usize);
        for cell in &mut self.lines[row][col..end] {
            *cell = Cell::blank(pen);
        }
    }

    /// Set the scroll region from 1-indexed parameters (DECSTBM). `bottom`
    /// of 0 means the last row.
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let top = top.max(1) - 1;
        let bottom = if bottom == 0 {
            self.rows - 1
        } else {
            (bottom - 1).min(self.rows - 1)
        };
        if top < bottom {
            self.scroll_region = (top, bottom);
        }
    }

    pub fn save_cursor(&mut self) {
        self.saved = Some(SavedCursor {
            col: self.cursor.col,
            row: self.cursor.row,
            pen: self.pen,
        });
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved {
            self.cursor.col = saved.col.min(self.cols - 1);
            self.cursor.row = saved.row.min(self.rows - 1);
            self.pen = saved.pen;
        }
    }

    /// Cursor up one row, scrolling down when at the top of the region (RI).
    pub fn reverse_index(&mut self) {
        if self.cursor.row == self.scroll_region.0 {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Cursor down one row, scrolling at the bottom of the region (IND).
    pub fn index(&mut self) {
        self.linefeed();
    }

    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.application_cursor = enable,
            7 => self.modes.auto_wrap = enable,
            25 => self.cursor.visible = enable,
            2004 => self.modes.bracketed_paste = enable,
            _ => tracing::trace!(mode, enable, "ignoring private mode"),
        }
    }

    /// Full reset (RIS): fresh grid, default cursor, pen and modes.
    pub fn reset(&mut self) {
        *self = Screen::new(self.cols, self.rows);
    }

    /// Resize the grid in place, preserving the top-left content that fits.
    /// Rows are added/removed at the bottom, columns at the right; the cursor
    /// is clamped into the new bounds.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        if cols == self.cols && rows == self.rows {
            return;
        }
        for line in &mut self.lines {
            line.resize(cols as usize, Cell::default());
        }
        self.lines
            .resize_with(rows as usize, || vec![Cell::default(); cols as usize]);
        self.cols = cols;
        self.rows = rows;
        self.scroll_region = (0, rows - 1);
        self.cursor.col = self.cursor.col.min(cols - 1);
        self.cursor.row = self.cursor.row.min(rows - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(screen: &mut Screen, text: &str) {
        for ch in text.chars() {
            match ch {
                '\r' => screen.carriage_return(),
                '\n' => screen.linefeed(),
                _ => screen.put_char(ch),
            }
        }
    }

    #[test]
    fn printable_fill_wraps_and_leaves_rest_untouched() {
        let mut screen = Screen::new(4, 3);
        feed_str(&mut screen, "abcdef");

        assert_eq!(screen.row_text(0), "abcd");
        assert_eq!(screen.row_text(1), "ef");
        // Cells beyond the written range keep their initial state.
        assert_eq!(screen.cell(1, 2), Some(&Cell::default()));
        assert_eq!(screen.cell(2, 0), Some(&Cell::default()));
    }

    #[test]
    fn write_at_bottom_right_scrolls_exactly_once() {
        let mut screen = Screen::new(5, 3);
        feed_str(&mut screen, "top\r\n");
        screen.cursor_position(3, 5);
        screen.put_char('x');

        // Top row discarded, bottom row blanked, cursor at (rows-1, 0).
        assert_eq!(screen.row_text(0), "");
        assert_eq!(screen.row_text(1), "    x");
        assert_eq!(screen.row_text(2), "");
        assert_eq!(screen.cursor().row, 2);
        assert_eq!(screen.cursor().col, 0);
    }

    #[test]
    fn hello_world_scenario() {
        let mut screen = Screen::new(80, 24);
        feed_str(&mut screen, "Hello\r\nWorld");

        assert_eq!(screen.row_text(0), "Hello");
        assert_eq!(screen.row_text(1), "World");
        assert_eq!(screen.cursor().row, 1);
        assert_eq!(screen.cursor().col, 5);
    }

    #[test]
    fn backspace_floors_at_column_zero() {
        let mut screen = Screen::new(10, 2);
        screen.backspace();
        assert_eq!(screen.cursor().col, 0);
        feed_str(&mut screen, "ab");
        screen.backspace();
        assert_eq!(screen.cursor().col, 1);
    }

    #[test]
    fn tab_advances_to_eight_column_stops() {
        let mut screen = Screen::new(20, 2);
        screen.horizontal_tab();
        assert_eq!(screen.cursor().col, 8);
        screen.put_char('x');
        screen.horizontal_tab();
        assert_eq!(screen.cursor().col, 16);
        screen.horizontal_tab();
        // Clamped to the last column.
        assert_eq!(screen.cursor().col, 19);
    }

    #[test]
    fn resize_round_trip_preserves_top_left() {
        let mut screen = Screen::new(10, 4);
        feed_str(&mut screen, "one\r\ntwo\r\nthree");

        screen.resize(6, 2);
        screen.resize(10, 4);

        assert_eq!(screen.row_text(0), "one");
        assert_eq!(screen.row_text(1), "two");
        // Row 2 was cut by the shrink and comes back blank.
        assert_eq!(screen.row_text(2), "");
    }

    #[test]
    fn resize_clamps_cursor() {
        let mut screen = Screen::new(80, 24);
        screen.cursor_position(24, 80);
        screen.resize(10, 5);
        assert_eq!(screen.cursor().row, 4);
        assert_eq!(screen.cursor().col, 9);
    }

    #[test]
    fn erase_in_line_modes() {
        let mut screen = Screen::new(6, 2);
        feed_str(&mut screen, "abcdef");
        screen.cursor_position(1, 3);

        screen.erase_in_line(0);
        assert_eq!(screen.row_text(0), "ab");

        feed_str(&mut screen, "cdef");
        screen.cursor_position(1, 3);
        screen.erase_in_line(1);
        assert_eq!(screen.row_text(0), "   def");
    }

    #[test]
    fn scroll_region_confines_linefeed() {
        let mut screen = Screen::new(5, 4);
        feed_str(&mut screen, "aa\r\nbb\r\ncc\r\ndd");
        screen.set_scroll_region(2, 3);
        screen.cursor_position(3, 1);
        screen.linefeed();

        // Rows outside the region are untouched; row 1 scrolled away.
        assert_eq!(screen.row_text(0), "aa");
        assert_eq!(screen.row_text(1), "cc");
        assert_eq!(screen.row_text(2), "");
        assert_eq!(screen.row_text(3), "dd");
    }

    #[test]
    fn wide_char_occupies_two_cells() {
        let mut screen = Screen::new(10, 2);
        screen.put_char('あ');
        assert_eq!(screen.cell(0, 0).map(|c| c.ch), Some('あ'));
        assert!(screen.cell(0, 1).is_some_and(Cell::is_spacer));
        assert_eq!(screen.cursor().col, 2);

        // Overwriting the spacer blanks the head.
        screen.cursor_position(1, 2);
        screen.put_char('x');
        assert_eq!(screen.cell(0, 0).map(|c| c.ch), Some(' '));
    }
}
