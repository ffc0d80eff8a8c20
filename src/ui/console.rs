//! Console-backed paint surface.
//!
//! Drives the canvas inside a host console via crossterm, treating one
//! character cell as a 1x1 "pixel". Draw calls land in an off-screen cell
//! buffer; `flush` writes the whole frame out in one pass.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableBracketedPaste, EnableBracketedPaste},
    queue,
    style::{
        Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor,
    },
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::UnicodeWidthChar;

use crate::config::Rgb;
use crate::core::term::StyleFlags;
use crate::ui::canvas::{FontMetrics, Surface};

fn to_crossterm(color: Rgb) -> crossterm::style::Color {
    crossterm::style::Color::Rgb {
        r: color.r,
        g: color.g,
        b: color.b,
    }
}

#[derive(Clone, Copy)]
struct Slot {
    ch: char,
    fg: Rgb,
    bg: Rgb,
    flags: StyleFlags,
    /// Trailing half of a double-width glyph; skipped when flushing.
    wide_tail: bool,
}

impl Slot {
    fn blank(bg: Rgb) -> Self {
        Self {
            ch: ' ',
            fg: bg,
            bg,
            flags: StyleFlags::empty(),
            wide_tail: false,
        }
    }
}

/// A crossterm-rendered frame buffer implementing [`Surface`].
pub struct ConsoleSurface {
    cols: u16,
    rows: u16,
    slots: Vec<Slot>,
    initialized: bool,
}

impl ConsoleSurface {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            slots: vec![Slot::blank(Rgb::new(0, 0, 0)); cols as usize * rows as usize],
            initialized: false,
        }
    }

    /// One console cell per surface unit.
    pub fn metrics() -> FontMetrics {
        FontMetrics {
            char_width: 1,
            char_height: 1,
        }
    }

    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        self.slots = vec![Slot::blank(Rgb::new(0, 0, 0)); cols as usize * rows as usize];
    }

    /// Put the host console into raw, alternate-screen mode.
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        queue!(
            stdout,
            EnterAlternateScreen,
            EnableBracketedPaste,
            Hide,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        stdout.flush()?;
        self.initialized = true;
        Ok(())
    }

    /// Restore the host console. Safe to call more than once.
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;
        let mut stdout = io::stdout();
        let _ = queue!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Show,
            EnableLineWrap,
            DisableBracketedPaste,
            LeaveAlternateScreen
        );
        let _ = stdout.flush();
        terminal::disable_raw_mode()
    }

    fn slot_mut(&mut self, x: u32, y: u32) -> Option<&mut Slot> {
        if x >= self.cols as u32 || y >= self.rows as u32 {
            return None;
        }
        self.slots.get_mut(y as usize * self.cols as usize + x as usize)
    }

    /// Write the current frame to the console.
    pub fn flush(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout();
        for row in 0..self.rows {
            queue!(stdout, MoveTo(0, row))?;
            for col in 0..self.cols {
                let slot = self.slots[row as usize * self.cols as usize + col as usize];
                if slot.wide_tail {
                    continue;
                }
                queue!(
                    stdout,
                    SetAttribute(Attribute::Reset),
                    SetForegroundColor(to_crossterm(slot.fg)),
                    SetBackgroundColor(to_crossterm(slot.bg)),
                )?;
                if slot.flags.contains(StyleFlags::BOLD) {
                    queue!(stdout, SetAttribute(Attribute::Bold))?;
                }
                if slot.flags.contains(StyleFlags::DIM) {
                    queue!(stdout, SetAttribute(Attribute::Dim))?;
                }
                if slot.flags.contains(StyleFlags::ITALIC) {
                    queue!(stdout, SetAttribute(Attribute::Italic))?;
                }
                if slot.flags.contains(StyleFlags::UNDERLINE) {
                    queue!(stdout, SetAttribute(Attribute::Underlined))?;
                }
                if slot.flags.contains(StyleFlags::STRIKETHROUGH) {
                    queue!(stdout, SetAttribute(Attribute::CrossedOut))?;
                }
                queue!(stdout, Print(slot.ch))?;
            }
        }
        queue!(stdout, SetAttribute(Attribute::Reset), ResetColor)?;
        stdout.flush()
    }
}

impl Surface for ConsoleSurface {
    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgb) {
        for row in y..y.saturating_add(height) {
            for col in x..x.saturating_add(width) {
                if let Some(slot) = self.slot_mut(col, row) {
                    *slot = Slot::blank(color);
                }
            }
        }
    }

    fn draw_text(&mut self, x: u32, y: u32, text: &str, color: Rgb, flags: StyleFlags) {
        let mut col = x;
        for ch in text.chars() {
            let width = ch.width().unwrap_or(0) as u32;
            if width == 0 {
                continue;
            }
            if let Some(slot) = self.slot_mut(col, y) {
                slot.ch = ch;
                slot.fg = color;
                slot.flags = flags;
                slot.wide_tail = false;
            }
            if width == 2 {
                if let Some(tail) = self.slot_mut(col + 1, y) {
                    tail.wide_tail = true;
                }
            }
            col += width;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_calls_land_in_the_cell_buffer() {
        let mut surface = ConsoleSurface::new(4, 2);
        let bg = Rgb::new(1, 2, 3);
        let fg = Rgb::new(9, 9, 9);

        surface.fill_rect(0, 0, 4, 2, bg);
        surface.draw_text(1, 0, "a", fg, StyleFlags::BOLD);

        let slot = surface.slots[1];
        assert_eq!(slot.ch, 'a');
        assert_eq!(slot.fg, fg);
        assert_eq!(slot.bg, bg);
        assert!(slot.flags.contains(StyleFlags::BOLD));
        // Neighbours keep the fill.
        assert_eq!(surface.slots[0].ch, ' ');
        assert_eq!(surface.slots[0].bg, bg);
    }

    #[test]
    fn out_of_bounds_draws_are_clipped() {
        let mut surface = ConsoleSurface::new(2, 2);
        surface.fill_rect(0, 0, 100, 100, Rgb::new(5, 5, 5));
        surface.draw_text(50, 50, "x", Rgb::new(1, 1, 1), StyleFlags::empty());
        assert_eq!(surface.slots.len(), 4);
    }

    #[test]
    fn wide_glyphs_mark_a_tail_cell() {
        let mut surface = ConsoleSurface::new(4, 1);
        surface.draw_text(0, 0, "あ", Rgb::new(1, 1, 1), StyleFlags::empty());
        assert_eq!(surface.slots[0].ch, 'あ');
        assert!(surface.slots[1].wide_tail);
    }
}
