//! Terminal canvas: paints a screen onto an abstract surface.
//!
//! The canvas owns no pixels. The host hands it a [`Surface`] (its drawing
//! primitives) and the canvas walks the grid: background rectangle, per-cell
//! backgrounds, glyphs, cursor block. It also owns the pixel-to-grid math
//! used when the host's surface changes size.

use crate::config::{Palette, Rgb};
use crate::core::term::{Screen, StyleFlags};

/// Drawing primitives supplied by the host windowing system.
pub trait Surface {
    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgb);
    /// Draw `text` with its top-left corner at (`x`, `y`) in a fixed-width
    /// font. `flags` carries bold/underline/italic hints.
    fn draw_text(&mut self, x: u32, y: u32, text: &str, color: Rgb, flags: StyleFlags);
}

/// Cell box of the fixed-width font in surface units.
#[derive(Debug, Clone, Copy)]
pub struct FontMetrics {
    pub char_width: u32,
    pub char_height: u32,
}

pub const DEFAULT_MIN_COLS: u16 = 2;
pub const DEFAULT_MIN_ROWS: u16 = 2;

/// Surface-agnostic renderer for one terminal screen.
pub struct Canvas {
    metrics: FontMetrics,
    palette: Palette,
    min_cols: u16,
    min_rows: u16,
}

impl Canvas {
    pub fn new(metrics: FontMetrics, palette: Palette) -> Self {
        Self {
            metrics,
            palette,
            min_cols: DEFAULT_MIN_COLS,
            min_rows: DEFAULT_MIN_ROWS,
        }
    }

    /// Lower bound on the computed grid, for hosts that cannot render
    /// arbitrarily small terminals.
    pub fn with_min_grid(mut self, min_cols: u16, min_rows: u16) -> Self {
        self.min_cols = min_cols.max(1);
        self.min_rows = min_rows.max(1);
        self
    }

    /// Grid dimensions for a surface of the given size: whole cells that
    /// fit, floored at the minimum grid.
    pub fn grid_size(&self, width: u32, height: u32) -> (u16, u16) {
        let cols = (width / self.metrics.char_width.max(1)).min(u16::MAX as u32) as u16;
        let rows = (height / self.metrics.char_height.max(1)).min(u16::MAX as u32) as u16;
        (cols.max(self.min_cols), rows.max(self.min_rows))
    }

    /// Paint the whole screen. Always reflects the buffer state at the time
    /// of the call; it is safe to coalesce multiple updates into one paint.
    pub fn render(&self, screen: &Screen, surface: &mut dyn Surface) {
        let cw = self.metrics.char_width;
        let ch = self.metrics.char_height;

        surface.fill_rect(
            0,
            0,
            screen.cols() as u32 * cw,
            screen.rows() as u32 * ch,
            self.palette.background,
        );

        let mut glyph = [0u8; 4];
        for row in 0..screen.rows() {
            let Some(line) = screen.line(row) else {
                continue;
            };
            let y = row as u32 * ch;
            for (col, cell) in line.iter().enumerate() {
                if cell.is_spacer() {
                    continue;
                }
                let x = col as u32 * cw;
                let (fg, bg) = self.palette.cell_colors(&cell.style);
                if let Some(bg) = bg {
                    surface.fill_rect(x, y, cw * cell.width as u32, ch, bg);
                }
                if cell.ch != ' ' && !cell.style.flags.contains(StyleFlags::HIDDEN) {
                    surface.draw_text(x, y, cell.ch.encode_utf8(&mut glyph), fg, cell.style.flags);
                }
            }
        }

        self.render_cursor(screen, surface);
    }

    fn render_cursor(&self, screen: &Screen, surface: &mut dyn Surface) {
        let cursor = screen.cursor();
        if !cursor.visible || cursor.row >= screen.rows() || cursor.col >= screen.cols() {
            return;
        }
        let cw = self.metrics.char_width;
        let ch = self.metrics.char_height;
        let x = cursor.col as u32 * cw;
        let y = cursor.row as u32 * ch;
        surface.fill_rect(x, y, cw, ch, self.palette.cursor);

        // Keep the glyph under the block legible.
        if let Some(cell) = screen.cell(cursor.row, cursor.col) {
            if cell.ch != ' ' {
                let mut glyph = [0u8; 4];
                surface.draw_text(
                    x,
                    y,
                    cell.ch.encode_utf8(&mut glyph),
                    self.palette.background,
                    cell.style.flags,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::Term;

    const METRICS: FontMetrics = FontMetrics {
        char_width: 8,
        char_height: 16,
    };

    /// Records draw calls for inspection.
    #[derive(Default)]
    struct Recorder {
        rects: Vec<(u32, u32, u32, u32, Rgb)>,
        texts: Vec<(u32, u32, String, Rgb)>,
    }

    impl Surface for Recorder {
        fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, color: Rgb) {
            self.rects.push((x, y, width, height, color));
        }

        fn draw_text(&mut self, x: u32, y: u32, text: &str, color: Rgb, _flags: StyleFlags) {
            self.texts.push((x, y, text.to_string(), color));
        }
    }

    fn canvas() -> Canvas {
        Canvas::new(METRICS, Palette::campbell())
    }

    #[test]
    fn grid_size_floors_to_whole_cells() {
        let canvas = canvas().with_min_grid(20, 5);
        assert_eq!(canvas.grid_size(807, 482), (100, 30));
        // Too small: clamped to the minimum grid.
        assert_eq!(canvas.grid_size(30, 10), (20, 5));
    }

    #[test]
    fn render_draws_background_glyphs_and_cursor() {
        let canvas = canvas();
        let mut term = Term::new(10, 4);
        term.feed(b"hi");

        let mut surface = Recorder::default();
        canvas.render(&term.screen, &mut surface);

        // Full background first.
        assert_eq!(surface.rects[0], (0, 0, 80, 64, Palette::campbell().background));
        // Both glyphs in default foreground at cell positions.
        assert_eq!(
            surface.texts,
            vec![
                (0, 0, "h".to_string(), Palette::campbell().foreground),
                (8, 0, "i".to_string(), Palette::campbell().foreground),
            ]
        );
        // Cursor block at column 2.
        assert!(surface
            .rects
            .contains(&(16, 0, 8, 16, Palette::campbell().cursor)));
    }

    #[test]
    fn render_skips_default_backgrounds() {
        let canvas = canvas();
        let mut term = Term::new(10, 2);
        term.feed(b"\x1b[41mx\x1b[0my");

        let mut surface = Recorder::default();
        canvas.render(&term.screen, &mut surface);

        // One background rect for the whole screen, one for the red cell,
        // one for the cursor: nothing for 'y'.
        assert_eq!(surface.rects.len(), 3);
        assert_eq!(surface.rects[1], (0, 0, 8, 16, Palette::campbell().colors[1]));
    }

    #[test]
    fn empty_screen_renders_without_glyphs() {
        let canvas = canvas();
        let term = Term::new(5, 3);

        let mut surface = Recorder::default();
        canvas.render(&term.screen, &mut surface);

        assert!(surface.texts.is_empty());
        // Background plus cursor block.
        assert_eq!(surface.rects.len(), 2);
    }

    #[test]
    fn hidden_cursor_draws_no_block() {
        let canvas = canvas();
        let mut term = Term::new(5, 3);
        term.feed(b"\x1b[?25l");

        let mut surface = Recorder::default();
        canvas.render(&term.screen, &mut surface);
        assert_eq!(surface.rects.len(), 1);
    }
}
