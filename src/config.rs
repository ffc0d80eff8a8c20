//! Configuration and color palettes.
//!
//! Configuration is read from `~/.conterm/config.toml`:
//!
//! ```toml
//! # Default shell (optional)
//! shell = "pwsh.exe"
//!
//! # Console codepage (65001 for UTF-8)
//! codepage = 65001
//!
//! # Palette: campbell, vga, solarized-dark
//! palette = "campbell"
//! ```

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::term::{Color, Style, StyleFlags};

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default shell command.
    pub shell: Option<String>,
    /// Console codepage handed to new shells.
    pub codepage: Option<u32>,
    /// Palette name.
    pub palette: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            codepage: Some(65001),
            palette: "campbell".to_string(),
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    #[allow(dead_code)]
    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or("could not determine config path")?;
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {e}"))?;
        fs::write(&path, content).map_err(|e| format!("failed to write config: {e}"))
    }

    fn config_path() -> Option<PathBuf> {
        let dir = home_dir()?.join(".conterm");
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir.join("config.toml"))
    }

    pub fn palette(&self) -> Palette {
        Palette::by_name(&self.palette)
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

/// 24-bit color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// The 16-entry ANSI table plus default foreground/background and the cursor
/// block color.
#[derive(Debug, Clone)]
pub struct Palette {
    pub name: &'static str,
    pub colors: [Rgb; 16],
    pub foreground: Rgb,
    pub background: Rgb,
    pub cursor: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self::campbell()
    }
}

impl Palette {
    /// The Windows Terminal default scheme.
    pub fn campbell() -> Self {
        Self {
            name: "campbell",
            colors: [
                Rgb::new(0x0c, 0x0c, 0x0c),
                Rgb::new(0xc5, 0x0f, 0x1f),
                Rgb::new(0x13, 0xa1, 0x0e),
                Rgb::new(0xc1, 0x9c, 0x00),
                Rgb::new(0x00, 0x37, 0xda),
                Rgb::new(0x88, 0x17, 0x98),
                Rgb::new(0x3a, 0x96, 0xdd),
                Rgb::new(0xcc, 0xcc, 0xcc),
                Rgb::new(0x76, 0x76, 0x76),
                Rgb::new(0xe7, 0x48, 0x56),
                Rgb::new(0x16, 0xc6, 0x0c),
                Rgb::new(0xf9, 0xf1, 0xa5),
                Rgb::new(0x3b, 0x78, 0xff),
                Rgb::new(0xb4, 0x00, 0x9e),
                Rgb::new(0x61, 0xd6, 0xd6),
                Rgb::new(0xf2, 0xf2, 0xf2),
            ],
            foreground: Rgb::new(0xcc, 0xcc, 0xcc),
            background: Rgb::new(0x0c, 0x0c, 0x0c),
            cursor: Rgb::new(0xf2, 0xf2, 0xf2),
        }
    }

    /// Classic VGA colors.
    pub fn vga() -> Self {
        Self {
            name: "vga",
            colors: [
                Rgb::new(0x00, 0x00, 0x00),
                Rgb::new(0xaa, 0x00, 0x00),
                Rgb::new(0x00, 0xaa, 0x00),
                Rgb::new(0xaa, 0x55, 0x00),
                Rgb::new(0x00, 0x00, 0xaa),
                Rgb::new(0xaa, 0x00, 0xaa),
                Rgb::new(0x00, 0xaa, 0xaa),
                Rgb::new(0xaa, 0xaa, 0xaa),
                Rgb::new(0x55, 0x55, 0x55),
                Rgb::new(0xff, 0x55, 0x55),
                Rgb::new(0x55, 0xff, 0x55),
                Rgb::new(0xff, 0xff, 0x55),
                Rgb::new(0x55, 0x55, 0xff),
                Rgb::new(0xff, 0x55, 0xff),
                Rgb::new(0x55, 0xff, 0xff),
                Rgb::new(0xff, 0xff, 0xff),
            ],
            foreground: Rgb::new(0xaa, 0xaa, 0xaa),
            background: Rgb::new(0x00, 0x00, 0x00),
            cursor: Rgb::new(0xff, 0xff, 0xff),
        }
    }

    /// Ethan Schoonover's Solarized, dark variant.
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark",
            colors: [
                Rgb::new(0x07, 0x36, 0x42),
                Rgb::new(0xdc, 0x32, 0x2f),
                Rgb::new(0x85, 0x99, 0x00),
                Rgb::new(0xb5, 0x89, 0x00),
                Rgb::new(0x26, 0x8b, 0xd2),
                Rgb::new(0xd3, 0x36, 0x82),
                Rgb::new(0x2a, 0xa1, 0x98),
                Rgb::new(0xee, 0xe8, 0xd5),
                Rgb::new(0x00, 0x2b, 0x36),
                Rgb::new(0xcb, 0x4b, 0x16),
                Rgb::new(0x58, 0x6e, 0x75),
                Rgb::new(0x65, 0x7b, 0x83),
                Rgb::new(0x83, 0x94, 0x96),
                Rgb::new(0x6c, 0x71, 0xc4),
                Rgb::new(0x93, 0xa1, 0xa1),
                Rgb::new(0xfd, 0xf6, 0xe3),
            ],
            foreground: Rgb::new(0x83, 0x94, 0x96),
            background: Rgb::new(0x00, 0x2b, 0x36),
            cursor: Rgb::new(0x93, 0xa1, 0xa1),
        }
    }

    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "vga" => Self::vga(),
            "solarized-dark" | "solarized_dark" | "solarized" => Self::solarized_dark(),
            _ => Self::campbell(),
        }
    }

    pub fn list() -> Vec<&'static str> {
        vec!["campbell", "vga", "solarized-dark"]
    }

    /// Resolve a cell color. `bold` promotes the classic 0-7 range to its
    /// bright counterpart; the default color resolves to `default`.
    fn resolve(&self, color: Color, bold: bool, default: Rgb) -> Rgb {
        match color {
            Color::Default => default,
            Color::Indexed(n) if n < 8 && bold => self.colors[n as usize + 8],
            Color::Indexed(n) if n < 16 => self.colors[n as usize],
            Color::Indexed(n) => xterm_256(n),
            Color::Rgb(r, g, b) => Rgb::new(r, g, b),
        }
    }

    /// Effective (foreground, background) of a styled cell. The background
    /// is `None` when the renderer's own background already covers it.
    pub fn cell_colors(&self, style: &Style) -> (Rgb, Option<Rgb>) {
        let bold = style.flags.contains(StyleFlags::BOLD);
        let mut fg = self.resolve(style.fg, bold, self.foreground);
        let mut bg = match style.bg {
            Color::Default => None,
            other => Some(self.resolve(other, false, self.background)),
        };
        if style.flags.contains(StyleFlags::INVERSE) {
            let swapped = bg.unwrap_or(self.background);
            bg = Some(fg);
            fg = swapped;
        }
        (fg, bg)
    }
}

/// The fixed xterm 256-color values above the 16-entry table: a 6x6x6 color
/// cube followed by a 24-step grayscale ramp.
fn xterm_256(index: u8) -> Rgb {
    if index < 16 {
        // Callers resolve these through the palette; keep a sane fallback.
        return Rgb::new(0xcc, 0xcc, 0xcc);
    }
    if index < 232 {
        let v = index - 16;
        let scale = |c: u8| if c == 0 { 0 } else { 55 + 40 * c };
        Rgb::new(scale(v / 36), scale((v / 6) % 6), scale(v % 6))
    } else {
        let gray = 8 + 10 * (index - 232);
        Rgb::new(gray, gray, gray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_lookup_is_forgiving() {
        assert_eq!(Palette::by_name("vga").name, "vga");
        assert_eq!(Palette::by_name("Solarized-Dark").name, "solarized-dark");
        assert_eq!(Palette::by_name("no-such-scheme").name, "campbell");
    }

    #[test]
    fn default_foreground_is_not_indexed_white() {
        let palette = Palette::campbell();
        let style = Style::default();
        let (fg, bg) = palette.cell_colors(&style);
        assert_eq!(fg, palette.foreground);
        assert_eq!(bg, None);
    }

    #[test]
    fn bold_promotes_classic_colors() {
        let palette = Palette::campbell();
        let mut style = Style {
            fg: Color::Indexed(1),
            ..Style::default()
        };
        style.flags |= StyleFlags::BOLD;
        let (fg, _) = palette.cell_colors(&style);
        assert_eq!(fg, palette.colors[9]);
    }

    #[test]
    fn inverse_swaps_foreground_and_background() {
        let palette = Palette::campbell();
        let style = Style {
            fg: Color::Indexed(2),
            bg: Color::Default,
            flags: StyleFlags::INVERSE,
        };
        let (fg, bg) = palette.cell_colors(&style);
        assert_eq!(fg, palette.background);
        assert_eq!(bg, Some(palette.colors[2]));
    }

    #[test]
    fn color_cube_and_grayscale() {
        assert_eq!(xterm_256(16), Rgb::new(0, 0, 0));
        assert_eq!(xterm_256(231), Rgb::new(255, 255, 255));
        assert_eq!(xterm_256(232), Rgb::new(8, 8, 8));
        assert_eq!(xterm_256(255), Rgb::new(238, 238, 238));
    }
}
