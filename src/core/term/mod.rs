//! VT100 terminal emulation: screen buffer plus escape-sequence interpreter.
//!
//! ```text
//! Term
//! ├── Screen       (cell grid, cursor, pen, modes, title)
//! └── Interpreter  (escape-sequence state machine + UTF-8 decoding)
//! ```

pub mod parser;
pub mod screen;

pub use parser::{Interpreter, Reply};
pub use screen::{Cell, Color, Cursor, Modes, Screen, Style, StyleFlags};

/// One terminal: a screen buffer driven by its interpreter.
pub struct Term {
    pub screen: Screen,
    interpreter: Interpreter,
}

impl Term {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            screen: Screen::new(cols, rows),
            interpreter: Interpreter::new(),
        }
    }

    /// Apply a chunk of shell output. Returns replies owed to the shell.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Reply> {
        self.interpreter.feed(bytes, &mut self.screen)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.screen.resize(cols, rows);
    }
}
