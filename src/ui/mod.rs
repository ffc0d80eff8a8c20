//! Rendering and input.
//!
//! - **canvas**: surface-agnostic screen renderer + pixel-to-grid math
//! - **input**: key events to PTY byte sequences
//! - **console**: crossterm-backed [`canvas::Surface`] for console hosts

pub mod canvas;
pub mod console;
pub mod input;

pub use canvas::{Canvas, FontMetrics, Surface};
pub use console::ConsoleSurface;
pub use input::InputEncoder;
