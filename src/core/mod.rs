//! Core terminal emulation.
//!
//! - **pty**: Windows ConPTY wrapper (process + pseudo console handles)
//! - **term**: VT100 screen buffer and escape-sequence interpreter
//! - **session**: one PTY + one screen + one reader thread
//!
//! ```text
//! TerminalSession
//! ├── ConPty            (shell process + pty I/O)
//! ├── Arc<Mutex<Term>>  (screen grid + interpreter, shared with the reader)
//! └── reader thread     (drains the pty, feeds the term, signals repaints)
//! ```

pub mod pty;
pub mod session;
pub mod term;
