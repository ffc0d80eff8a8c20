//! Terminal session: one shell process, one screen, one reader thread.
//!
//! The screen state sits behind a mutex shared between exactly two parties:
//! the reader thread feeding shell output into it, and the UI thread reading
//! it while painting. Repaint signalling goes through a channel so the reader
//! never touches the renderer directly.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
#[cfg(windows)]
use std::time::Duration;

#[cfg(windows)]
use tracing::{debug, info, warn};

use super::pty::PtyError;
use super::term::{Screen, Term};

#[cfg(windows)]
use super::pty::ConPty;
#[cfg(windows)]
use std::thread::{self, JoinHandle};

pub type SessionId = u64;

/// How long a shell gets to exit on its own before it is killed.
#[cfg(windows)]
const TERMINATE_GRACE: Duration = Duration::from_millis(250);

/// Idle delay of the reader loop between empty reads. Bounds how long a
/// `close` waits for the reader to observe its stop flag.
#[cfg(windows)]
const READ_IDLE: Duration = Duration::from_millis(5);

/// Events a session reports to its owner. Delivered on a channel and drained
/// from the UI thread; repaints triggered by `Output` may be coalesced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// New shell output was applied to the screen; a repaint is due.
    Output,
    /// The shell exited with the given code. The session stays around in an
    /// inert state until it is closed.
    Exited(Option<u32>),
}

/// One pseudo terminal bound to one screen and one reader thread.
pub struct TerminalSession {
    pub id: SessionId,
    term: Arc<Mutex<Term>>,
    running: Arc<AtomicBool>,
    events: Receiver<SessionEvent>,
    /// Kept so the channel outlives the reader thread.
    #[cfg_attr(not(windows), allow(dead_code))]
    events_tx: Sender<SessionEvent>,
    /// Shell command this session was spawned with, for labelling.
    shell: Option<String>,
    working_dir: Option<PathBuf>,
    #[cfg(windows)]
    pty: Option<Arc<ConPty>>,
    #[cfg(windows)]
    reader: Option<JoinHandle<()>>,
}

impl TerminalSession {
    /// Create a session with a screen but no shell yet.
    pub fn new(id: SessionId, cols: u16, rows: u16) -> Self {
        let (events_tx, events) = mpsc::channel();
        Self {
            id,
            term: Arc::new(Mutex::new(Term::new(cols, rows))),
            running: Arc::new(AtomicBool::new(false)),
            events,
            events_tx,
            shell: None,
            working_dir: None,
            #[cfg(windows)]
            pty: None,
            #[cfg(windows)]
            reader: None,
        }
    }

    /// Spawn the shell and start the reader thread. Fails if the process or
    /// the pseudo console cannot be created; the session is then left
    /// shell-less and the caller decides what to do with it.
    #[cfg(windows)]
    pub fn spawn(
        &mut self,
        command: Option<&str>,
        working_dir: Option<&Path>,
        codepage: Option<u32>,
    ) -> Result<(), PtyError> {
        let (cols, rows) = self.grid_size();
        let pty = Arc::new(ConPty::spawn(command, working_dir, cols, rows, codepage)?);
        self.pty = Some(pty.clone());
        self.shell = command.map(str::to_string);
        self.working_dir = working_dir.map(Path::to_path_buf);
        self.running.store(true, Ordering::SeqCst);

        let running = self.running.clone();
        let term = self.term.clone();
        let events = self.events_tx.clone();
        let id = self.id;
        self.reader = Some(thread::spawn(move || {
            reader_loop(id, pty, term, running, events);
        }));

        info!(session = self.id, shell = command.unwrap_or("cmd.exe"), "session started");
        Ok(())
    }

    #[cfg(not(windows))]
    pub fn spawn(
        &mut self,
        _command: Option<&str>,
        _working_dir: Option<&Path>,
        _codepage: Option<u32>,
    ) -> Result<(), PtyError> {
        Err(PtyError::Unsupported)
    }

    /// Whether the shell process is still alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Send input bytes to the shell. Writes to a dead session are logged
    /// and dropped; the tab simply stops echoing.
    pub fn write(&self, data: &[u8]) {
        #[cfg(windows)]
        {
            if self.is_running() {
                if let Some(pty) = &self.pty {
                    if let Err(e) = pty.write(data) {
                        debug!(session = self.id, error = %e, "pty write failed");
                    }
                    return;
                }
            }
            debug!(session = self.id, len = data.len(), "dropping write to dead session");
        }
        #[cfg(not(windows))]
        {
            let _ = data;
        }
    }

    /// Resize the screen, then the pseudo console. A PTY resize failure is
    /// logged, not surfaced.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if let Ok(mut term) = self.term.lock() {
            term.resize(cols, rows);
        }
        #[cfg(windows)]
        if self.is_running() {
            if let Some(pty) = &self.pty {
                if let Err(e) = pty.resize(cols, rows) {
                    warn!(session = self.id, error = %e, "pty resize failed");
                }
            }
        }
    }

    /// Run `f` against the current screen state. Returns `None` only if the
    /// reader thread panicked while holding the lock.
    pub fn with_screen<R>(&self, f: impl FnOnce(&Screen) -> R) -> Option<R> {
        self.term.lock().ok().map(|term| f(&term.screen))
    }

    /// Next pending event, if any.
    pub fn try_event(&self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Title for tab display: the shell-reported title, falling back to the
    /// command the session was spawned with.
    pub fn title(&self) -> String {
        let reported = self
            .with_screen(|screen| screen.title.clone())
            .unwrap_or_default();
        if !reported.is_empty() {
            return reported;
        }
        self.shell.clone().unwrap_or_else(|| "shell".to_string())
    }

    #[allow(dead_code)]
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn grid_size(&self) -> (u16, u16) {
        self.term
            .lock()
            .map(|term| (term.screen.cols(), term.screen.rows()))
            .unwrap_or((0, 0))
    }

    /// Tear the session down: stop the reader, then terminate the shell,
    /// then release the PTY. The reader is joined before anything else is
    /// touched so it can never observe a dying session.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        #[cfg(windows)]
        {
            if let Some(pty) = &self.pty {
                pty.cancel_read();
            }
            if let Some(reader) = self.reader.take() {
                // Bounded: the loop re-checks the flag at least every READ_IDLE.
                let _ = reader.join();
            }
            if let Some(pty) = self.pty.take() {
                if pty.is_running() {
                    pty.terminate(false);
                    if !pty.wait_exit(TERMINATE_GRACE) {
                        pty.terminate(true);
                    }
                }
                // Dropping the last handle releases the pty.
            }
            info!(session = self.id, "session closed");
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drain the PTY until the process exits or the session is stopped. Runs on
/// its own thread so a blocked or bursty shell never stalls the UI.
#[cfg(windows)]
fn reader_loop(
    id: SessionId,
    pty: Arc<ConPty>,
    term: Arc<Mutex<Term>>,
    running: Arc<AtomicBool>,
    events: Sender<SessionEvent>,
) {
    let mut buffer = vec![0u8; 4096];
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        match pty.read(&mut buffer) {
            Ok(0) => {
                if !pty.is_running() {
                    running.store(false, Ordering::SeqCst);
                    let _ = events.send(SessionEvent::Exited(pty.exit_code()));
                    break;
                }
                thread::sleep(READ_IDLE);
            }
            Ok(n) => {
                let replies = match term.lock() {
                    Ok(mut term) => term.feed(&buffer[..n]),
                    Err(_) => break,
                };
                for reply in replies {
                    let _ = pty.write(&reply.to_bytes());
                }
                if events.send(SessionEvent::Output).is_err() {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
            Err(e) => {
                debug!(session = id, error = %e, "reader stopping");
                running.store(false, Ordering::SeqCst);
                let _ = events.send(SessionEvent::Exited(pty.exit_code()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstarted_session_is_inert() {
        let session = TerminalSession::new(1, 80, 24);
        assert!(!session.is_running());
        assert_eq!(session.grid_size(), (80, 24));
        assert!(session.try_event().is_none());
        assert!(session.working_dir().is_none());
        // Writing to a session without a shell must not panic.
        session.write(b"hello");
    }

    #[test]
    fn resize_applies_to_screen_without_shell() {
        let mut session = TerminalSession::new(1, 80, 24);
        session.resize(40, 10);
        assert_eq!(session.grid_size(), (40, 10));
        let cursor = session.with_screen(|s| s.cursor()).expect("screen");
        assert_eq!((cursor.row, cursor.col), (0, 0));
    }

    #[test]
    fn title_falls_back_to_shell_name() {
        let session = TerminalSession::new(1, 10, 4);
        assert_eq!(session.title(), "shell");
    }

    #[test]
    #[cfg(windows)]
    fn spawned_shell_produces_output_and_exit() {
        let mut session = TerminalSession::new(1, 80, 24);
        session
            .spawn(Some("cmd.exe /c echo conterm-test"), None, None)
            .expect("spawn");

        let mut saw_output = false;
        let mut exit = None;
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while std::time::Instant::now() < deadline {
            match session.try_event() {
                Some(SessionEvent::Output) => saw_output = true,
                Some(SessionEvent::Exited(code)) => {
                    exit = Some(code);
                    break;
                }
                None => thread::sleep(Duration::from_millis(10)),
            }
        }
        assert!(saw_output);
        assert_eq!(exit, Some(Some(0)));
        session.close();
    }
}
