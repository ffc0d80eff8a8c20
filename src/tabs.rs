//! Tab container: an ordered collection of terminal sessions.
//!
//! Insertion order is tab order. Exactly one session is active and receives
//! keyboard input; closing the last tab immediately replaces it so the
//! container is never empty while the window lives.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::core::pty::PtyError;
use crate::core::session::{SessionEvent, SessionId, TerminalSession};

pub struct TerminalTabs {
    sessions: Vec<TerminalSession>,
    active: usize,
    next_id: SessionId,
    cols: u16,
    rows: u16,
    default_shell: Option<String>,
    default_codepage: Option<u32>,
    working_dir: Option<PathBuf>,
}

impl TerminalTabs {
    pub fn new(
        cols: u16,
        rows: u16,
        default_shell: Option<String>,
        default_codepage: Option<u32>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            sessions: Vec::new(),
            active: 0,
            next_id: 1,
            cols,
            rows,
            default_shell,
            default_codepage,
            working_dir,
        }
    }

    /// Open a new tab running `shell` (the default shell when `None`). On
    /// spawn failure no tab is created and the error is returned; existing
    /// tabs are unaffected.
    pub fn add_terminal(&mut self, shell: Option<&str>) -> Result<SessionId, PtyError> {
        let command = shell.or(self.default_shell.as_deref()).map(str::to_string);
        let mut session = TerminalSession::new(self.next_id, self.cols, self.rows);
        session.spawn(
            command.as_deref(),
            self.working_dir.as_deref(),
            self.default_codepage,
        )?;
        Ok(self.push_session(session))
    }

    fn push_session(&mut self, session: TerminalSession) -> SessionId {
        let id = session.id;
        self.next_id = self.next_id.max(id) + 1;
        self.sessions.push(session);
        self.active = self.sessions.len() - 1;
        id
    }

    /// Close a tab: tear down its session, drop it from the collection, and
    /// keep the container non-empty by replacing the last tab.
    pub fn close_terminal(&mut self, id: SessionId) -> bool {
        let Some(index) = self.sessions.iter().position(|s| s.id == id) else {
            return false;
        };
        let mut session = self.sessions.remove(index);
        session.close();
        drop(session);
        info!(session = id, "tab closed");

        if self.active >= self.sessions.len() {
            self.active = self.sessions.len().saturating_sub(1);
        } else if self.active > index {
            self.active -= 1;
        }

        if self.sessions.is_empty() {
            if let Err(e) = self.add_terminal(None) {
                warn!(error = %e, "failed to spawn replacement tab");
            }
        }
        true
    }

    /// Close the active tab.
    pub fn close_active(&mut self) -> bool {
        match self.active().map(|session| session.id) {
            Some(id) => self.close_terminal(id),
            None => false,
        }
    }

    #[allow(dead_code)]
    pub fn set_active(&mut self, id: SessionId) -> bool {
        match self.sessions.iter().position(|s| s.id == id) {
            Some(index) => {
                self.active = index;
                true
            }
            None => false,
        }
    }

    pub fn set_active_index(&mut self, index: usize) -> bool {
        if index < self.sessions.len() {
            self.active = index;
            true
        } else {
            false
        }
    }

    pub fn next_tab(&mut self) {
        if !self.sessions.is_empty() {
            self.active = (self.active + 1) % self.sessions.len();
        }
    }

    pub fn prev_tab(&mut self) {
        if !self.sessions.is_empty() {
            self.active = (self.active + self.sessions.len() - 1) % self.sessions.len();
        }
    }

    pub fn active(&self) -> Option<&TerminalSession> {
        self.sessions.get(self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut TerminalSession> {
        self.sessions.get_mut(self.active)
    }

    /// Route input bytes to the active session only.
    pub fn write_active(&self, data: &[u8]) {
        if let Some(session) = self.sessions.get(self.active) {
            session.write(data);
        }
    }

    /// Propagate a new grid size to every session; each session resizes its
    /// screen and its PTY.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            return;
        }
        self.cols = cols;
        self.rows = rows;
        for session in &mut self.sessions {
            session.resize(cols, rows);
        }
    }

    /// Drain pending events from every session.
    pub fn drain_events(&self) -> Vec<(SessionId, SessionEvent)> {
        let mut events = Vec::new();
        for session in &self.sessions {
            while let Some(event) = session.try_event() {
                events.push((session.id, event));
            }
        }
        events
    }

    #[allow(dead_code)]
    pub fn sessions(&self) -> &[TerminalSession] {
        &self.sessions
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// True while at least one shell is alive.
    #[allow(dead_code)]
    pub fn any_running(&self) -> bool {
        self.sessions.iter().any(TerminalSession::is_running)
    }

    /// Tab labels with their ids, in tab order, active flagged.
    pub fn tab_info(&self) -> Vec<(SessionId, String, bool)> {
        self.sessions
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, s.title(), i == self.active))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabs_with(n: usize) -> TerminalTabs {
        let mut tabs = TerminalTabs::new(80, 24, None, None, None);
        for _ in 0..n {
            let id = tabs.next_id;
            let session = TerminalSession::new(id, 80, 24);
            tabs.push_session(session);
        }
        tabs
    }

    #[test]
    fn insertion_order_is_tab_order() {
        let tabs = tabs_with(3);
        let ids: Vec<_> = tabs.tab_info().iter().map(|(id, _, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        // The newest tab is active; none of the shell-less sessions run.
        assert_eq!(tabs.active().map(|s| s.id), Some(3));
        assert!(!tabs.any_running());
        assert!(tabs.drain_events().is_empty());
    }

    #[test]
    fn closing_a_middle_tab_keeps_active_session() {
        let mut tabs = tabs_with(3);
        tabs.set_active(3);
        assert!(tabs.close_terminal(2));

        assert_eq!(tabs.count(), 2);
        assert_eq!(tabs.active().map(|s| s.id), Some(3));
    }

    #[test]
    fn closing_the_active_tab_falls_back_to_a_neighbour() {
        let mut tabs = tabs_with(3);
        tabs.set_active(3);
        assert!(tabs.close_active());

        assert_eq!(tabs.count(), 2);
        assert_eq!(tabs.active().map(|s| s.id), Some(2));
    }

    #[test]
    fn tab_cycling_wraps() {
        let mut tabs = tabs_with(3);
        tabs.set_active(1);
        tabs.prev_tab();
        assert_eq!(tabs.active().map(|s| s.id), Some(3));
        tabs.next_tab();
        assert_eq!(tabs.active().map(|s| s.id), Some(1));
    }

    #[test]
    fn input_routes_to_the_active_session_only() {
        let mut tabs = tabs_with(2);
        tabs.set_active(1);
        // Both sessions are shell-less; the write must silently drop rather
        // than reach the other session or panic.
        tabs.write_active(&[0x03]);
        assert_eq!(tabs.active().map(|s| s.id), Some(1));
    }

    #[test]
    fn resize_reaches_every_session() {
        let mut tabs = tabs_with(2);
        tabs.resize(40, 10);
        for session in tabs.sessions() {
            assert_eq!(session.grid_size(), (40, 10));
        }
        // Degenerate sizes are refused.
        tabs.resize(0, 10);
        assert_eq!(tabs.sessions()[0].grid_size(), (40, 10));
    }

    #[test]
    #[cfg(windows)]
    fn closing_the_last_tab_spawns_a_replacement() {
        let mut tabs = TerminalTabs::new(80, 24, Some("cmd.exe".to_string()), None, None);
        let id = tabs.add_terminal(None).expect("first tab");
        assert!(tabs.close_terminal(id));

        assert_eq!(tabs.count(), 1);
        let replacement = tabs.active().expect("replacement tab");
        assert_ne!(replacement.id, id);
        assert!(replacement.is_running());
    }
}
