//! Key-event to PTY byte encoding.
//!
//! The encoder is a plain value the canvas host holds by reference; it turns
//! key events into the byte sequences a shell expects. Arrow keys honor the
//! application-cursor mode, pastes honor bracketed paste.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::term::Modes;

/// Translates key events into shell input bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputEncoder;

impl InputEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode one key event. `None` means the key has no terminal meaning.
    pub fn encode(&self, event: &KeyEvent, modes: &Modes) -> Option<Vec<u8>> {
        let mods = event.modifiers;

        match event.code {
            KeyCode::Char(ch) => Some(encode_char(ch, mods)),

            KeyCode::Enter => Some(vec![0x0d]),

            KeyCode::Backspace => {
                if mods.contains(KeyModifiers::ALT) {
                    Some(vec![0x1b, 0x7f])
                } else {
                    Some(vec![0x7f])
                }
            }

            KeyCode::Tab => Some(vec![0x09]),
            KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
            KeyCode::Esc => Some(vec![0x1b]),

            KeyCode::Up => Some(arrow_key(b'A', mods, modes)),
            KeyCode::Down => Some(arrow_key(b'B', mods, modes)),
            KeyCode::Right => Some(arrow_key(b'C', mods, modes)),
            KeyCode::Left => Some(arrow_key(b'D', mods, modes)),

            KeyCode::Home => Some(named_key(b'H', mods)),
            KeyCode::End => Some(named_key(b'F', mods)),
            KeyCode::PageUp => Some(tilde_key(5, mods)),
            KeyCode::PageDown => Some(tilde_key(6, mods)),
            KeyCode::Insert => Some(tilde_key(2, mods)),
            KeyCode::Delete => Some(tilde_key(3, mods)),

            KeyCode::F(n) => function_key(n, mods),

            _ => None,
        }
    }

    /// Encode pasted text, wrapped in bracketed-paste markers when the shell
    /// asked for them.
    pub fn encode_paste(&self, text: &str, modes: &Modes) -> Vec<u8> {
        if modes.bracketed_paste {
            let mut bytes = b"\x1b[200~".to_vec();
            bytes.extend_from_slice(text.as_bytes());
            bytes.extend_from_slice(b"\x1b[201~");
            bytes
        } else {
            text.as_bytes().to_vec()
        }
    }
}

fn encode_char(ch: char, mods: KeyModifiers) -> Vec<u8> {
    let ctrl = mods.contains(KeyModifiers::CONTROL);
    let alt = mods.contains(KeyModifiers::ALT);

    // Ctrl+letter collapses to the matching C0 control code.
    if ctrl && !alt {
        if ch.is_ascii_alphabetic() {
            return vec![(ch.to_ascii_lowercase() as u8) - b'a' + 1];
        }
        match ch {
            '@' | '`' | ' ' => return vec![0x00],
            '[' => return vec![0x1b],
            '\\' => return vec![0x1c],
            ']' => return vec![0x1d],
            '^' | '~' => return vec![0x1e],
            '_' | '?' => return vec![0x1f],
            _ => {}
        }
    }

    if ctrl && alt && ch.is_ascii_alphabetic() {
        return vec![0x1b, (ch.to_ascii_lowercase() as u8) - b'a' + 1];
    }

    // Alt prefixes the key with ESC.
    if alt && !ctrl {
        let mut bytes = vec![0x1b];
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        return bytes;
    }

    let mut buf = [0u8; 4];
    ch.encode_utf8(&mut buf).as_bytes().to_vec()
}

fn arrow_key(key: u8, mods: KeyModifiers, modes: &Modes) -> Vec<u8> {
    let mods = mods & (KeyModifiers::SHIFT | KeyModifiers::CONTROL | KeyModifiers::ALT);
    if !mods.is_empty() {
        format!("\x1b[1;{}{}", modifier_code(mods), key as char).into_bytes()
    } else if modes.application_cursor {
        vec![0x1b, b'O', key]
    } else {
        vec![0x1b, b'[', key]
    }
}

/// Home and End.
fn named_key(key: u8, mods: KeyModifiers) -> Vec<u8> {
    let mods = mods & (KeyModifiers::SHIFT | KeyModifiers::CONTROL | KeyModifiers::ALT);
    if mods.is_empty() {
        vec![0x1b, b'[', key]
    } else {
        format!("\x1b[1;{}{}", modifier_code(mods), key as char).into_bytes()
    }
}

/// PageUp, PageDown, Insert, Delete.
fn tilde_key(code: u8, mods: KeyModifiers) -> Vec<u8> {
    let mods = mods & (KeyModifiers::SHIFT | KeyModifiers::CONTROL | KeyModifiers::ALT);
    if mods.is_empty() {
        format!("\x1b[{}~", code).into_bytes()
    } else {
        format!("\x1b[{};{}~", code, modifier_code(mods)).into_bytes()
    }
}

fn function_key(n: u8, mods: KeyModifiers) -> Option<Vec<u8>> {
    let mods = mods & (KeyModifiers::SHIFT | KeyModifiers::CONTROL | KeyModifiers::ALT);
    // F1-F4 are legacy SS3 keys, the rest use tilde codes.
    let ss3: &[u8] = match n {
        1 => b"P",
        2 => b"Q",
        3 => b"R",
        4 => b"S",
        _ => b"",
    };
    if !ss3.is_empty() {
        return Some(if mods.is_empty() {
            let mut bytes = b"\x1bO".to_vec();
            bytes.extend_from_slice(ss3);
            bytes
        } else {
            format!("\x1b[1;{}{}", modifier_code(mods), ss3[0] as char).into_bytes()
        });
    }

    let code = match n {
        5 => 15,
        6 => 17,
        7 => 18,
        8 => 19,
        9 => 20,
        10 => 21,
        11 => 23,
        12 => 24,
        _ => return None,
    };
    Some(if mods.is_empty() {
        format!("\x1b[{}~", code).into_bytes()
    } else {
        format!("\x1b[{};{}~", code, modifier_code(mods)).into_bytes()
    })
}

/// xterm modifier parameter: 1 + shift(1) + alt(2) + ctrl(4).
fn modifier_code(mods: KeyModifiers) -> u8 {
    1 + if mods.contains(KeyModifiers::SHIFT) { 1 } else { 0 }
        + if mods.contains(KeyModifiers::ALT) { 2 } else { 0 }
        + if mods.contains(KeyModifiers::CONTROL) { 4 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(code: KeyCode, mods: KeyModifiers) -> Option<Vec<u8>> {
        InputEncoder::new().encode(&KeyEvent::new(code, mods), &Modes::default())
    }

    #[test]
    fn basic_key_table() {
        assert_eq!(encode(KeyCode::Enter, KeyModifiers::NONE), Some(b"\r".to_vec()));
        assert_eq!(encode(KeyCode::Backspace, KeyModifiers::NONE), Some(vec![0x7f]));
        assert_eq!(encode(KeyCode::Tab, KeyModifiers::NONE), Some(b"\t".to_vec()));
        assert_eq!(encode(KeyCode::Esc, KeyModifiers::NONE), Some(vec![0x1b]));

        assert_eq!(encode(KeyCode::Up, KeyModifiers::NONE), Some(b"\x1b[A".to_vec()));
        assert_eq!(encode(KeyCode::Down, KeyModifiers::NONE), Some(b"\x1b[B".to_vec()));
        assert_eq!(encode(KeyCode::Right, KeyModifiers::NONE), Some(b"\x1b[C".to_vec()));
        assert_eq!(encode(KeyCode::Left, KeyModifiers::NONE), Some(b"\x1b[D".to_vec()));

        assert_eq!(encode(KeyCode::Home, KeyModifiers::NONE), Some(b"\x1b[H".to_vec()));
        assert_eq!(encode(KeyCode::End, KeyModifiers::NONE), Some(b"\x1b[F".to_vec()));
        assert_eq!(encode(KeyCode::PageUp, KeyModifiers::NONE), Some(b"\x1b[5~".to_vec()));
        assert_eq!(encode(KeyCode::PageDown, KeyModifiers::NONE), Some(b"\x1b[6~".to_vec()));
        assert_eq!(encode(KeyCode::Insert, KeyModifiers::NONE), Some(b"\x1b[2~".to_vec()));
        assert_eq!(encode(KeyCode::Delete, KeyModifiers::NONE), Some(b"\x1b[3~".to_vec()));
    }

    #[test]
    fn control_combinations() {
        assert_eq!(encode(KeyCode::Char('c'), KeyModifiers::CONTROL), Some(vec![0x03]));
        assert_eq!(encode(KeyCode::Char('d'), KeyModifiers::CONTROL), Some(vec![0x04]));
        assert_eq!(encode(KeyCode::Char('z'), KeyModifiers::CONTROL), Some(vec![0x1a]));
        assert_eq!(encode(KeyCode::Char('l'), KeyModifiers::CONTROL), Some(vec![0x0c]));
        // Uppercase reports collapse to the same code.
        assert_eq!(encode(KeyCode::Char('C'), KeyModifiers::CONTROL), Some(vec![0x03]));
    }

    #[test]
    fn printable_keys_pass_through() {
        assert_eq!(encode(KeyCode::Char('a'), KeyModifiers::NONE), Some(b"a".to_vec()));
        assert_eq!(
            encode(KeyCode::Char('A'), KeyModifiers::SHIFT),
            Some(b"A".to_vec())
        );
        assert_eq!(
            encode(KeyCode::Char('ü'), KeyModifiers::NONE),
            Some("ü".as_bytes().to_vec())
        );
    }

    #[test]
    fn alt_prefixes_escape() {
        assert_eq!(
            encode(KeyCode::Char('x'), KeyModifiers::ALT),
            Some(vec![0x1b, b'x'])
        );
        assert_eq!(
            encode(KeyCode::Backspace, KeyModifiers::ALT),
            Some(vec![0x1b, 0x7f])
        );
    }

    #[test]
    fn modified_arrows_use_xterm_codes() {
        assert_eq!(
            encode(KeyCode::Up, KeyModifiers::CONTROL),
            Some(b"\x1b[1;5A".to_vec())
        );
        assert_eq!(
            encode(KeyCode::Left, KeyModifiers::SHIFT | KeyModifiers::ALT),
            Some(b"\x1b[1;4D".to_vec())
        );
    }

    #[test]
    fn application_cursor_mode_switches_arrows() {
        let modes = Modes {
            application_cursor: true,
            ..Modes::default()
        };
        let encoder = InputEncoder::new();
        let event = KeyEvent::new(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(encoder.encode(&event, &modes), Some(b"\x1bOA".to_vec()));
    }

    #[test]
    fn function_keys() {
        assert_eq!(encode(KeyCode::F(1), KeyModifiers::NONE), Some(b"\x1bOP".to_vec()));
        assert_eq!(encode(KeyCode::F(5), KeyModifiers::NONE), Some(b"\x1b[15~".to_vec()));
        assert_eq!(encode(KeyCode::F(12), KeyModifiers::NONE), Some(b"\x1b[24~".to_vec()));
        assert_eq!(encode(KeyCode::F(13), KeyModifiers::NONE), None);
    }

    #[test]
    fn bracketed_paste_wraps_only_when_enabled() {
        let encoder = InputEncoder::new();
        let plain = Modes::default();
        assert_eq!(encoder.encode_paste("ls", &plain), b"ls".to_vec());

        let bracketed = Modes {
            bracketed_paste: true,
            ..Modes::default()
        };
        assert_eq!(
            encoder.encode_paste("ls", &bracketed),
            b"\x1b[200~ls\x1b[201~".to_vec()
        );
    }
}
