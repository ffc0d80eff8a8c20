//! ANSI/VT100 escape-sequence interpreter.
//!
//! Consumes the raw byte stream coming out of the shell and applies it to a
//! [`Screen`]. The interpreter is a pure consumer of untrusted input: bytes
//! split across reads, malformed UTF-8 and unknown or overlong sequences are
//! absorbed without ever panicking or touching cells they should not.

use super::screen::{Color, Screen, StyleFlags};

/// Data the interpreter wants written back to the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Cursor position report (DSR 6): `ESC [ row ; col R`, 1-indexed.
    CursorPosition(u16, u16),
    /// Primary device attributes: report as a VT220.
    DeviceAttributes,
    /// Secondary device attributes.
    SecondaryDeviceAttributes,
}

impl Reply {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Reply::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col).into_bytes(),
            Reply::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Reply::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
        }
    }
}

#[derive(Clone, Copy, Default, PartialEq)]
enum State {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    Osc,
    /// ESC seen inside an OSC string, deciding between ST and a new sequence.
    OscEscape,
}

const MAX_PARAMS: usize = 16;
const MAX_INTERMEDIATES: usize = 4;
const MAX_OSC_LEN: usize = 1024;

/// Incremental UTF-8 decoder so multi-byte characters survive chunked reads.
#[derive(Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

enum Utf8Step {
    Pending,
    Emit(char),
    /// Malformed input; `retry` means the offending byte must be examined
    /// again as the start of a new sequence.
    Malformed { retry: bool },
}

impl Utf8Decoder {
    fn step(&mut self, byte: u8) -> Utf8Step {
        if self.need > 0 {
            if byte & 0xC0 != 0x80 {
                self.need = 0;
                self.len = 0;
                return Utf8Step::Malformed { retry: true };
            }
            self.buf[self.len] = byte;
            self.len += 1;
            if self.len < self.need {
                return Utf8Step::Pending;
            }
            let decoded = std::str::from_utf8(&self.buf[..self.len])
                .ok()
                .and_then(|s| s.chars().next());
            self.need = 0;
            self.len = 0;
            match decoded {
                Some(ch) => Utf8Step::Emit(ch),
                None => Utf8Step::Malformed { retry: false },
            }
        } else if byte < 0x80 {
            Utf8Step::Emit(byte as char)
        } else {
            let need = match byte {
                b if b & 0xE0 == 0xC0 => 2,
                b if b & 0xF0 == 0xE0 => 3,
                b if b & 0xF8 == 0xF0 => 4,
                _ => return Utf8Step::Malformed { retry: false },
            };
            self.buf[0] = byte;
            self.len = 1;
            self.need = need;
            Utf8Step::Pending
        }
    }
}

/// Escape-sequence state machine.
pub struct Interpreter {
    state: State,
    params: Vec<u16>,
    current_param: Option<u16>,
    intermediates: Vec<u8>,
    private: bool,
    gt: bool,
    osc: String,
    utf8: Utf8Decoder,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            params: Vec::with_capacity(MAX_PARAMS),
            current_param: None,
            intermediates: Vec::with_capacity(MAX_INTERMEDIATES),
            private: false,
            gt: false,
            osc: String::new(),
            utf8: Utf8Decoder::default(),
        }
    }

    /// Feed raw bytes, mutating `screen`. Returns replies owed to the shell.
    pub fn feed(&mut self, bytes: &[u8], screen: &mut Screen) -> Vec<Reply> {
        let mut replies = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match self.utf8.step(bytes[i]) {
                Utf8Step::Pending => i += 1,
                Utf8Step::Emit(ch) => {
                    if let Some(reply) = self.advance(ch, screen) {
                        replies.push(reply);
                    }
                    i += 1;
                }
                Utf8Step::Malformed { retry } => {
                    if let Some(reply) = self.advance(char::REPLACEMENT_CHARACTER, screen) {
                        replies.push(reply);
                    }
                    if !retry {
                        i += 1;
                    }
                }
            }
        }
        replies
    }

    fn advance(&mut self, ch: char, screen: &mut Screen) -> Option<Reply> {
        // C0 controls act in any state except inside an OSC string.
        if ch < '\x20' && !matches!(self.state, State::Osc | State::OscEscape) {
            match ch {
                '\x1b' => self.enter_escape(),
                '\x07' => {} // BEL: no visual effect
                '\x08' => screen.backspace(),
                '\t' => screen.horizontal_tab(),
                '\n' | '\x0b' | '\x0c' => screen.linefeed(),
                '\r' => screen.carriage_return(),
                _ => {}
            }
            return None;
        }

        match self.state {
            State::Ground => {
                if ch != '\x7f' {
                    screen.put_char(ch);
                }
                None
            }
            State::Escape => self.escape(ch, screen),
            State::EscapeIntermediate => {
                match ch {
                    '\x20'..='\x2f' => self.push_intermediate(ch),
                    // Final byte; charset selections and friends are ignored.
                    _ => self.state = State::Ground,
                }
                None
            }
            State::CsiEntry => self.csi_entry(ch, screen),
            State::CsiParam => self.csi_param(ch, screen),
            State::CsiIntermediate => match ch {
                '\x20'..='\x2f' => {
                    self.push_intermediate(ch);
                    None
                }
                '\x40'..='\x7e' => self.execute_csi(ch, screen),
                _ => {
                    self.state = State::Ground;
                    None
                }
            },
            State::Osc => {
                match ch {
                    '\x07' | '\u{9c}' => {
                        self.execute_osc(screen);
                        self.state = State::Ground;
                    }
                    '\x1b' => self.state = State::OscEscape,
                    _ => {
                        if self.osc.len() < MAX_OSC_LEN {
                            self.osc.push(ch);
                        }
                    }
                }
                None
            }
            State::OscEscape => {
                if ch == '\\' {
                    // ST terminates the string.
                    self.execute_osc(screen);
                    self.state = State::Ground;
                    None
                } else {
                    // Not ST: close out the OSC and treat this as a fresh
                    // escape sequence.
                    self.execute_osc(screen);
                    self.enter_escape();
                    self.advance(ch, screen)
                }
            }
        }
    }

    fn enter_escape(&mut self) {
        self.state = State::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
        self.private = false;
        self.gt = false;
    }

    fn push_intermediate(&mut self, ch: char) {
        if self.intermediates.len() < MAX_INTERMEDIATES {
            self.intermediates.push(ch as u8);
        }
    }

    fn escape(&mut self, ch: char, screen: &mut Screen) -> Option<Reply> {
        match ch {
            '[' => {
                self.state = State::CsiEntry;
            }
            ']' => {
                self.state = State::Osc;
                self.osc.clear();
            }
            '7' => {
                screen.save_cursor();
                self.state = State::Ground;
            }
            '8' => {
                screen.restore_cursor();
                self.state = State::Ground;
            }
            'D' => {
                screen.index();
                self.state = State::Ground;
            }
            'E' => {
                screen.carriage_return();
                screen.linefeed();
                self.state = State::Ground;
            }
            'M' => {
                screen.reverse_index();
                self.state = State::Ground;
            }
            'c' => {
                screen.reset();
                self.state = State::Ground;
            }
            '\x20'..='\x2f' => {
                self.push_intermediate(ch);
                self.state = State::EscapeIntermediate;
            }
            _ => {
                tracing::trace!(final_byte = %ch, "unhandled escape");
                self.state = State::Ground;
            }
        }
        None
    }

    fn csi_entry(&mut self, ch: char, screen: &mut Screen) -> Option<Reply> {
        match ch {
            '0'..='9' => {
                self.current_param = Some(ch as u16 - '0' as u16);
                self.state = State::CsiParam;
            }
            ';' => {
                self.push_param(0);
                self.state = State::CsiParam;
            }
            '?' => self.private = true,
            '>' => self.gt = true,
            '=' | '!' => {}
            '\x20'..='\x2f' => {
                self.push_intermediate(ch);
                self.state = State::CsiIntermediate;
            }
            '\x40'..='\x7e' => return self.execute_csi(ch, screen),
            _ => self.state = State::Ground,
        }
        None
    }

    fn csi_param(&mut self, ch: char, screen: &mut Screen) -> Option<Reply> {
        match ch {
            '0'..='9' => {
                let digit = ch as u16 - '0' as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Subparameter colons are treated as plain separators.
            ';' | ':' => {
                let param = self.current_param.take().unwrap_or(0);
                self.push_param(param);
            }
            '\x20'..='\x2f' => {
                if let Some(param) = self.current_param.take() {
                    self.push_param(param);
                }
                self.push_intermediate(ch);
                self.state = State::CsiIntermediate;
            }
            '\x40'..='\x7e' => {
                if let Some(param) = self.current_param.take() {
                    self.push_param(param);
                }
                return self.execute_csi(ch, screen);
            }
            _ => self.state = State::Ground,
        }
        None
    }

    fn push_param(&mut self, param: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(param);
        }
    }

    fn param(&self, index: usize, default: u16) -> u16 {
        self.params.get(index).copied().unwrap_or(default)
    }

    fn execute_csi(&mut self, final_byte: char, screen: &mut Screen) -> Option<Reply> {
        self.state = State::Ground;

        if self.private {
            match final_byte {
                'h' => {
                    for &mode in &self.params {
                        screen.set_private_mode(mode, true);
                    }
                }
                'l' => {
                    for &mode in &self.params {
                        screen.set_private_mode(mode, false);
                    }
                }
                _ => {
                    tracing::debug!(final_byte = %final_byte, params = ?self.params, "unknown private CSI")
                }
            }
            return None;
        }

        match final_byte {
            'A' => screen.cursor_up(self.param(0, 1).max(1)),
            'B' => screen.cursor_down(self.param(0, 1).max(1)),
            'C' => screen.cursor_forward(self.param(0, 1).max(1)),
            'D' => screen.cursor_backward(self.param(0, 1).max(1)),
            'E' => {
                screen.cursor_down(self.param(0, 1).max(1));
                screen.carriage_return();
            }
            'F' => {
                screen.cursor_up(self.param(0, 1).max(1));
                screen.carriage_return();
            }
            'G' => screen.cursor_column(self.param(0, 1)),
            'H' | 'f' => screen.cursor_position(self.param(0, 1), self.param(1, 1)),
            'd' => screen.cursor_row(self.param(0, 1)),
            'J' => screen.erase_in_display(self.param(0, 0)),
            'K' => screen.erase_in_line(self.param(0, 0)),
            'L' => screen.insert_lines(self.param(0, 1).max(1)),
            'M' => screen.delete_lines(self.param(0, 1).max(1)),
            '@' => screen.insert_chars(self.param(0, 1).max(1)),
            'P' => screen.delete_chars(self.param(0, 1).max(1)),
            'X' => screen.erase_chars(self.param(0, 1).max(1)),
            'S' => screen.scroll_up(self.param(0, 1).max(1)),
            'T' => screen.scroll_down(self.param(0, 1).max(1)),
            'r' => {
                screen.set_scroll_region(self.param(0, 1), self.param(1, 0));
                screen.cursor_position(1, 1);
            }
            'm' => self.execute_sgr(screen),
            's' => screen.save_cursor(),
            'u' => screen.restore_cursor(),
            'n' => {
                if self.param(0, 0) == 6 {
                    let cursor = screen.cursor();
                    return Some(Reply::CursorPosition(cursor.row + 1, cursor.col + 1));
                }
            }
            'c' => {
                return Some(if self.gt {
                    Reply::SecondaryDeviceAttributes
                } else {
                    Reply::DeviceAttributes
                });
            }
            'h' | 'l' => {
                // ANSI modes (insert, linefeed/newline, ...) are not tracked.
                tracing::trace!(final_byte = %final_byte, params = ?self.params, "ignoring ANSI mode");
            }
            _ => {
                tracing::debug!(
                    final_byte = %final_byte,
                    params = ?self.params,
                    intermediates = ?self.intermediates,
                    "unknown CSI"
                );
            }
        }
        None
    }

    fn execute_sgr(&mut self, screen: &mut Screen) {
        if self.params.is_empty() {
            screen.pen_mut().reset();
            return;
        }

        let mut iter = self.params.iter().copied();
        while let Some(param) = iter.next() {
            let pen = screen.pen_mut();
            match param {
                0 => pen.reset(),
                1 => pen.flags |= StyleFlags::BOLD,
                2 => pen.flags |= StyleFlags::DIM,
                3 => pen.flags |= StyleFlags::ITALIC,
                4 => pen.flags |= StyleFlags::UNDERLINE,
                5 => pen.flags |= StyleFlags::BLINK,
                7 => pen.flags |= StyleFlags::INVERSE,
                8 => pen.flags |= StyleFlags::HIDDEN,
                9 => pen.flags |= StyleFlags::STRIKETHROUGH,

                22 => pen.flags &= !(StyleFlags::BOLD | StyleFlags::DIM),
                23 => pen.flags &= !StyleFlags::ITALIC,
                24 => pen.flags &= !StyleFlags::UNDERLINE,
                25 => pen.flags &= !StyleFlags::BLINK,
                27 => pen.flags &= !StyleFlags::INVERSE,
                28 => pen.flags &= !StyleFlags::HIDDEN,
                29 => pen.flags &= !StyleFlags::STRIKETHROUGH,

                30..=37 => pen.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        screen.pen_mut().fg = color;
                    }
                }
                39 => pen.fg = Color::Default,

                40..=47 => pen.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        screen.pen_mut().bg = color;
                    }
                }
                49 => pen.bg = Color::Default,

                90..=97 => pen.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => pen.bg = Color::Indexed((param - 100 + 8) as u8),

                _ => {}
            }
        }
    }

    /// `38;5;n` / `38;2;r;g;b` style extended color parameters.
    fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
        match iter.next()? {
            5 => Some(Color::Indexed(iter.next()?.min(255) as u8)),
            2 => {
                let r = iter.next()?.min(255) as u8;
                let g = iter.next()?.min(255) as u8;
                let b = iter.next()?.min(255) as u8;
                Some(Color::Rgb(r, g, b))
            }
            _ => None,
        }
    }

    fn execute_osc(&mut self, screen: &mut Screen) {
        if let Some(pos) = self.osc.find(';') {
            let (code, text) = self.osc.split_at(pos);
            match code {
                "0" | "1" | "2" => screen.title = text[1..].to_string(),
                _ => tracing::trace!(code, "ignoring OSC"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::screen::Cursor;

    fn feed(interp: &mut Interpreter, screen: &mut Screen, bytes: &[u8]) -> Vec<Reply> {
        interp.feed(bytes, screen)
    }

    fn fresh(cols: u16, rows: u16) -> (Interpreter, Screen) {
        (Interpreter::new(), Screen::new(cols, rows))
    }

    fn cursor(screen: &Screen) -> (u16, u16) {
        let Cursor { row, col, .. } = screen.cursor();
        (row, col)
    }

    #[test]
    fn cursor_positioning() {
        let (mut interp, mut screen) = fresh(80, 24);
        feed(&mut interp, &mut screen, b"\x1b[5;10H");
        assert_eq!(cursor(&screen), (4, 9));

        feed(&mut interp, &mut screen, b"\x1b[2A\x1b[3C");
        assert_eq!(cursor(&screen), (2, 12));

        // Out-of-range positions clamp.
        feed(&mut interp, &mut screen, b"\x1b[999;999H");
        assert_eq!(cursor(&screen), (23, 79));
    }

    #[test]
    fn sgr_red_then_reset() {
        let (mut interp, mut screen) = fresh(80, 24);
        feed(&mut interp, &mut screen, b"\x1b[31mRed\x1b[0mNormal");

        for col in 0..3 {
            let cell = screen.cell(0, col).copied().unwrap();
            assert_eq!(cell.style.fg, Color::Indexed(1));
        }
        for col in 3..9 {
            let cell = screen.cell(0, col).copied().unwrap();
            assert_eq!(cell.style.fg, Color::Default);
        }
        assert_eq!(screen.row_text(0), "RedNormal");
    }

    #[test]
    fn sgr_attributes_and_extended_colors() {
        let (mut interp, mut screen) = fresh(80, 24);
        feed(&mut interp, &mut screen, b"\x1b[1;4;38;5;200mx");

        let cell = screen.cell(0, 0).copied().unwrap();
        assert!(cell.style.flags.contains(StyleFlags::BOLD));
        assert!(cell.style.flags.contains(StyleFlags::UNDERLINE));
        assert_eq!(cell.style.fg, Color::Indexed(200));

        feed(&mut interp, &mut screen, b"\x1b[48;2;10;20;30my");
        let cell = screen.cell(0, 1).copied().unwrap();
        assert_eq!(cell.style.bg, Color::Rgb(10, 20, 30));
    }

    #[test]
    fn empty_feed_changes_nothing() {
        let (mut interp, mut screen) = fresh(20, 5);
        feed(&mut interp, &mut screen, b"ab");
        let before = cursor(&screen);

        assert!(feed(&mut interp, &mut screen, b"").is_empty());
        assert_eq!(cursor(&screen), before);
        assert_eq!(screen.row_text(0), "ab");
    }

    #[test]
    fn sequence_split_across_feeds() {
        let (mut interp, mut screen) = fresh(80, 24);
        feed(&mut interp, &mut screen, b"\x1b[3");
        feed(&mut interp, &mut screen, b"1mR");

        let cell = screen.cell(0, 0).copied().unwrap();
        assert_eq!(cell.ch, 'R');
        assert_eq!(cell.style.fg, Color::Indexed(1));
    }

    #[test]
    fn utf8_split_across_feeds() {
        let (mut interp, mut screen) = fresh(80, 24);
        let bytes = "é".as_bytes();
        feed(&mut interp, &mut screen, &bytes[..1]);
        feed(&mut interp, &mut screen, &bytes[1..]);

        assert_eq!(screen.cell(0, 0).map(|c| c.ch), Some('é'));
    }

    #[test]
    fn invalid_utf8_becomes_replacement() {
        let (mut interp, mut screen) = fresh(80, 24);
        feed(&mut interp, &mut screen, &[0xff, b'a']);

        assert_eq!(screen.cell(0, 0).map(|c| c.ch), Some('\u{fffd}'));
        assert_eq!(screen.cell(0, 1).map(|c| c.ch), Some('a'));
    }

    #[test]
    fn malformed_sequences_are_absorbed() {
        let (mut interp, mut screen) = fresh(20, 5);
        feed(&mut interp, &mut screen, b"ok");

        // Unknown CSI final, unknown escape, stray parameters: no panic, no
        // stray cells.
        feed(&mut interp, &mut screen, b"\x1b[99z\x1b#8\x1b[;;;;m");
        feed(&mut interp, &mut screen, b"!");

        assert_eq!(screen.row_text(0), "ok!");
    }

    #[test]
    fn erase_display_from_cursor() {
        let (mut interp, mut screen) = fresh(10, 3);
        feed(&mut interp, &mut screen, b"aaaa\r\nbbbb\r\ncccc");
        feed(&mut interp, &mut screen, b"\x1b[2;3H\x1b[0J");

        assert_eq!(screen.row_text(0), "aaaa");
        assert_eq!(screen.row_text(1), "bb");
        assert_eq!(screen.row_text(2), "");
    }

    #[test]
    fn device_status_report_replies() {
        let (mut interp, mut screen) = fresh(80, 24);
        feed(&mut interp, &mut screen, b"\x1b[4;8H");
        let replies = feed(&mut interp, &mut screen, b"\x1b[6n");

        assert_eq!(replies, vec![Reply::CursorPosition(4, 8)]);
        assert_eq!(Reply::CursorPosition(4, 8).to_bytes(), b"\x1b[4;8R");
    }

    #[test]
    fn osc_title_with_both_terminators() {
        let (mut interp, mut screen) = fresh(80, 24);
        feed(&mut interp, &mut screen, b"\x1b]0;hello\x07");
        assert_eq!(screen.title, "hello");

        feed(&mut interp, &mut screen, b"\x1b]2;world\x1b\\");
        assert_eq!(screen.title, "world");
    }

    #[test]
    fn bell_is_invisible() {
        let (mut interp, mut screen) = fresh(10, 2);
        feed(&mut interp, &mut screen, b"a\x07b");
        assert_eq!(screen.row_text(0), "ab");
        assert_eq!(cursor(&screen), (0, 2));
    }

    #[test]
    fn private_modes_toggle() {
        let (mut interp, mut screen) = fresh(10, 2);
        feed(&mut interp, &mut screen, b"\x1b[?25l");
        assert!(!screen.cursor().visible);
        feed(&mut interp, &mut screen, b"\x1b[?25h\x1b[?1h");
        assert!(screen.cursor().visible);
        assert!(screen.modes().application_cursor);
    }

    #[test]
    fn overlong_osc_is_bounded() {
        let (mut interp, mut screen) = fresh(10, 2);
        let mut noise = b"\x1b]0;".to_vec();
        noise.extend(std::iter::repeat(b'x').take(64 * 1024));
        noise.push(0x07);
        feed(&mut interp, &mut screen, &noise);

        assert!(screen.title.len() <= 1024);
        feed(&mut interp, &mut screen, b"ok");
        assert_eq!(screen.row_text(0), "ok");
    }
}
