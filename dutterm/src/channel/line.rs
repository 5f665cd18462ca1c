//! Line assembly for sanitized session output.
//!
//! A [`LineBuffer`] lives for exactly one read call. Completed lines are
//! accumulated with trailing spaces trimmed and blank lines dropped; the
//! in-progress line is kept separately because prompts almost never end
//! with a newline and have to be matched while still unterminated.

use bytes::{BufMut, BytesMut};

/// Completed-lines accumulator plus the current, unterminated line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Lines already terminated by LF, each ending in `\n`.
    completed: BytesMut,

    /// The line currently being assembled (no LF yet).
    current: BytesMut,
}

impl LineBuffer {
    /// Create an empty line buffer.
    pub fn new() -> Self {
        Self {
            completed: BytesMut::with_capacity(4096),
            current: BytesMut::with_capacity(256),
        }
    }

    /// Append a byte to the current line.
    pub fn push(&mut self, byte: u8) {
        self.current.put_u8(byte);
    }

    /// Append already-decoded text to the current line.
    pub fn push_str(&mut self, text: &str) {
        self.current.put_slice(text.as_bytes());
    }

    /// Remove the last character of the current line.
    ///
    /// A complete UTF-8 sequence at the end of the line is removed as a
    /// whole; anything else (raw 8-bit bytes included) loses one byte.
    pub fn backspace(&mut self) {
        let len = self.current.len();
        let tail = len.saturating_sub(4);
        let char_start = self.current[tail..]
            .iter()
            .rposition(|&b| b & 0xC0 != 0x80)
            .map(|pos| tail + pos)
            .filter(|&start| utf8_width(self.current[start]) == len - start);
        self.current
            .truncate(char_start.unwrap_or(len.saturating_sub(1)));
    }

    /// Terminate the current line.
    ///
    /// Non-blank lines are moved to the completed accumulator with trailing
    /// spaces removed; the current line is reset either way.
    pub fn end_line(&mut self) {
        if !self.current.trim_ascii().is_empty() {
            let line = trim_end_spaces(&self.current);
            self.completed.put_slice(line);
            self.completed.put_u8(b'\n');
        }
        self.current.clear();
    }

    /// Discard the current line without keeping it.
    pub fn clear_current(&mut self) {
        self.current.clear();
    }

    /// The current, unterminated line.
    pub fn current(&self) -> &[u8] {
        &self.current
    }

    /// The current line with surrounding whitespace removed.
    pub fn current_trimmed(&self) -> &[u8] {
        self.current.trim_ascii()
    }

    /// Lines completed so far.
    pub fn completed(&self) -> &[u8] {
        &self.completed
    }

    /// Whether nothing at all has been assembled.
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.current.is_empty()
    }

    /// Consume the buffer, returning completed lines followed by the current line.
    pub fn into_text(mut self) -> String {
        self.completed.put_slice(&self.current);
        String::from_utf8_lossy(&self.completed).into_owned()
    }
}

/// Length of the UTF-8 sequence introduced by `lead`; 0 if it cannot lead one.
fn utf8_width(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}

fn trim_end_spaces(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b' ')
        .map_or(0, |pos| pos + 1);
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut LineBuffer, data: &[u8]) {
        for &b in data {
            if b == b'\n' {
                buf.end_line();
            } else {
                buf.push(b);
            }
        }
    }

    #[test]
    fn test_completed_lines_trim_trailing_spaces() {
        let mut buf = LineBuffer::new();
        feed(&mut buf, b"interface ge-0/0/0   \nstatus up\n");
        assert_eq!(buf.completed(), b"interface ge-0/0/0\nstatus up\n");
        assert!(buf.current().is_empty());
    }

    #[test]
    fn test_blank_lines_are_dropped() {
        let mut buf = LineBuffer::new();
        feed(&mut buf, b"first\n\n   \nsecond\n");
        assert_eq!(buf.into_text(), "first\nsecond\n");
    }

    #[test]
    fn test_leading_spaces_are_kept() {
        let mut buf = LineBuffer::new();
        feed(&mut buf, b"  indented \n");
        assert_eq!(buf.into_text(), "  indented\n");
    }

    #[test]
    fn test_backspace_edits_current_line() {
        let mut buf = LineBuffer::new();
        feed(&mut buf, b"abc");
        buf.backspace();
        buf.backspace();
        feed(&mut buf, b"X");
        assert_eq!(buf.current(), b"aX");
    }

    #[test]
    fn test_backspace_on_empty_line_is_noop() {
        let mut buf = LineBuffer::new();
        buf.backspace();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_backspace_removes_whole_utf8_char() {
        let mut buf = LineBuffer::new();
        buf.push_str("né");
        buf.backspace();
        assert_eq!(buf.current(), b"n");
    }

    #[test]
    fn test_backspace_removes_one_stray_high_byte() {
        let mut buf = LineBuffer::new();
        feed(&mut buf, b"ab\xb0");
        buf.backspace();
        assert_eq!(buf.current(), b"ab");

        // A lead byte without its continuation goes alone too.
        feed(&mut buf, b"\xe2\x82");
        buf.backspace();
        assert_eq!(buf.current(), b"ab\xe2");
        buf.backspace();
        assert_eq!(buf.current(), b"ab");
    }

    #[test]
    fn test_into_text_appends_unterminated_line() {
        let mut buf = LineBuffer::new();
        feed(&mut buf, b"show version\nVersion 1.2\nrouter> ");
        assert_eq!(buf.current_trimmed(), b"router>");
        assert_eq!(buf.into_text(), "show version\nVersion 1.2\nrouter> ");
    }
}
