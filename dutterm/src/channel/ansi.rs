//! ANSI escape sequence stripping.
//!
//! Telnet devices often emit colour codes, cursor movement and line erase
//! sequences around prompts and pagers. The `vte` parser recognises them
//! byte by byte; only printable text and the handful of control bytes the
//! line buffer cares about are passed on.

use vte::{Params, Parser, Perform};

use super::filter::{ByteFilter, Filtered};

/// Strips escape sequences and CR, decodes UTF-8 text.
///
/// The current line is reset when the device redraws it: a full or
/// leading erase (`ESC[1K`, `ESC[2K`, `ESC[1J`, `ESC[2J`), an erase to end
/// of line right after CR, or a cursor position. A plain `ESC[K` after
/// text keeps the text.
///
/// An LF that arrives inside an unterminated string sequence (OSC, DCS)
/// puts the parser back in the ground state so the rest of the output is
/// not swallowed.
pub struct AnsiFilter {
    parser: Parser,
    collector: Collector,
}

impl AnsiFilter {
    /// Create a new ANSI filter in the ground state.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            collector: Collector::default(),
        }
    }
}

impl Default for AnsiFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnsiFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnsiFilter").finish_non_exhaustive()
    }
}

impl ByteFilter for AnsiFilter {
    fn filter(&mut self, byte: u8) -> Filtered {
        self.parser.advance(&mut self.collector, &[byte]);
        match self.collector.event.take() {
            Some(event) => event,
            None if byte == b'\n' => {
                self.parser = Parser::new();
                self.collector.after_cr = false;
                Filtered::Data(b'\n')
            }
            None => Filtered::Discard,
        }
    }
}

/// Captures the single event a byte can produce.
#[derive(Default)]
struct Collector {
    event: Option<Filtered>,

    /// The cursor is at column 0 after a CR.
    after_cr: bool,
}

impl Perform for Collector {
    fn print(&mut self, c: char) {
        self.after_cr = false;
        self.event = Some(Filtered::Text(c));
    }

    fn execute(&mut self, byte: u8) {
        self.after_cr = byte == b'\r';
        self.event = Some(match byte {
            0x08 => Filtered::Backspace,
            b'\n' | b'\t' => Filtered::Data(byte),
            _ => Filtered::Discard,
        });
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        let mode = params.iter().next().and_then(|p| p.first()).copied().unwrap_or(0);
        let reset = match action {
            // Erase in line/display; mode 0 only erases right of the cursor.
            'K' | 'J' => mode != 0 || self.after_cr,
            'H' | 'f' => true,
            _ => false,
        };
        if reset {
            self.event = Some(Filtered::ResetLine);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(data: &[u8]) -> String {
        let mut filter = AnsiFilter::new();
        let mut out = String::new();
        for &b in data {
            match filter.filter(b) {
                Filtered::Text(c) => out.push(c),
                Filtered::Data(b) => out.push(b as char),
                Filtered::ResetLine => out.clear(),
                Filtered::Backspace => {
                    out.pop();
                }
                Filtered::Discard | Filtered::Reply(_) => {}
            }
        }
        out
    }

    #[test]
    fn test_colour_codes_are_removed() {
        assert_eq!(visible(b"\x1b[32mup\x1b[0m down"), "up down");
    }

    #[test]
    fn test_carriage_return_is_dropped() {
        assert_eq!(visible(b"line one\r\nline two"), "line one\nline two");
    }

    #[test]
    fn test_erase_line_resets() {
        assert_eq!(visible(b"--More--\x1b[2K  next"), "  next");
    }

    #[test]
    fn test_erase_to_end_keeps_printed_text() {
        // grep --color style output
        let out = visible(b"foo \x1b[01;31m\x1b[Kbar\x1b[m\x1b[K baz\r\nsw#");
        assert_eq!(out, "foo bar baz\nsw#");
    }

    #[test]
    fn test_erase_after_carriage_return_resets() {
        assert_eq!(visible(b"--More--\r\x1b[K  next"), "  next");
        assert_eq!(visible(b"--More--\r\x1b[7m\x1b[K  next"), "  next");
        assert_eq!(visible(b"prompt\x1b[1K> "), "> ");
    }

    #[test]
    fn test_cursor_position_resets() {
        assert_eq!(visible(b"stale\x1b[24;1Hfresh"), "fresh");
    }

    #[test]
    fn test_osc_title_is_removed() {
        assert_eq!(visible(b"\x1b]0;router\x07router#"), "router#");
    }

    #[test]
    fn test_unterminated_osc_ends_at_newline() {
        assert_eq!(visible(b"\x1b]0;title\r\nrouter#"), "\nrouter#");
    }

    #[test]
    fn test_backspace_is_reported() {
        let mut filter = AnsiFilter::new();
        assert_eq!(filter.filter(0x08), Filtered::Backspace);
    }

    #[test]
    fn test_utf8_is_decoded() {
        assert_eq!(visible("débit".as_bytes()), "débit");
    }
}
