//! Per-transport byte filtering.
//!
//! Every raw byte read from a transport passes through a filter before it
//! reaches the line buffer. The filter decides whether the byte is output,
//! an edit of the current line, noise to drop, or (for Telnet) a protocol
//! sequence that needs an answer on the wire.

const BS: u8 = 0x08;
const CR: u8 = 0x0D;
const NUL: u8 = 0x00;

/// What the read loop should do with one raw byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filtered {
    /// Append this byte to the current line (LF terminates the line).
    Data(u8),

    /// Append a decoded character to the current line.
    Text(char),

    /// Remove the last character of the current line.
    Backspace,

    /// Drop the byte.
    Discard,

    /// Drop the byte and clear the current line (screen redraw).
    ResetLine,

    /// Drop the byte and send these bytes back to the peer immediately.
    Reply(Vec<u8>),
}

/// A stateful classifier for raw transport bytes.
pub trait ByteFilter: Send {
    /// Classify the next raw byte.
    fn filter(&mut self, byte: u8) -> Filtered;
}

/// Filter shared by SSH and serial: drops CR, turns BS into an edit.
#[derive(Debug, Default, Clone)]
pub struct LineFilter;

impl ByteFilter for LineFilter {
    fn filter(&mut self, byte: u8) -> Filtered {
        match byte {
            BS => Filtered::Backspace,
            CR => Filtered::Discard,
            b => Filtered::Data(b),
        }
    }
}

/// Serial filter that also swallows NUL-initiated padding runs.
///
/// Some device families pad the line after a pager prompt with a NUL
/// followed by any number of CR/space bytes. The whole run is dropped;
/// the first other byte ends it and is processed normally.
#[derive(Debug, Default, Clone)]
pub struct PaddingFilter {
    strip_padding: bool,
    in_padding: bool,
}

impl PaddingFilter {
    /// Create a serial filter, optionally stripping NUL padding runs.
    pub fn new(strip_padding: bool) -> Self {
        Self {
            strip_padding,
            in_padding: false,
        }
    }
}

impl ByteFilter for PaddingFilter {
    fn filter(&mut self, byte: u8) -> Filtered {
        if self.strip_padding {
            if byte == NUL {
                self.in_padding = true;
                return Filtered::Discard;
            }
            if self.in_padding {
                if byte == CR || byte == b' ' {
                    return Filtered::Discard;
                }
                self.in_padding = false;
            }
        }
        LineFilter.filter(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(filter: &mut impl ByteFilter, data: &[u8]) -> Vec<Filtered> {
        data.iter().map(|&b| filter.filter(b)).collect()
    }

    #[test]
    fn test_line_filter() {
        let out = run(&mut LineFilter, b"a\r\n\x08");
        assert_eq!(
            out,
            vec![
                Filtered::Data(b'a'),
                Filtered::Discard,
                Filtered::Data(b'\n'),
                Filtered::Backspace,
            ]
        );
    }

    #[test]
    fn test_padding_run_is_swallowed() {
        let mut filter = PaddingFilter::new(true);
        let out = run(&mut filter, b"\x00\r  \r x");
        assert!(out[..6].iter().all(|f| *f == Filtered::Discard));
        assert_eq!(out[6], Filtered::Data(b'x'));

        // Spaces after the run ended are ordinary output again.
        assert_eq!(filter.filter(b' '), Filtered::Data(b' '));
    }

    #[test]
    fn test_padding_disabled_keeps_nul() {
        let mut filter = PaddingFilter::new(false);
        assert_eq!(filter.filter(0x00), Filtered::Data(0x00));
        assert_eq!(filter.filter(b' '), Filtered::Data(b' '));
    }
}
