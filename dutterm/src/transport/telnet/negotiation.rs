//! Telnet option negotiation (RFC 854/855).
//!
//! The negotiator sits inline in the read loop. Every raw byte is fed to
//! [`Negotiator::feed`]; plain data comes straight back out, while IAC
//! sequences are consumed and, where the accept-all policy calls for it,
//! answered. The caller never sees negotiation traffic.
//!
//! | Received        | Reply                              |
//! |-----------------|------------------------------------|
//! | `DO opt`        | `WILL opt`                         |
//! | `WILL opt`      | `DO opt`                           |
//! | `WONT opt`      | `DONT opt`                         |
//! | `DONT opt`      | none                               |
//! | `SB TTYPE SEND` | `SB TTYPE IS "XTERM"`              |
//! | `SB NAWS SEND`  | `SB NAWS 254x254`                  |
//! | `SB NEW-ENVIRON SEND` | `SB NEW-ENVIRON IS` (empty)  |
//! | `SB opt SEND`   | `SB opt IS` (empty)                |

use log::trace;

/// Interpret As Command.
pub const IAC: u8 = 255;
/// Refuse to perform / stop performing an option.
pub const DONT: u8 = 254;
/// Request the peer to perform an option.
pub const DO: u8 = 253;
/// Refuse to perform / stop performing an option.
pub const WONT: u8 = 252;
/// Offer to perform an option.
pub const WILL: u8 = 251;
/// Subnegotiation begin.
pub const SB: u8 = 250;
/// Subnegotiation end.
pub const SE: u8 = 240;

/// Terminal type option (RFC 1091).
pub const OPT_TERMINAL_TYPE: u8 = 24;
/// Negotiate About Window Size (RFC 1073).
pub const OPT_NAWS: u8 = 31;
/// New environment option (RFC 1572).
pub const OPT_NEW_ENVIRON: u8 = 39;

/// Subnegotiation `IS` qualifier.
pub const SB_IS: u8 = 0;
/// Subnegotiation `SEND` qualifier.
pub const SB_SEND: u8 = 1;

/// Terminal type reported to the device.
const TERMINAL_TYPE: &[u8] = b"XTERM";

/// Window size reported to the device, in columns and rows.
///
/// Large enough that most devices stop paging.
const WINDOW_SIZE: (u8, u8) = (0xfe, 0xfe);

/// Upper bound on buffered subnegotiation payload.
const MAX_SUBNEGOTIATION: usize = 1024;

/// Result of feeding one byte to the negotiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// An ordinary data byte.
    Data(u8),

    /// The byte was part of a command sequence; nothing to do.
    Consumed,

    /// The byte completed a sequence that must be answered with these bytes.
    Reply(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Option(u8),
    Sub,
    SubIac,
}

/// Byte-at-a-time Telnet command parser and responder.
///
/// Only the position inside a partially read sequence is kept between
/// bytes; every complete sequence is answered on its own.
#[derive(Debug)]
pub struct Negotiator {
    state: State,
    sub: Vec<u8>,
}

impl Negotiator {
    /// Create a negotiator in the data state.
    pub fn new() -> Self {
        Self {
            state: State::Data,
            sub: Vec::new(),
        }
    }

    /// Whether the parser is in the middle of an IAC sequence.
    pub fn in_sequence(&self) -> bool {
        self.state != State::Data
    }

    /// Feed one raw byte.
    pub fn feed(&mut self, byte: u8) -> Negotiation {
        match self.state {
            State::Data => {
                if byte == IAC {
                    self.state = State::Iac;
                    Negotiation::Consumed
                } else {
                    Negotiation::Data(byte)
                }
            }
            State::Iac => {
                self.state = match byte {
                    DO | DONT | WILL | WONT => State::Option(byte),
                    SB => {
                        self.sub.clear();
                        State::Sub
                    }
                    // Escaped 0xFF and two-byte commands (NOP, GA, AYT, ...)
                    _ => State::Data,
                };
                Negotiation::Consumed
            }
            State::Option(command) => {
                self.state = State::Data;
                match answer_option(command, byte) {
                    Some(reply) => Negotiation::Reply(reply),
                    None => Negotiation::Consumed,
                }
            }
            State::Sub => {
                if byte == IAC {
                    self.state = State::SubIac;
                } else if self.sub.len() < MAX_SUBNEGOTIATION {
                    self.sub.push(byte);
                }
                Negotiation::Consumed
            }
            State::SubIac => match byte {
                SE => {
                    self.state = State::Data;
                    let sub = std::mem::take(&mut self.sub);
                    match answer_subnegotiation(&sub) {
                        Some(reply) => Negotiation::Reply(reply),
                        None => Negotiation::Consumed,
                    }
                }
                IAC => {
                    self.state = State::Sub;
                    if self.sub.len() < MAX_SUBNEGOTIATION {
                        self.sub.push(IAC);
                    }
                    Negotiation::Consumed
                }
                _ => {
                    self.state = State::Sub;
                    Negotiation::Consumed
                }
            },
        }
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}

/// Unsolicited window size announcement sent right after connecting.
pub fn window_size_announcement() -> Vec<u8> {
    let (cols, rows) = WINDOW_SIZE;
    vec![IAC, SB, OPT_NAWS, 0x00, cols, 0x00, rows, IAC, SE]
}

fn answer_option(command: u8, option: u8) -> Option<Vec<u8>> {
    let reply = match command {
        DO => WILL,
        WILL => DO,
        WONT => DONT,
        _ => return None,
    };
    trace!("telnet: {} {} -> {} {}", command_name(command), option, command_name(reply), option);
    Some(vec![IAC, reply, option])
}

fn answer_subnegotiation(sub: &[u8]) -> Option<Vec<u8>> {
    let (&option, rest) = sub.split_first()?;
    if rest.first() != Some(&SB_SEND) {
        return None;
    }

    let mut reply = vec![IAC, SB, option];
    match option {
        OPT_TERMINAL_TYPE => {
            reply.push(SB_IS);
            reply.extend_from_slice(TERMINAL_TYPE);
        }
        OPT_NAWS => {
            let (cols, rows) = WINDOW_SIZE;
            reply.extend_from_slice(&[0x00, cols, 0x00, rows]);
        }
        _ => reply.push(SB_IS),
    }
    reply.extend_from_slice(&[IAC, SE]);

    trace!("telnet: SB {} SEND answered", option);
    Some(reply)
}

fn command_name(command: u8) -> &'static str {
    match command {
        DO => "DO",
        DONT => "DONT",
        WILL => "WILL",
        WONT => "WONT",
        _ => "?",
    }
}
