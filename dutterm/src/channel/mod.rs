//! Channel layer: byte sanitizing, line assembly and prompt matching.
//!
//! This module holds the read loop shared by every transport, together
//! with the pieces it is built from: byte filters, the line buffer,
//! prompt patterns, pagination callbacks and the session recorder.

mod ansi;
mod callback;
mod engine;
mod filter;
mod line;
mod patterns;
mod recorder;

pub use ansi::AnsiFilter;
pub use callback::{CallbackAction, CallbackRule};
pub use engine::{DRAIN_TIMEOUT, TermChannel};
pub use filter::{ByteFilter, Filtered, LineFilter, PaddingFilter};
pub use line::LineBuffer;
pub use patterns::{
    DEFAULT_LOGIN_PROMPT, DEFAULT_PASSWORD_PROMPT, DEFAULT_PROMPT, PromptSet, compile_pattern,
};
pub use recorder::SessionRecorder;
