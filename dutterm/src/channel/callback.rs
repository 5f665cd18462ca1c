//! Pagination callbacks.
//!
//! Devices that page long output stop at banners such as `--More--` or
//! `Press any key to continue`. A [`CallbackRule`] pairs a pattern for such
//! a banner with the action that advances the pager. Rules are checked
//! against the trimmed current line after every byte.

use std::fmt;
use std::sync::Arc;

use regex::bytes::Regex;

use super::patterns::compile_pattern;
use crate::error::ChannelError;

/// What to do when a callback pattern matches.
#[derive(Clone)]
pub enum CallbackAction {
    /// Write these bytes to the transport unmodified.
    SendRaw(Vec<u8>),

    /// Run an arbitrary side effect.
    ///
    /// The closure runs inline in the read loop and must not block or call
    /// back into the driver.
    Custom(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for CallbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackAction::SendRaw(bytes) => f.debug_tuple("SendRaw").field(bytes).finish(),
            CallbackAction::Custom(_) => f.write_str("Custom(<fn>)"),
        }
    }
}

/// A pattern plus the action to run when the current line matches it.
#[derive(Debug, Clone)]
pub struct CallbackRule {
    /// Pattern matched against the trimmed current line.
    pub pattern: Regex,

    /// Action to run on a match.
    pub action: CallbackAction,
}

impl CallbackRule {
    /// Create a rule that writes `bytes` whenever `pattern` matches.
    ///
    /// # Example
    ///
    /// ```rust
    /// use dutterm::channel::CallbackRule;
    ///
    /// let more = CallbackRule::send_raw(r"--More--", b" ").unwrap();
    /// assert!(more.matches(b"--More--"));
    /// ```
    pub fn send_raw(pattern: &str, bytes: impl Into<Vec<u8>>) -> Result<Self, ChannelError> {
        Ok(Self {
            pattern: compile_pattern(pattern)?,
            action: CallbackAction::SendRaw(bytes.into()),
        })
    }

    /// Create a rule that runs a custom closure whenever `pattern` matches.
    pub fn custom<F>(pattern: &str, action: F) -> Result<Self, ChannelError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Ok(Self {
            pattern: compile_pattern(pattern)?,
            action: CallbackAction::Custom(Arc::new(action)),
        })
    }

    /// Check the rule against an (already trimmed) line.
    pub fn matches(&self, line: &[u8]) -> bool {
        self.pattern.is_match(line)
    }
}
