//! The shared read loop.
//!
//! [`TermChannel`] owns an open [`Transport`] and turns its raw byte stream
//! into clean, line-oriented text. Every read call races one-byte reads
//! against a single deadline; per byte it
//!
//! 1. runs the transport's filter (negotiation, escapes, padding, CR),
//! 2. updates the [`LineBuffer`],
//! 3. fires matching pagination callbacks, which clear the line and push
//!    the deadline out,
//! 4. tests the unterminated current line against the wait pattern.
//!
//! Whatever a read call returns is also handed to the session recorder.

use std::time::Duration;

use log::{debug, trace};
use regex::bytes::Regex;
use tokio::time::{Instant, timeout, timeout_at};

use super::callback::{CallbackAction, CallbackRule};
use super::filter::Filtered;
use super::line::LineBuffer;
use super::recorder::SessionRecorder;
use crate::error::{ChannelError, DriverError, Error, Result};
use crate::transport::{Transport, WritePacing};

/// Timeout for pattern-less drains.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on bytes dropped by a single [`TermChannel::discard_pending`].
const MAX_DISCARD: usize = 64 * 1024;

/// Line-oriented, pattern-matching access to a transport.
pub struct TermChannel<T> {
    transport: Option<T>,
    line_break: Vec<u8>,
    callbacks: Vec<CallbackRule>,
    recorder: Option<SessionRecorder>,
}

impl<T: Transport> TermChannel<T> {
    /// Create a detached channel that terminates lines with `line_break`.
    pub fn new(line_break: impl Into<Vec<u8>>) -> Self {
        Self {
            transport: None,
            line_break: line_break.into(),
            callbacks: Vec::new(),
            recorder: None,
        }
    }

    /// Take ownership of an open transport.
    pub fn attach(&mut self, transport: T) {
        self.transport = Some(transport);
    }

    /// Whether a transport is attached.
    pub fn is_attached(&self) -> bool {
        self.transport.is_some()
    }

    /// The attached transport.
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Add a pagination callback.
    pub fn register_callback(&mut self, rule: CallbackRule) {
        self.callbacks.push(rule);
    }

    /// Replace the session recorder; the previous one is flushed.
    pub fn set_recorder(&mut self, recorder: SessionRecorder) {
        if let Some(old) = self.recorder.replace(recorder) {
            old.close();
        }
    }

    /// Flush and drop the session recorder, if any.
    pub fn close_recorder(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.close();
        }
    }

    /// Read until the current line matches `pattern`.
    ///
    /// Returns the completed lines plus the unterminated line that matched.
    /// Fails with [`ChannelError::ReadTimeout`] (carrying the text assembled
    /// so far) if `timeout` passes without a match. Callback matches push
    /// the deadline out by another `timeout`.
    pub async fn read_until(&mut self, pattern: &Regex, timeout: Duration) -> Result<String> {
        self.read_inner(Some(pattern), timeout).await
    }

    /// Drain whatever output is pending.
    ///
    /// Reads until `timeout` passes with no prompt to wait for; the timeout
    /// and a closed stream both count as the normal end of output.
    pub async fn read_all(&mut self, timeout: Duration) -> Result<String> {
        self.read_inner(None, timeout).await
    }

    async fn read_inner(&mut self, pattern: Option<&Regex>, timeout: Duration) -> Result<String> {
        let transport = self.transport.as_mut().ok_or(DriverError::NotConnected)?;
        let mut line = LineBuffer::new();
        let mut deadline = Instant::now() + timeout;

        let outcome = loop {
            let byte = match timeout_at(deadline, transport.read_byte()).await {
                Ok(Ok(byte)) => byte,
                Ok(Err(e)) => break Err(e),
                Err(_) => {
                    break Err(ChannelError::ReadTimeout {
                        timeout,
                        partial: String::new(),
                    }
                    .into());
                }
            };

            match transport.filter(byte) {
                Filtered::Data(b'\n') => line.end_line(),
                Filtered::Data(b) => line.push(b),
                Filtered::Text(c) => line.push_str(c.encode_utf8(&mut [0; 4])),
                Filtered::Backspace => line.backspace(),
                Filtered::ResetLine => line.clear_current(),
                Filtered::Discard => continue,
                Filtered::Reply(reply) => {
                    if let Err(e) = transport.write_all(&reply).await {
                        break Err(e);
                    }
                    continue;
                }
            }

            if !self.callbacks.is_empty() && !line.current().is_empty() {
                match fire_callbacks(transport, &self.callbacks, line.current_trimmed()).await {
                    Ok(true) => {
                        line.clear_current();
                        deadline = Instant::now() + timeout;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => break Err(e),
                }
            }

            if let Some(pattern) = pattern {
                if pattern.is_match(line.current()) {
                    break Ok(());
                }
            }
        };

        let text = line.into_text();
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(&text);
        }

        match outcome {
            Ok(()) => Ok(text),
            Err(e) if pattern.is_none() && is_end_of_output(&e) => Ok(text),
            Err(Error::Channel(ChannelError::ReadTimeout { timeout, .. })) => {
                trace!("read timed out after {:?} with {} bytes", timeout, text.len());
                Err(ChannelError::ReadTimeout {
                    timeout,
                    partial: text,
                }
                .into())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop input that is already waiting, without blocking.
    ///
    /// Negotiation replies are still sent; nothing is recorded.
    pub async fn discard_pending(&mut self) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(DriverError::NotConnected)?;
        let mut dropped = 0usize;

        while dropped < MAX_DISCARD {
            let byte = match timeout(Duration::ZERO, transport.read_byte()).await {
                Ok(Ok(byte)) => byte,
                Ok(Err(Error::Channel(ChannelError::Closed))) | Err(_) => break,
                Ok(Err(e)) => return Err(e),
            };
            if let Filtered::Reply(reply) = transport.filter(byte) {
                transport.write_all(&reply).await?;
            }
            dropped += 1;
        }

        if dropped > 0 {
            debug!("discarded {} pending bytes", dropped);
        }
        Ok(())
    }

    /// Write bytes with the transport's pacing, bounded by `timeout`.
    pub async fn write_raw(&mut self, data: &[u8], timeout: Duration) -> Result<()> {
        let transport = self.transport.as_mut().ok_or(DriverError::NotConnected)?;
        write_paced(transport, data, timeout).await
    }

    /// Write `text` followed by the line break.
    pub async fn write_line(&mut self, text: &str, timeout: Duration) -> Result<()> {
        let mut data = Vec::with_capacity(text.len() + self.line_break.len());
        data.extend_from_slice(text.as_bytes());
        data.extend_from_slice(&self.line_break);
        self.write_raw(&data, timeout).await
    }

    /// Detach and shut down the transport.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self.transport.take() {
            Some(mut transport) => transport.shutdown().await,
            None => Ok(()),
        }
    }
}

/// Run every rule that matches `line`. Returns whether any fired.
async fn fire_callbacks<T: Transport>(
    transport: &mut T,
    callbacks: &[CallbackRule],
    line: &[u8],
) -> Result<bool> {
    let mut fired = false;
    for rule in callbacks.iter().filter(|rule| rule.matches(line)) {
        trace!("callback {:?} matched", rule.pattern.as_str());
        match &rule.action {
            CallbackAction::SendRaw(bytes) => write_paced(transport, bytes, DRAIN_TIMEOUT).await?,
            CallbackAction::Custom(action) => action(),
        }
        fired = true;
    }
    Ok(fired)
}

/// Write with pacing; the pacing delays themselves do not count against `limit`.
async fn write_paced<T: Transport>(transport: &mut T, data: &[u8], limit: Duration) -> Result<()> {
    let pacing = transport.pacing();
    let limit = limit + pacing.total(data.len());
    timeout(limit, paced(transport, data, pacing))
        .await
        .map_err(|_| ChannelError::WriteTimeout(limit))?
}

async fn paced<T: Transport>(transport: &mut T, data: &[u8], pacing: WritePacing) -> Result<()> {
    if !pacing.pre_write.is_zero() {
        tokio::time::sleep(pacing.pre_write).await;
    }
    if pacing.is_bytewise() {
        for byte in data {
            transport.write_all(std::slice::from_ref(byte)).await?;
            tokio::time::sleep(pacing.byte_delay).await;
        }
    } else {
        transport.write_all(data).await?;
    }
    if !pacing.post_write.is_zero() {
        tokio::time::sleep(pacing.post_write).await;
    }
    Ok(())
}

fn is_end_of_output(e: &Error) -> bool {
    matches!(
        e,
        Error::Channel(ChannelError::ReadTimeout { .. }) | Error::Channel(ChannelError::Closed)
    )
}
