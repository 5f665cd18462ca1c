//! High-level driver for device interaction.
//!
//! A driver owns one session with one device: it opens the transport,
//! logs in, runs commands and tears everything down again. The contract
//! is the same for every transport; [`GenericDriver`] implements it on top
//! of any [`Connector`](crate::transport::Connector).

mod builder;
mod generic;
mod login;

pub use builder::DriverBuilder;
pub use generic::GenericDriver;
pub use login::{Credentials, LoginSequencer, LoginStage};

use std::future::Future;
use std::io::Write;
use std::path::Path;

use crate::channel::CallbackRule;
use crate::error::Result;

/// Trait for device drivers.
///
/// Every operation takes `&mut self`: a session has one reader and one
/// writer at a time.
pub trait Driver: Send {
    /// Open the transport and log in.
    ///
    /// On failure the transport, if it was opened, is closed again.
    fn open_and_login(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send the bye commands, drain output, close the transport and the
    /// session recorder.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Write text followed by the line break.
    fn write(&mut self, text: &str) -> impl Future<Output = Result<()>> + Send;

    /// Write bytes unmodified, with the transport's pacing.
    fn write_raw(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Run a command and return its output up to and including the next
    /// command prompt.
    fn cmd(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Drain whatever output is pending.
    fn read_all(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Read until the current line matches `pattern`.
    ///
    /// An invalid pattern fails before anything is read.
    fn read_until(&mut self, pattern: &str) -> impl Future<Output = Result<String>> + Send;

    /// Record the session to a file, creating parent directories.
    fn set_session_file(&mut self, path: impl AsRef<Path>) -> Result<()>;

    /// Record the session to an arbitrary writer.
    fn set_session_writer(&mut self, sink: impl Write + Send + 'static);

    /// Add a pagination callback.
    fn register_callback(&mut self, rule: CallbackRule);

    /// Whether the session is open.
    fn is_open(&self) -> bool;
}
