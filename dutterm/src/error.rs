//! Error types for dutterm.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for dutterm operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level errors (dial, authentication, port open).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel errors (reading, writing, pattern matching).
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors (login, session lifecycle, configuration).
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl Error {
    /// Whether this error is a read, write or login timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Channel(ChannelError::ReadTimeout { .. })
                | Error::Channel(ChannelError::WriteTimeout(_))
                | Error::Driver(DriverError::LoginTimeout { .. })
                | Error::Transport(TransportError::Timeout(_))
        )
    }

    /// Text assembled before a read timed out, if any.
    pub fn partial_output(&self) -> Option<&str> {
        match self {
            Error::Channel(ChannelError::ReadTimeout { partial, .. }) => Some(partial),
            _ => None,
        }
    }
}

/// Transport layer errors (TCP dial, SSH session, serial port).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to the target.
    #[error("Connection failed to {target}: {source}")]
    ConnectionFailed {
        target: String,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error.
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// SSH authentication rejected.
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Private key could not be loaded or decoded.
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key differs from the one recorded in known_hosts.
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host is not present in known_hosts and strict checking is on.
    #[error("Host key for {host}:{port} is unknown")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written.
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Serial port could not be opened or configured.
    #[error("Serial port {path}: {source}")]
    Serial {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// Connection attempt timed out.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}

/// Channel errors raised while reading from or writing to a session.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The wait pattern was not seen before the deadline.
    #[error("Pattern not found within {timeout:?}")]
    ReadTimeout {
        timeout: Duration,
        /// Text assembled before the deadline passed.
        partial: String,
    },

    /// A write did not complete before the deadline.
    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// The peer closed the stream.
    #[error("Channel closed")]
    Closed,

    /// Invalid regex pattern.
    #[error("Invalid regex pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// SSH protocol error on the channel.
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),
}

/// Driver layer errors (login, lifecycle, configuration).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Driver not connected.
    #[error("Driver not connected - call open_and_login() first")]
    NotConnected,

    /// Driver already connected.
    #[error("Driver already connected")]
    AlreadyConnected,

    /// Login did not reach the command prompt in time.
    #[error("Login timed out waiting for {stage} after {elapsed:?}")]
    LoginTimeout { stage: String, elapsed: Duration },

    /// Unknown transport name requested from the factory.
    #[error("Unsupported transport '{name}'")]
    UnsupportedTransport { name: String },

    /// The session recording file could not be created.
    #[error("Cannot open session file {path:?}: {source}")]
    SessionFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration in the builder or factory input.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

/// Result type alias using dutterm's Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_timeout_carries_partial() {
        let err: Error = ChannelError::ReadTimeout {
            timeout: Duration::from_millis(50),
            partial: "half a line".into(),
        }
        .into();

        assert!(err.is_timeout());
        assert_eq!(err.partial_output(), Some("half a line"));
    }

    #[test]
    fn test_login_timeout_is_timeout() {
        let err: Error = DriverError::LoginTimeout {
            stage: "login prompt".into(),
            elapsed: Duration::from_secs(1),
        }
        .into();

        assert!(err.is_timeout());
        assert!(err.partial_output().is_none());
        assert!(err.to_string().contains("login prompt"));
    }

    #[test]
    fn test_closed_is_not_timeout() {
        let err: Error = ChannelError::Closed.into();
        assert!(!err.is_timeout());
    }
}
