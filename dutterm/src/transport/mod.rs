//! Transport layer: Telnet over TCP, SSH via russh, and serial ports.
//!
//! Each transport is a small policy object. It exposes a raw byte source
//! and sink, a byte filter for its own noise (Telnet negotiation, ANSI
//! sequences, serial padding), a write pacing policy and a login policy.
//! The shared read loop in [`crate::channel`] does everything else.

pub mod config;
mod serial;
mod ssh;
pub mod telnet;

pub use config::{AuthMethod, HostKeyVerification, Parity, SerialConfig, SshConfig, TelnetConfig};
pub use serial::SerialTransport;
pub use ssh::SshTransport;
pub use telnet::TelnetTransport;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::channel::Filtered;
use crate::error::{ChannelError, DriverError, Result};

/// The kind of channel a driver talks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Telnet over TCP.
    Telnet,
    /// SSH shell session with a PTY.
    Ssh,
    /// Local serial port.
    Serial,
}

impl TransportKind {
    /// Lowercase name of the transport.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Telnet => "telnet",
            TransportKind::Ssh => "ssh",
            TransportKind::Serial => "serial",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = DriverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telnet" => Ok(TransportKind::Telnet),
            "ssh" => Ok(TransportKind::Ssh),
            "serial" => Ok(TransportKind::Serial),
            _ => Err(DriverError::UnsupportedTransport {
                name: s.to_string(),
            }),
        }
    }
}

/// How writes are paced for devices that drop bytes sent too quickly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WritePacing {
    /// Pause before the first byte is written.
    pub pre_write: Duration,

    /// Pause after each byte; zero writes the whole buffer at once.
    pub byte_delay: Duration,

    /// Pause after the last byte, letting the device settle.
    pub post_write: Duration,
}

impl WritePacing {
    /// No pacing at all.
    pub const NONE: WritePacing = WritePacing {
        pre_write: Duration::ZERO,
        byte_delay: Duration::ZERO,
        post_write: Duration::ZERO,
    };

    /// Whether bytes are written one at a time.
    pub fn is_bytewise(&self) -> bool {
        !self.byte_delay.is_zero()
    }

    /// Total pause spent writing `len` bytes.
    pub fn total(&self, len: usize) -> Duration {
        let per_byte = self.byte_delay.saturating_mul(u32::try_from(len).unwrap_or(u32::MAX));
        self.pre_write
            .saturating_add(per_byte)
            .saturating_add(self.post_write)
    }
}

/// How the login sequence recovers from a missing prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRetry {
    /// A prompt timeout ends the login attempt.
    Fail,

    /// Send a blank line and start over, until `deadline_factor` times the
    /// session timeout has passed.
    Nudge {
        /// Multiple of the session timeout bounding the whole login.
        deadline_factor: u32,
    },
}

/// Transport-specific login behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginPolicy {
    /// Whether the device prompts for username and password in-band.
    ///
    /// False when the transport itself authenticates (SSH).
    pub prompts_for_credentials: bool,

    /// Recovery from prompt timeouts.
    pub retry: LoginRetry,
}

/// An open byte stream to a device plus its per-transport policies.
pub trait Transport: Send {
    /// The kind of transport.
    fn kind(&self) -> TransportKind;

    /// Read the next raw byte.
    ///
    /// Must be cancel safe: the read loop races this future against its
    /// deadline, and a cancelled call must not lose a byte.
    fn read_byte(&mut self) -> impl Future<Output = Result<u8>> + Send;

    /// Write bytes to the device as-is, without pacing.
    fn write_all(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Classify a raw byte. Called for every byte before line assembly.
    fn filter(&mut self, byte: u8) -> Filtered;

    /// Write pacing for this transport.
    fn pacing(&self) -> WritePacing;

    /// Login behavior for this transport.
    fn login_policy(&self) -> LoginPolicy;

    /// Release the underlying handle.
    fn shutdown(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Opens a [`Transport`] from connection settings.
pub trait Connector: Send + Sync {
    /// The transport this connector produces.
    type Transport: Transport;

    /// Human readable target (address or device path) for logs and errors.
    fn target(&self) -> String;

    /// Open the channel.
    fn connect(&self) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Read one byte from a stream; end of stream means the peer closed.
///
/// Cancel safe as long as the reader is (`BufReader` over a socket or port is).
pub(crate) async fn read_stream_byte<R>(reader: &mut R) -> Result<u8>
where
    R: AsyncRead + Unpin + Send,
{
    match reader.read_u8().await {
        Ok(byte) => Ok(byte),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(ChannelError::Closed.into()),
        Err(e) => Err(ChannelError::Io(e).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_from_str() {
        assert_eq!("telnet".parse::<TransportKind>().unwrap(), TransportKind::Telnet);
        assert_eq!(" SSH ".parse::<TransportKind>().unwrap(), TransportKind::Ssh);
        assert_eq!("Serial".parse::<TransportKind>().unwrap(), TransportKind::Serial);

        let err = "rlogin".parse::<TransportKind>().unwrap_err();
        assert!(matches!(err, DriverError::UnsupportedTransport { ref name } if name == "rlogin"));
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::Ssh.to_string(), "ssh");
    }

    #[test]
    fn test_write_pacing_none() {
        assert!(!WritePacing::NONE.is_bytewise());
        assert_eq!(WritePacing::default(), WritePacing::NONE);
        assert_eq!(WritePacing::NONE.total(100), Duration::ZERO);
    }

    #[test]
    fn test_write_pacing_total() {
        let pacing = WritePacing {
            pre_write: Duration::from_millis(100),
            byte_delay: Duration::from_millis(30),
            post_write: Duration::from_millis(5),
        };
        assert!(pacing.is_bytewise());
        assert_eq!(pacing.total(10), Duration::from_millis(405));
    }
}
