//! Connection settings for each transport.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Default timeout for dialing and for each read call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Telnet connection settings.
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// Telnet port (default: 23).
    pub port: u16,

    /// Dial timeout.
    pub timeout: Duration,
}

impl TelnetConfig {
    /// Telnet settings for a host on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 23,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Accept and learn unknown keys, reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. Lab use only.
    Disabled,
}

/// Authentication method for SSH connections.
#[derive(Debug)]
pub enum AuthMethod {
    /// Password authentication.
    Password(SecretString),

    /// Private key read from a file.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },

    /// Private key given as in-memory PEM/OpenSSH text.
    KeyData {
        /// The encoded key.
        key: SecretString,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<SecretString>,
    },
}

/// SSH connection configuration.
#[derive(Debug)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication methods, tried in order until one succeeds.
    pub auth: Vec<AuthMethod>,

    /// Connection timeout.
    pub timeout: Duration,

    /// Terminal width for the PTY.
    pub terminal_width: u32,

    /// Terminal height for the PTY.
    pub terminal_height: u32,

    /// Pause after every write so the device can process the input.
    pub settle_delay: Duration,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file; the user's default file when `None`.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// SSH settings for a host with no authentication methods yet.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            terminal_width: 500,
            terminal_height: 200,
            settle_delay: Duration::from_secs(1),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Parity {
    /// No parity bit.
    #[default]
    #[serde(rename = "N", alias = "n", alias = "none")]
    None,
    /// Even parity.
    #[serde(rename = "E", alias = "e", alias = "even")]
    Even,
    /// Odd parity.
    #[serde(rename = "O", alias = "o", alias = "odd")]
    Odd,
}

/// Serial port settings.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM1`).
    pub path: String,

    /// Baud rate (default: 115200).
    pub baud_rate: u32,

    /// Data bits: 5, 6, 7 or 8 (default: 8).
    pub data_bits: u8,

    /// Stop bits: 1 or 2 (default: 1).
    pub stop_bits: u8,

    /// Parity (default: none).
    pub parity: Parity,

    /// Port read timeout.
    pub timeout: Duration,

    /// Drop NUL-initiated CR/space padding runs.
    pub strip_nul_padding: bool,

    /// Pause before each write.
    pub pre_write_delay: Duration,

    /// Pause after each written byte.
    pub byte_delay: Duration,
}

impl SerialConfig {
    /// 8N1 settings for a port at the given baud rate.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            timeout: DEFAULT_TIMEOUT,
            strip_nul_padding: false,
            pre_write_delay: Duration::from_millis(100),
            byte_delay: Duration::from_millis(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let telnet = TelnetConfig::new("10.0.0.1");
        assert_eq!(telnet.socket_addr(), "10.0.0.1:23");
        assert_eq!(telnet.with_port(2323).port, 2323);

        let ssh = SshConfig::new("10.0.0.1", "admin");
        assert_eq!(ssh.socket_addr(), "10.0.0.1:22");
        assert_eq!(ssh.host_key_verification, HostKeyVerification::AcceptNew);
        assert_eq!(ssh.settle_delay, Duration::from_secs(1));

        let serial = SerialConfig::new("/dev/ttyUSB0", 9600);
        assert_eq!((serial.data_bits, serial.stop_bits), (8, 1));
        assert_eq!(serial.parity, Parity::None);
        assert_eq!(serial.byte_delay, Duration::from_millis(30));
    }

    #[test]
    fn test_parity_serde() {
        let parity: Parity = serde_json::from_str(r#""E""#).unwrap();
        assert_eq!(parity, Parity::Even);
        let parity: Parity = serde_json::from_str(r#""odd""#).unwrap();
        assert_eq!(parity, Parity::Odd);
        assert_eq!(serde_json::to_string(&Parity::None).unwrap(), r#""N""#);
    }
}
