//! Device-under-test configuration.
//!
//! [`DutConfig`] is the structured input of the driver factory: the device
//! address, shared credentials and one section per transport. Every field
//! has a default, so a partial document deserializes cleanly. Loading and
//! saving files is up to the caller; any serde format works.
//!
//! ```rust
//! use dutterm::config::DutConfig;
//!
//! let config: DutConfig = serde_json::from_str(r#"{
//!     "ip": "192.0.2.7",
//!     "telnet": { "port": 2323, "bye_commands": ["quit"] }
//! }"#).unwrap();
//! assert_eq!(config.telnet.port, 2323);
//! assert_eq!(config.ssh.port, 22);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::{DEFAULT_LOGIN_PROMPT, DEFAULT_PASSWORD_PROMPT, DEFAULT_PROMPT};
use crate::transport::{HostKeyVerification, Parity};

/// Configuration of the device under test.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutConfig {
    /// Device address for Telnet and SSH.
    pub ip: String,

    /// Shared username, used unless a section overrides it.
    pub username: String,

    /// Shared password.
    pub password: String,

    /// Telnet section.
    pub telnet: TelnetSection,

    /// Serial console section.
    pub serial: SerialSection,

    /// SSH section.
    pub ssh: SshSection,
}

impl DutConfig {
    /// Username and password for a section.
    ///
    /// A non-empty section username replaces both shared credentials.
    pub fn credentials<'a>(&'a self, session: &'a SessionSection) -> (&'a str, &'a str) {
        if session.username.is_empty() {
            (&self.username, &self.password)
        } else {
            (&session.username, &session.password)
        }
    }
}

/// A pattern that, when seen on the current line, is answered with raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPattern {
    /// Regex matched against the trimmed current line.
    pub matching_pattern: String,

    /// Bytes written back when the pattern matches.
    ///
    /// Given as a string or, for bytes that are not UTF-8, as an array of
    /// numbers (`[255, 13]`).
    #[serde(with = "raw_bytes")]
    pub enter_chars: Vec<u8>,
}

/// Byte strings that read naturally as text when they are text.
mod raw_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        Bytes(Vec<u8>),
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(text) => text.serialize(serializer),
            Err(_) => bytes.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.into_bytes(),
            Repr::Bytes(bytes) => bytes,
        })
    }
}

/// Settings shared by every transport section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Override username; empty means use the shared credentials.
    pub username: String,

    /// Override password, used together with `username`.
    pub password: String,

    /// Timeout for connecting, each read and each login prompt.
    pub timeout_ms: u64,

    /// Bytes appended to every written line.
    pub linebreak: String,

    /// Commands sent before closing the session.
    pub bye_commands: Vec<String>,

    /// Command prompt pattern.
    pub prompt_pattern: String,

    /// Pagination rules.
    pub callback_patterns: Vec<CallbackPattern>,
}

impl SessionSection {
    /// The timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            timeout_ms: 5000,
            linebreak: "\n".to_string(),
            bye_commands: vec!["exit".to_string()],
            prompt_pattern: DEFAULT_PROMPT.to_string(),
            callback_patterns: Vec::new(),
        }
    }
}

/// Telnet section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelnetSection {
    /// TCP port.
    pub port: u16,

    /// Login prompt pattern.
    pub login_prompt_pattern: String,

    /// Password prompt pattern.
    pub password_prompt_pattern: String,

    /// Settings shared with the other transports.
    #[serde(flatten)]
    pub session: SessionSection,
}

impl Default for TelnetSection {
    fn default() -> Self {
        Self {
            port: 23,
            login_prompt_pattern: DEFAULT_LOGIN_PROMPT.to_string(),
            password_prompt_pattern: DEFAULT_PASSWORD_PROMPT.to_string(),
            session: SessionSection::default(),
        }
    }
}

/// Serial console section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSection {
    /// Port device path (`/dev/ttyUSB0`, `COM3`).
    pub port_name: String,

    /// Baud rate.
    pub baud_rate: u32,

    /// Data bits: 5, 6, 7 or 8.
    pub data_bits: u8,

    /// Stop bits: 1 or 2.
    pub stop_bits: u8,

    /// Parity: `N`, `E` or `O`.
    pub parity: Parity,

    /// Drop NUL-initiated padding after pagination.
    pub strip_nul_padding: bool,

    /// Login prompt pattern.
    pub login_prompt_pattern: String,

    /// Password prompt pattern.
    pub password_prompt_pattern: String,

    /// Settings shared with the other transports.
    #[serde(flatten)]
    pub session: SessionSection,
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            strip_nul_padding: false,
            login_prompt_pattern: DEFAULT_LOGIN_PROMPT.to_string(),
            password_prompt_pattern: DEFAULT_PASSWORD_PROMPT.to_string(),
            session: SessionSection::default(),
        }
    }
}

/// SSH section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSection {
    /// TCP port.
    pub port: u16,

    /// Private key used in addition to the password.
    pub private_key_file: Option<PathBuf>,

    /// Host key checking mode.
    pub host_key_verification: HostKeyVerification,

    /// known_hosts file; the user's default when unset.
    pub known_hosts_file: Option<PathBuf>,

    /// Settings shared with the other transports.
    #[serde(flatten)]
    pub session: SessionSection,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            port: 22,
            private_key_file: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_file: None,
            session: SessionSection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config: DutConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DutConfig::default());

        assert_eq!(config.telnet.port, 23);
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.serial.parity, Parity::None);
        assert_eq!(config.telnet.session.timeout(), Duration::from_secs(5));
        assert_eq!(config.telnet.session.linebreak, "\n");
        assert_eq!(config.telnet.session.bye_commands, ["exit"]);
        assert_eq!(config.telnet.session.prompt_pattern, DEFAULT_PROMPT);
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::AcceptNew);
    }

    #[test]
    fn test_full_document() {
        let config: DutConfig = serde_json::from_str(
            r#"{
                "ip": "10.1.1.1",
                "username": "superuser",
                "password": "123",
                "telnet": {
                    "port": 2323,
                    "timeout_ms": 8000,
                    "linebreak": "\r\n",
                    "prompt_pattern": "[>#]\\s*$",
                    "callback_patterns": [
                        { "matching_pattern": "--More--", "enter_chars": " " }
                    ]
                },
                "serial": { "port_name": "/dev/ttyS1", "baud_rate": 9600, "parity": "E" },
                "ssh": {
                    "username": "netops",
                    "password": "hunter2",
                    "private_key_file": "/keys/id_ed25519",
                    "host_key_verification": "strict"
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.telnet.port, 2323);
        assert_eq!(config.telnet.session.timeout(), Duration::from_secs(8));
        assert_eq!(config.telnet.session.linebreak, "\r\n");
        assert_eq!(config.telnet.session.callback_patterns[0].enter_chars, b" ");
        assert_eq!(config.telnet.login_prompt_pattern, DEFAULT_LOGIN_PROMPT);
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::Strict);
        assert_eq!(
            config.ssh.private_key_file.as_deref(),
            Some(std::path::Path::new("/keys/id_ed25519"))
        );
    }

    #[test]
    fn test_enter_chars_accept_raw_bytes() {
        let rules: Vec<CallbackPattern> = serde_json::from_str(
            r#"[
                { "matching_pattern": "--More--", "enter_chars": "q\r" },
                { "matching_pattern": "Press any key", "enter_chars": [255, 13] }
            ]"#,
        )
        .unwrap();
        assert_eq!(rules[0].enter_chars, b"q\r");
        assert_eq!(rules[1].enter_chars, [0xFF, b'\r']);

        let json = serde_json::to_value(&rules).unwrap();
        assert_eq!(json[0]["enter_chars"], "q\r");
        assert_eq!(json[1]["enter_chars"], serde_json::json!([255, 13]));
    }

    #[test]
    fn test_section_credentials_override() {
        let mut config = DutConfig {
            username: "superuser".into(),
            password: "123".into(),
            ..Default::default()
        };
        assert_eq!(config.credentials(&config.telnet.session), ("superuser", "123"));

        config.ssh.session.username = "netops".into();
        config.ssh.session.password = String::new();
        assert_eq!(config.credentials(&config.ssh.session), ("netops", ""));
    }

    #[test]
    fn test_round_trip_keeps_sections_flat() {
        let value = serde_json::to_value(DutConfig::default()).unwrap();
        assert_eq!(value["telnet"]["timeout_ms"], 5000);
        assert_eq!(value["serial"]["parity"], "N");
        assert_eq!(value["ssh"]["host_key_verification"], "accept_new");
    }
}
