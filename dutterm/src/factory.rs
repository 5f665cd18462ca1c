//! Driver factory: turns a [`DutConfig`] section into an unopened driver.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use log::debug;
use secrecy::SecretString;

use crate::channel::CallbackRule;
use crate::config::{DutConfig, SessionSection};
use crate::driver::{Driver, DriverBuilder, GenericDriver};
use crate::error::{Result, TransportError};
use crate::transport::{
    AuthMethod, SerialConfig, SshConfig, TelnetConfig, TransportKind,
};

/// A driver for any of the supported transports.
pub enum AnyDriver {
    /// Telnet session.
    Telnet(GenericDriver<TelnetConfig>),
    /// SSH session.
    Ssh(GenericDriver<SshConfig>),
    /// Serial console session.
    Serial(GenericDriver<SerialConfig>),
}

macro_rules! dispatch {
    ($self:expr, $driver:ident => $body:expr) => {
        match $self {
            AnyDriver::Telnet($driver) => $body,
            AnyDriver::Ssh($driver) => $body,
            AnyDriver::Serial($driver) => $body,
        }
    };
}

impl AnyDriver {
    /// The transport this driver talks over.
    pub fn kind(&self) -> TransportKind {
        match self {
            AnyDriver::Telnet(_) => TransportKind::Telnet,
            AnyDriver::Ssh(_) => TransportKind::Ssh,
            AnyDriver::Serial(_) => TransportKind::Serial,
        }
    }

    /// Get the default timeout.
    pub fn timeout(&self) -> Duration {
        dispatch!(self, d => d.timeout())
    }

    /// Set the default timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        dispatch!(self, d => d.set_timeout(timeout))
    }

    /// Replace the command prompt pattern.
    pub fn set_prompt(&mut self, pattern: &str) -> Result<()> {
        dispatch!(self, d => d.set_prompt(pattern))
    }
}

impl Driver for AnyDriver {
    async fn open_and_login(&mut self) -> Result<()> {
        dispatch!(self, d => d.open_and_login().await)
    }

    async fn close(&mut self) -> Result<()> {
        dispatch!(self, d => d.close().await)
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        dispatch!(self, d => d.write(text).await)
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        dispatch!(self, d => d.write_raw(data).await)
    }

    async fn cmd(&mut self, command: &str) -> Result<String> {
        dispatch!(self, d => d.cmd(command).await)
    }

    async fn read_all(&mut self) -> Result<String> {
        dispatch!(self, d => d.read_all().await)
    }

    async fn read_until(&mut self, pattern: &str) -> Result<String> {
        dispatch!(self, d => d.read_until(pattern).await)
    }

    fn set_session_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        dispatch!(self, d => d.set_session_file(path))
    }

    fn set_session_writer(&mut self, sink: impl Write + Send + 'static) {
        dispatch!(self, d => d.set_session_writer(sink))
    }

    fn register_callback(&mut self, rule: CallbackRule) {
        dispatch!(self, d => d.register_callback(rule))
    }

    fn is_open(&self) -> bool {
        dispatch!(self, d => d.is_open())
    }
}

/// Create an unopened driver for `kind` from its configuration section.
///
/// Prompt and callback patterns are compiled here, so an invalid pattern
/// fails before any connection is attempted. A configured SSH private key
/// file is read here as well.
pub fn new_driver(kind: TransportKind, config: &DutConfig) -> Result<AnyDriver> {
    debug!("creating {} driver for {}", kind, config.ip);
    match kind {
        TransportKind::Telnet => {
            let section = &config.telnet;
            let mut connector = TelnetConfig::new(config.ip.clone()).with_port(section.port);
            connector.timeout = section.session.timeout();

            let driver = builder(config, &section.session)
                .login_prompt(&section.login_prompt_pattern)
                .password_prompt(&section.password_prompt_pattern)
                .build(connector)?;
            Ok(AnyDriver::Telnet(driver))
        }
        TransportKind::Serial => {
            let section = &config.serial;
            let mut connector = SerialConfig::new(section.port_name.clone(), section.baud_rate);
            connector.data_bits = section.data_bits;
            connector.stop_bits = section.stop_bits;
            connector.parity = section.parity;
            connector.timeout = section.session.timeout();
            connector.strip_nul_padding = section.strip_nul_padding;

            let driver = builder(config, &section.session)
                .login_prompt(&section.login_prompt_pattern)
                .password_prompt(&section.password_prompt_pattern)
                .build(connector)?;
            Ok(AnyDriver::Serial(driver))
        }
        TransportKind::Ssh => {
            let section = &config.ssh;
            let (username, password) = config.credentials(&section.session);

            let mut connector = SshConfig::new(config.ip.clone(), username);
            connector.port = section.port;
            connector.timeout = section.session.timeout();
            connector.host_key_verification = section.host_key_verification.clone();
            connector.known_hosts_path = section.known_hosts_file.clone();
            if !password.is_empty() {
                connector
                    .auth
                    .push(AuthMethod::Password(SecretString::from(password.to_string())));
            }
            if let Some(path) = &section.private_key_file {
                connector.auth.push(AuthMethod::KeyData {
                    key: read_private_key(path)?,
                    passphrase: None,
                });
            }

            let driver = builder(config, &section.session).build(connector)?;
            Ok(AnyDriver::Ssh(driver))
        }
    }
}

/// [`new_driver`] with the session recorded to a file.
pub fn new_driver_with_session_file(
    kind: TransportKind,
    config: &DutConfig,
    path: impl AsRef<Path>,
) -> Result<AnyDriver> {
    let mut driver = new_driver(kind, config)?;
    driver.set_session_file(path)?;
    Ok(driver)
}

/// [`new_driver`] with the session recorded to a writer.
pub fn new_driver_with_session_writer(
    kind: TransportKind,
    config: &DutConfig,
    sink: impl Write + Send + 'static,
) -> Result<AnyDriver> {
    let mut driver = new_driver(kind, config)?;
    driver.set_session_writer(sink);
    Ok(driver)
}

/// Settings every transport shares.
fn builder(config: &DutConfig, session: &SessionSection) -> DriverBuilder {
    let (username, password) = config.credentials(session);
    let mut builder = DriverBuilder::new()
        .username(username)
        .password(password)
        .prompt(&session.prompt_pattern)
        .timeout(session.timeout())
        .line_break(session.linebreak.as_bytes())
        .bye_commands(&session.bye_commands);
    for rule in &session.callback_patterns {
        builder = builder.callback(&rule.matching_pattern, rule.enter_chars.clone());
    }
    builder
}

fn read_private_key(path: &Path) -> Result<SecretString> {
    let key = std::fs::read_to_string(path)
        .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;
    Ok(SecretString::from(key))
}
