//! Generic driver implementation that works with any transport.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};

use super::Driver;
use super::login::{Credentials, LoginSequencer};
use crate::channel::{
    CallbackRule, DRAIN_TIMEOUT, PromptSet, SessionRecorder, TermChannel, compile_pattern,
};
use crate::error::{DriverError, Result};
use crate::transport::{Connector, Transport, TransportKind};

/// Default timeout for reads, writes and each login prompt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver for one session over any [`Connector`].
///
/// This is the main driver implementation. It handles:
/// - opening the transport and running the login sequence
/// - command execution with prompt detection
/// - pagination callbacks and session recording
/// - orderly shutdown with bye commands
pub struct GenericDriver<C: Connector> {
    /// Connection settings.
    connector: C,

    /// Read loop over the open transport (detached when closed).
    channel: TermChannel<C::Transport>,

    prompts: PromptSet,
    credentials: Credentials,

    /// Default timeout for operations.
    timeout: Duration,

    /// Commands sent before the transport is closed.
    bye_commands: Vec<String>,
}

impl<C: Connector> GenericDriver<C> {
    /// Create an unopened driver with default prompts and no credentials.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            channel: TermChannel::new(b"\n".to_vec()),
            prompts: PromptSet::default(),
            credentials: Credentials::none(),
            timeout: DEFAULT_TIMEOUT,
            bye_commands: Vec::new(),
        }
    }

    pub(super) fn with_parts(
        connector: C,
        line_break: Vec<u8>,
        prompts: PromptSet,
        credentials: Credentials,
        timeout: Duration,
        bye_commands: Vec<String>,
        callbacks: Vec<CallbackRule>,
    ) -> Self {
        let mut channel = TermChannel::new(line_break);
        for rule in callbacks {
            channel.register_callback(rule);
        }
        Self {
            connector,
            channel,
            prompts,
            credentials,
            timeout,
            bye_commands,
        }
    }

    /// Connection settings.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Transport kind of the open session, if any.
    pub fn kind(&self) -> Option<TransportKind> {
        self.channel.transport().map(|t| t.kind())
    }

    /// Get the default timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the default timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// The prompts used for login and commands.
    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    /// Replace the command prompt pattern.
    pub fn set_prompt(&mut self, pattern: &str) -> Result<()> {
        self.prompts.command = compile_pattern(pattern)?;
        Ok(())
    }

    /// Commands sent by [`Driver::close`].
    pub fn bye_commands(&self) -> &[String] {
        &self.bye_commands
    }

    async fn login(&mut self) -> Result<()> {
        let banner = LoginSequencer::new(
            &mut self.channel,
            &self.prompts,
            &self.credentials,
            self.timeout,
        )
        .run()
        .await?;
        debug!("logged in to {} ({} bytes of banner)", self.connector.target(), banner.len());
        Ok(())
    }
}

impl<C: Connector> Driver for GenericDriver<C> {
    async fn open_and_login(&mut self) -> Result<()> {
        if self.channel.is_attached() {
            return Err(DriverError::AlreadyConnected.into());
        }

        debug!("opening session to {}", self.connector.target());
        let transport = self.connector.connect().await?;
        self.channel.attach(transport);

        if let Err(e) = self.login().await {
            debug!("login to {} failed: {}", self.connector.target(), e);
            if let Err(close_err) = self.channel.shutdown().await {
                debug!("closing after failed login: {}", close_err);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.channel.is_attached() {
            self.channel.close_recorder();
            return Ok(());
        }

        for command in &self.bye_commands {
            if let Err(e) = self.channel.write_line(command, self.timeout).await {
                debug!("bye command {:?} failed: {}", command, e);
            }
        }
        if let Err(e) = self.channel.read_all(DRAIN_TIMEOUT).await {
            debug!("drain before close failed: {}", e);
        }

        let result = self.channel.shutdown().await;
        self.channel.close_recorder();
        debug!("session to {} closed", self.connector.target());
        result
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.channel.write_line(text, self.timeout).await
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.channel.write_raw(data, self.timeout).await
    }

    async fn cmd(&mut self, command: &str) -> Result<String> {
        // Stale output from an earlier command must not end this one.
        self.channel.discard_pending().await?;
        self.channel.write_line(command, self.timeout).await?;
        self.channel
            .read_until(&self.prompts.command, self.timeout)
            .await
    }

    async fn read_all(&mut self) -> Result<String> {
        self.channel.read_all(DRAIN_TIMEOUT).await
    }

    async fn read_until(&mut self, pattern: &str) -> Result<String> {
        let pattern = compile_pattern(pattern)?;
        self.channel.read_until(&pattern, self.timeout).await
    }

    fn set_session_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.channel.set_recorder(SessionRecorder::create(path)?);
        Ok(())
    }

    fn set_session_writer(&mut self, sink: impl Write + Send + 'static) {
        self.channel.set_recorder(SessionRecorder::new(sink));
    }

    fn register_callback(&mut self, rule: CallbackRule) {
        self.channel.register_callback(rule);
    }

    fn is_open(&self) -> bool {
        self.channel.is_attached()
    }
}

impl<C: Connector> Drop for GenericDriver<C> {
    fn drop(&mut self) {
        if self.channel.is_attached() {
            warn!(
                "driver for {} dropped while open; call close() to log out cleanly",
                self.connector.target()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::error::{ChannelError, Error};
    use crate::testing::{DuplexConnector, SharedBuf};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn driver(connector: DuplexConnector) -> GenericDriver<DuplexConnector> {
        let mut driver = GenericDriver::with_parts(
            connector,
            b"\n".to_vec(),
            PromptSet::new(r"[>#]\s*$").unwrap(),
            Credentials::none(),
            TIMEOUT,
            vec!["exit".into()],
            Vec::new(),
        );
        driver.set_timeout(TIMEOUT);
        driver
    }

    #[tokio::test]
    async fn test_open_cmd_close() {
        let (connector, mut device) = DuplexConnector::new();
        let mut driver = driver(connector);
        let transcript = SharedBuf::default();
        driver.set_session_writer(transcript.clone());

        device.write_all(b"sw1# ").await.unwrap();
        driver.open_and_login().await.unwrap();
        assert!(driver.is_open());
        assert_eq!(driver.kind(), Some(TransportKind::Telnet));

        // Leftover prompt space is discarded before the command goes out.
        let device_side = tokio::spawn(async move {
            let mut cmd = [0u8; 13];
            device.read_exact(&mut cmd).await.unwrap();
            assert_eq!(&cmd, b"show version\n");
            device.write_all(b"show version\r\nVersion 1.2\r\nsw1# ").await.unwrap();
            let mut bye = [0u8; 5];
            device.read_exact(&mut bye).await.unwrap();
            assert_eq!(&bye, b"exit\n");
            device.write_all(b"\r\nbye\r\n").await.unwrap();
            device
        });

        let out = driver.cmd("show version").await.unwrap();
        assert_eq!(out, "show version\nVersion 1.2\nsw1#");

        driver.close().await.unwrap();
        assert!(!driver.is_open());
        drop(device_side.await.unwrap());

        let recorded = transcript.contents();
        assert!(recorded.starts_with("sw1#"));
        assert!(recorded.contains("Version 1.2\nsw1#"));
        assert!(recorded.ends_with("bye\n"));
    }

    #[tokio::test]
    async fn test_open_twice_is_rejected() {
        let (connector, mut device) = DuplexConnector::new();
        let mut driver = driver(connector);
        device.write_all(b"> ").await.unwrap();
        driver.open_and_login().await.unwrap();

        let err = driver.open_and_login().await.unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::AlreadyConnected)));
        drop(device);
        driver.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_login_closes_transport() {
        let (connector, _device) = DuplexConnector::new();
        let mut driver = driver(connector);

        let err = driver.open_and_login().await.unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::LoginTimeout { .. })));
        assert!(!driver.is_open());
    }

    #[tokio::test]
    async fn test_read_until_rejects_bad_pattern_first() {
        let (connector, mut device) = DuplexConnector::new();
        let mut driver = driver(connector);
        device.write_all(b"# ").await.unwrap();
        driver.open_and_login().await.unwrap();

        let err = driver.read_until("(unclosed").await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::InvalidPattern { .. })));
        drop(device);
        driver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_need_open_session() {
        let (connector, _device) = DuplexConnector::new();
        let mut driver = driver(connector);

        let err = driver.cmd("show clock").await.unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::NotConnected)));
        assert!(driver.write("x").await.is_err());
        assert!(driver.close().await.is_ok());
    }

    #[test]
    fn test_set_prompt() {
        let (connector, _device) = DuplexConnector::new();
        let mut driver = driver(connector);
        driver.set_prompt(r"\)\s*$").unwrap();
        assert!(driver.prompts().command.is_match(b"(config)"));
        assert!(driver.set_prompt("[").is_err());
    }
}
