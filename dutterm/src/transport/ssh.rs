//! SSH transport implementation using russh.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, decode_secret_key, load_secret_key};
use russh::{Channel, ChannelMsg, Pty};
use secrecy::ExposeSecret;

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use super::{Connector, LoginPolicy, LoginRetry, Transport, TransportKind, WritePacing};
use crate::channel::{ByteFilter, Filtered, LineFilter};
use crate::error::{ChannelError, Result, TransportError};

/// Terminal line speed reported with the PTY request.
const TERMINAL_SPEED: u32 = 14400;

/// Sleep range while the channel has no buffered data.
const POLL_BACKOFF_MIN: Duration = Duration::from_millis(10);
const POLL_BACKOFF_MAX: Duration = Duration::from_millis(100);

/// SSH authenticates at the protocol level; the login sequence only waits
/// for the shell prompt.
const LOGIN_POLICY: LoginPolicy = LoginPolicy {
    prompts_for_credentials: false,
    retry: LoginRetry::Fail,
};

/// An interactive shell on an SSH connection.
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// The shell channel.
    channel: Channel<Msg>,

    /// Bytes received but not yet handed to the read loop.
    pending: VecDeque<u8>,

    filter: LineFilter,
    settle_delay: Duration,
}

impl SshTransport {
    /// Connect to the SSH server, authenticate and start a shell.
    pub async fn connect(config: &SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        debug!("ssh: connecting to {}", config.socket_addr());
        let mut session = tokio::time::timeout(
            config.timeout,
            client::connect(ssh_config, (config.host.as_str(), config.port), handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| {
            // Prefer the detailed host key error over russh's generic one.
            match host_key_error.lock().ok().and_then(|mut slot| slot.take()) {
                Some(hk_err) => hk_err,
                None => TransportError::Ssh(e),
            }
        })?;

        Self::authenticate(&mut session, config).await?;
        let channel = Self::open_shell(&session, config).await?;
        debug!("ssh: shell open on {}", config.socket_addr());

        Ok(Self {
            session,
            channel,
            pending: VecDeque::new(),
            filter: LineFilter,
            settle_delay: config.settle_delay,
        })
    }

    /// Open a session channel with an xterm PTY and start a shell.
    async fn open_shell(session: &Handle<SshHandler>, config: &SshConfig) -> Result<Channel<Msg>> {
        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                config.terminal_width,
                config.terminal_height,
                0,
                0,
                &[
                    (Pty::ECHO, 1),
                    (Pty::TTY_OP_ISPEED, TERMINAL_SPEED),
                    (Pty::TTY_OP_OSPEED, TERMINAL_SPEED),
                ],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel)
    }

    /// Try each configured method until the server accepts one.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let user = config.username.as_str();

        if config.auth.is_empty() {
            let accepted = session
                .authenticate_none(user)
                .await
                .map_err(TransportError::Ssh)?
                .success();
            return accepted_or_failed(accepted, user);
        }

        for method in &config.auth {
            let accepted = match method {
                AuthMethod::Password(password) => session
                    .authenticate_password(user, password.expose_secret())
                    .await
                    .map_err(TransportError::Ssh)?
                    .success(),
                AuthMethod::PrivateKey { path, passphrase } => {
                    let key = load_secret_key(path, passphrase.as_ref().map(|p| p.expose_secret()))
                        .map_err(|e| TransportError::Key(format!("{}: {}", path.display(), e)))?;
                    Self::authenticate_key(session, user, key).await?
                }
                AuthMethod::KeyData { key, passphrase } => {
                    let key = decode_secret_key(
                        key.expose_secret(),
                        passphrase.as_ref().map(|p| p.expose_secret()),
                    )
                    .map_err(|e| TransportError::Key(e.to_string()))?;
                    Self::authenticate_key(session, user, key).await?
                }
            };

            if accepted {
                debug!("ssh: authenticated as {}", user);
                return Ok(());
            }
            trace!("ssh: auth method rejected for {}", user);
        }

        accepted_or_failed(false, user)
    }

    async fn authenticate_key(
        session: &mut Handle<SshHandler>,
        user: &str,
        key: russh::keys::PrivateKey,
    ) -> Result<bool> {
        // Get the best RSA hash algorithm supported by the server
        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .map_err(TransportError::Ssh)?
            .flatten();

        Ok(session
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
            .await
            .map_err(TransportError::Ssh)?
            .success())
    }
}

fn accepted_or_failed(accepted: bool, user: &str) -> Result<()> {
    if accepted {
        Ok(())
    } else {
        Err(TransportError::AuthenticationFailed {
            user: user.to_string(),
        }
        .into())
    }
}

/// Where channel messages for the shell come from.
trait MessageSource: Send {
    /// Next message, or `None` once the channel is gone.
    fn wait(&mut self) -> impl Future<Output = Option<ChannelMsg>> + Send;
}

impl MessageSource for Channel<Msg> {
    fn wait(&mut self) -> impl Future<Output = Option<ChannelMsg>> + Send {
        Channel::wait(self)
    }
}

/// Take the next byte, polling `source` with a growing sleep while it has
/// nothing buffered. The caller's deadline is the only bound.
async fn next_byte<S: MessageSource>(source: &mut S, pending: &mut VecDeque<u8>) -> Result<u8> {
    let mut backoff = POLL_BACKOFF_MIN;
    loop {
        if let Some(byte) = pending.pop_front() {
            return Ok(byte);
        }

        match tokio::time::timeout(Duration::ZERO, source.wait()).await {
            Ok(Some(ChannelMsg::Data { data })) => pending.extend(data.as_ref()),
            // stderr is part of the terminal output
            Ok(Some(ChannelMsg::ExtendedData { data, .. })) => pending.extend(data.as_ref()),
            Ok(Some(ChannelMsg::Eof)) | Ok(Some(ChannelMsg::Close)) | Ok(None) => {
                return Err(ChannelError::Closed.into());
            }
            Ok(Some(other)) => trace!("ssh: ignoring {:?}", other),
            Err(_) => {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(POLL_BACKOFF_MAX);
            }
        }
    }
}

impl Transport for SshTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    async fn read_byte(&mut self) -> Result<u8> {
        next_byte(&mut self.channel, &mut self.pending).await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.channel.data(data).await.map_err(ChannelError::Ssh)?;
        Ok(())
    }

    fn filter(&mut self, byte: u8) -> Filtered {
        self.filter.filter(byte)
    }

    fn pacing(&self) -> WritePacing {
        WritePacing {
            post_write: self.settle_delay,
            ..WritePacing::NONE
        }
    }

    fn login_policy(&self) -> LoginPolicy {
        LOGIN_POLICY
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Err(e) = self.channel.eof().await {
            trace!("ssh: eof on closing channel failed: {}", e);
        }
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

impl Connector for SshConfig {
    type Transport = SshTransport;

    fn target(&self) -> String {
        self.socket_addr()
    }

    async fn connect(&self) -> Result<SshTransport> {
        SshTransport::connect(self).await
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    /// Apply the verification mode; `Err` carries the reason for rejecting.
    fn verify(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(()),
            HostKeyVerification::AcceptNew => {
                if !self.check_known_hosts(pubkey)? {
                    debug!("ssh: learning host key for {}:{}", self.host, self.port);
                    if let Err(e) = self.learn_host_key(pubkey) {
                        warn!("Failed to save host key: {}", e);
                    }
                }
                Ok(())
            }
            HostKeyVerification::Strict => {
                if self.check_known_hosts(pubkey)? {
                    Ok(())
                } else {
                    Err(TransportError::HostKeyUnknown {
                        host: self.host.clone(),
                        port: self.port,
                    })
                }
            }
        }
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.verify(server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("ssh: rejecting host key for {}:{}: {}", self.host, self.port, e);
                if let Ok(mut slot) = self.host_key_error.lock() {
                    *slot = Some(e);
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use russh::CryptoVec;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
    use tokio::time::Instant;

    use super::*;
    use crate::error::Error;

    const KEY_A: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEB";
    const KEY_B: &str =
        "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgIC";

    fn handler(mode: HostKeyVerification, known_hosts: PathBuf) -> SshHandler {
        SshHandler {
            host: "192.0.2.10".into(),
            port: 2222,
            host_key_verification: mode,
            known_hosts_path: Some(known_hosts),
            host_key_error: Arc::new(Mutex::new(None)),
        }
    }

    fn key(text: &str) -> PublicKey {
        PublicKey::from_openssh(text).unwrap()
    }

    #[test]
    fn test_login_policy_skips_credentials() {
        assert!(!LOGIN_POLICY.prompts_for_credentials);
        assert_eq!(LOGIN_POLICY.retry, LoginRetry::Fail);
    }

    #[test]
    fn test_accept_new_learns_then_matches() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(HostKeyVerification::AcceptNew, dir.path().join("known_hosts"));

        h.verify(&key(KEY_A)).unwrap();
        assert!(h.check_known_hosts(&key(KEY_A)).unwrap());
        h.verify(&key(KEY_A)).unwrap();
    }

    #[test]
    fn test_changed_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(HostKeyVerification::AcceptNew, dir.path().join("known_hosts"));
        h.verify(&key(KEY_A)).unwrap();

        let err = h.verify(&key(KEY_B)).unwrap_err();
        assert!(matches!(err, TransportError::HostKeyChanged { port: 2222, .. }));
    }

    #[test]
    fn test_strict_rejects_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(HostKeyVerification::Strict, dir.path().join("known_hosts"));
        let err = h.verify(&key(KEY_A)).unwrap_err();
        assert!(matches!(err, TransportError::HostKeyUnknown { .. }));
    }

    #[test]
    fn test_disabled_accepts_anything() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(HostKeyVerification::Disabled, dir.path().join("known_hosts"));
        h.verify(&key(KEY_B)).unwrap();
        assert!(!dir.path().join("known_hosts").exists());
    }

    /// Scripted channel that notes when it was polled.
    struct ScriptedChannel {
        rx: UnboundedReceiver<ChannelMsg>,
        polls: Vec<Instant>,
    }

    impl MessageSource for ScriptedChannel {
        async fn wait(&mut self) -> Option<ChannelMsg> {
            self.polls.push(Instant::now());
            self.rx.recv().await
        }
    }

    fn scripted() -> (ScriptedChannel, UnboundedSender<ChannelMsg>) {
        let (tx, rx) = unbounded_channel();
        (ScriptedChannel { rx, polls: Vec::new() }, tx)
    }

    fn data(bytes: &[u8]) -> ChannelMsg {
        ChannelMsg::Data {
            data: CryptoVec::from_slice(bytes),
        }
    }

    #[tokio::test]
    async fn test_stderr_is_merged_into_output() {
        let (mut source, tx) = scripted();
        let mut pending = VecDeque::new();
        tx.send(data(b"ok")).unwrap();
        tx.send(ChannelMsg::Success).unwrap();
        tx.send(ChannelMsg::ExtendedData {
            data: CryptoVec::from_slice(b"!\n"),
            ext: 1,
        })
        .unwrap();

        let mut out = Vec::new();
        for _ in 0..4 {
            out.push(next_byte(&mut source, &mut pending).await.unwrap());
        }
        assert_eq!(out, b"ok!\n");
    }

    #[tokio::test]
    async fn test_eof_after_buffered_bytes_is_closed() {
        let (mut source, tx) = scripted();
        let mut pending = VecDeque::new();
        tx.send(data(b"#")).unwrap();
        tx.send(ChannelMsg::Eof).unwrap();

        assert_eq!(next_byte(&mut source, &mut pending).await.unwrap(), b'#');
        let err = next_byte(&mut source, &mut pending).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_close_and_dropped_channel_are_closed() {
        let (mut source, tx) = scripted();
        let mut pending = VecDeque::new();
        tx.send(ChannelMsg::Close).unwrap();
        let err = next_byte(&mut source, &mut pending).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));

        drop(tx);
        let err = next_byte(&mut source, &mut pending).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_channel_polls_with_backoff() {
        let (mut source, _tx) = scripted();
        let mut pending = VecDeque::new();

        let read = tokio::time::timeout(
            Duration::from_secs(1),
            next_byte(&mut source, &mut pending),
        )
        .await;
        assert!(read.is_err());

        let gaps: Vec<u64> = source
            .polls
            .windows(2)
            .map(|w| (w[1] - w[0]).as_millis() as u64)
            .collect();
        assert_eq!(gaps[..5], [10, 20, 40, 80, 100]);
        assert!(gaps[5..].iter().all(|&gap| gap == 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_data_is_picked_up() {
        let (mut source, tx) = scripted();
        let mut pending = VecDeque::new();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(45)).await;
            tx.send(data(b">")).unwrap();
            // keep the channel open until the read is done
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let start = Instant::now();
        assert_eq!(next_byte(&mut source, &mut pending).await.unwrap(), b'>');
        // Polls at 0, 10, 30 and 70 ms.
        assert_eq!(start.elapsed(), Duration::from_millis(70));
    }
}
