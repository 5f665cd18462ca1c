//! Login sequencing.
//!
//! ```text
//! Connecting → AwaitLoginPrompt → SendUsername
//!            → AwaitPasswordPrompt → SendPassword
//!            → AwaitCommandPrompt → Ready
//! ```
//!
//! Empty credentials skip their await/send pair, and transports that
//! authenticate on their own (SSH) skip both. A prompt timeout is fatal
//! unless the transport asks for nudging, in which case a blank line is
//! sent and the sequence starts over until the overall bound passes.

use std::fmt;
use std::time::Duration;

use log::debug;
use regex::bytes::Regex;
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use crate::channel::{PromptSet, TermChannel};
use crate::error::{ChannelError, DriverError, Error, Result};
use crate::transport::{LoginRetry, Transport};

/// Username and password used for in-band login.
#[derive(Debug)]
pub struct Credentials {
    /// Username; empty skips the login prompt.
    pub username: String,

    /// Password; empty skips the password prompt.
    pub password: SecretString,
}

impl Credentials {
    /// Create a credential set.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// No username and no password.
    pub fn none() -> Self {
        Self::new("", "")
    }

    fn has_password(&self) -> bool {
        !self.password.expose_secret().is_empty()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::none()
    }
}

/// The prompt a login attempt is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// Waiting for the username prompt.
    LoginPrompt,
    /// Waiting for the password prompt.
    PasswordPrompt,
    /// Waiting for the shell prompt that ends the login.
    CommandPrompt,
}

impl LoginStage {
    fn pattern<'a>(&self, prompts: &'a PromptSet) -> &'a Regex {
        match self {
            LoginStage::LoginPrompt => &prompts.login,
            LoginStage::PasswordPrompt => &prompts.password,
            LoginStage::CommandPrompt => &prompts.command,
        }
    }

    fn retryable(&self) -> bool {
        !matches!(self, LoginStage::CommandPrompt)
    }
}

impl fmt::Display for LoginStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoginStage::LoginPrompt => "login prompt",
            LoginStage::PasswordPrompt => "password prompt",
            LoginStage::CommandPrompt => "command prompt",
        })
    }
}

/// Why a login attempt stopped short of the command prompt.
enum Interrupted {
    /// A prompt did not show up; the stage that was waiting.
    Timeout(LoginStage),
    Failed(Error),
}

impl From<Error> for Interrupted {
    fn from(e: Error) -> Self {
        Interrupted::Failed(e)
    }
}

/// Drives the username/password exchange over an attached channel.
pub struct LoginSequencer<'a, T> {
    channel: &'a mut TermChannel<T>,
    prompts: &'a PromptSet,
    credentials: &'a Credentials,
    timeout: Duration,
}

impl<'a, T: Transport> LoginSequencer<'a, T> {
    /// Prepare a login over `channel` with a per-prompt `timeout`.
    pub fn new(
        channel: &'a mut TermChannel<T>,
        prompts: &'a PromptSet,
        credentials: &'a Credentials,
        timeout: Duration,
    ) -> Self {
        Self {
            channel,
            prompts,
            credentials,
            timeout,
        }
    }

    /// Run the sequence to the command prompt.
    ///
    /// Returns the text read while waiting for the command prompt (banner,
    /// MOTD and the prompt itself).
    pub async fn run(mut self) -> Result<String> {
        let policy = self
            .channel
            .transport()
            .map(|t| t.login_policy())
            .ok_or(DriverError::NotConnected)?;
        let started = Instant::now();
        let bound = match policy.retry {
            LoginRetry::Fail => None,
            LoginRetry::Nudge { deadline_factor } => {
                Some(started + self.timeout.saturating_mul(deadline_factor))
            }
        };

        loop {
            match self.attempt(policy.prompts_for_credentials, bound).await {
                Ok(banner) => {
                    debug!("login: ready after {:?}", started.elapsed());
                    return Ok(banner);
                }
                Err(Interrupted::Timeout(stage))
                    if stage.retryable() && bound.is_some_and(|b| Instant::now() < b) =>
                {
                    debug!("login: no {}, nudging the device", stage);
                    self.channel.write_line("", self.timeout).await?;
                }
                Err(Interrupted::Timeout(stage)) => {
                    return Err(DriverError::LoginTimeout {
                        stage: stage.to_string(),
                        elapsed: started.elapsed(),
                    }
                    .into());
                }
                Err(Interrupted::Failed(e)) => return Err(e),
            }
        }
    }

    async fn attempt(
        &mut self,
        prompts_for_credentials: bool,
        bound: Option<Instant>,
    ) -> std::result::Result<String, Interrupted> {
        if prompts_for_credentials {
            if !self.credentials.username.is_empty() {
                self.await_prompt(LoginStage::LoginPrompt, bound).await?;
                self.channel
                    .write_line(&self.credentials.username, self.timeout)
                    .await?;
            }
            if self.credentials.has_password() {
                self.await_prompt(LoginStage::PasswordPrompt, bound).await?;
                self.channel
                    .write_line(self.credentials.password.expose_secret(), self.timeout)
                    .await?;
            }
        }
        self.await_prompt(LoginStage::CommandPrompt, bound).await
    }

    async fn await_prompt(
        &mut self,
        stage: LoginStage,
        bound: Option<Instant>,
    ) -> std::result::Result<String, Interrupted> {
        let timeout = match bound {
            Some(bound) => {
                let remaining = bound.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(Interrupted::Timeout(stage));
                }
                remaining.min(self.timeout)
            }
            None => self.timeout,
        };

        debug!("login: waiting for {}", stage);
        match self
            .channel
            .read_until(stage.pattern(self.prompts), timeout)
            .await
        {
            Ok(text) => Ok(text),
            Err(Error::Channel(ChannelError::ReadTimeout { .. })) => Err(Interrupted::Timeout(stage)),
            Err(e) => Err(Interrupted::Failed(e)),
        }
    }
}
