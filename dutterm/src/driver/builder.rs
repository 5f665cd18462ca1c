//! Builder for creating device drivers.

use std::time::Duration;

use secrecy::SecretString;

use super::generic::{DEFAULT_TIMEOUT, GenericDriver};
use super::login::Credentials;
use crate::channel::{
    CallbackRule, DEFAULT_LOGIN_PROMPT, DEFAULT_PASSWORD_PROMPT, DEFAULT_PROMPT, PromptSet,
};
use crate::error::{DriverError, Result};
use crate::transport::Connector;

/// Builder for constructing device drivers.
///
/// Patterns are kept as text until [`DriverBuilder::build`], which compiles
/// them and reports the first invalid one.
///
/// # Example
///
/// ```rust,no_run
/// use dutterm::driver::{Driver, DriverBuilder};
/// use dutterm::transport::TelnetConfig;
///
/// # async fn example() -> Result<(), dutterm::Error> {
/// let mut driver = DriverBuilder::new()
///     .username("admin")
///     .password("secret")
///     .prompt(r"[>#]\s*$")
///     .callback(r"--More--", b" ")
///     .build(TelnetConfig::new("192.168.1.1"))?;
///
/// driver.open_and_login().await?;
/// let version = driver.cmd("show version").await?;
/// println!("{version}");
/// driver.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DriverBuilder {
    username: String,
    password: SecretString,
    prompt: String,
    login_prompt: String,
    password_prompt: String,
    timeout: Duration,
    line_break: Vec<u8>,
    bye_commands: Vec<String>,
    callbacks: Vec<(String, Vec<u8>)>,
    rules: Vec<CallbackRule>,
}

impl DriverBuilder {
    /// Create a builder with default prompts and no credentials.
    pub fn new() -> Self {
        Self {
            username: String::new(),
            password: SecretString::from(String::new()),
            prompt: DEFAULT_PROMPT.to_string(),
            login_prompt: DEFAULT_LOGIN_PROMPT.to_string(),
            password_prompt: DEFAULT_PASSWORD_PROMPT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            line_break: b"\n".to_vec(),
            bye_commands: Vec::new(),
            callbacks: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Set the username for in-band login.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the password for in-band login.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = SecretString::from(password.into());
        self
    }

    /// Set the command prompt pattern.
    pub fn prompt(mut self, pattern: impl Into<String>) -> Self {
        self.prompt = pattern.into();
        self
    }

    /// Set the login prompt pattern.
    pub fn login_prompt(mut self, pattern: impl Into<String>) -> Self {
        self.login_prompt = pattern.into();
        self
    }

    /// Set the password prompt pattern.
    pub fn password_prompt(mut self, pattern: impl Into<String>) -> Self {
        self.password_prompt = pattern.into();
        self
    }

    /// Set the timeout for reads, writes and each login prompt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the bytes that end a line (default: `\n`).
    pub fn line_break(mut self, line_break: impl Into<Vec<u8>>) -> Self {
        self.line_break = line_break.into();
        self
    }

    /// Add a command sent before the session is closed.
    pub fn bye_command(mut self, command: impl Into<String>) -> Self {
        self.bye_commands.push(command.into());
        self
    }

    /// Set all bye commands at once.
    pub fn bye_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bye_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Answer lines matching `pattern` by writing `bytes`.
    pub fn callback(mut self, pattern: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.callbacks.push((pattern.into(), bytes.into()));
        self
    }

    /// Add an already compiled callback rule.
    pub fn callback_rule(mut self, rule: CallbackRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Build the driver.
    ///
    /// This creates the driver but does not connect. Call `open_and_login()`
    /// on the returned driver to establish the session.
    pub fn build<C: Connector>(self, connector: C) -> Result<GenericDriver<C>> {
        if self.timeout.is_zero() {
            return Err(DriverError::InvalidConfig {
                message: "timeout must be greater than zero".to_string(),
            }
            .into());
        }

        let prompts = PromptSet::new(&self.prompt)?
            .with_login(&self.login_prompt)?
            .with_password(&self.password_prompt)?;

        let mut rules = Vec::with_capacity(self.callbacks.len() + self.rules.len());
        for (pattern, bytes) in self.callbacks {
            rules.push(CallbackRule::send_raw(&pattern, bytes)?);
        }
        rules.extend(self.rules);

        Ok(GenericDriver::with_parts(
            connector,
            self.line_break,
            prompts,
            Credentials {
                username: self.username,
                password: self.password,
            },
            self.timeout,
            self.bye_commands,
            rules,
        ))
    }
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
