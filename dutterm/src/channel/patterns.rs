//! Prompt patterns used to detect login, password and shell prompts.

use regex::bytes::Regex;

use crate::error::ChannelError;

/// Default shell prompt: a line ending in `$`, `%`, `#` or `>`.
pub const DEFAULT_PROMPT: &str = r"(?msi:[\$%#>]\s*$)";

/// Default login prompt: `Username:` / `User name:` at the end of the line.
pub const DEFAULT_LOGIN_PROMPT: &str = r"(?msi:user(\s)?name:\s*$)";

/// Default password prompt: `Password:` at the end of the line.
pub const DEFAULT_PASSWORD_PROMPT: &str = r"(?msi:password:\s*$)";

/// Compile a caller-supplied pattern, keeping the pattern text in the error.
pub fn compile_pattern(pattern: &str) -> Result<Regex, ChannelError> {
    Regex::new(pattern).map_err(|source| ChannelError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// The three prompts the login sequence and command execution wait for.
///
/// The command prompt is always present; the login and password prompts
/// fall back to [`DEFAULT_LOGIN_PROMPT`] and [`DEFAULT_PASSWORD_PROMPT`].
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Shell prompt that ends every command's output.
    pub command: Regex,

    /// Prompt asking for the username.
    pub login: Regex,

    /// Prompt asking for the password.
    pub password: Regex,
}

impl PromptSet {
    /// Create a prompt set from a command prompt pattern.
    pub fn new(command: &str) -> Result<Self, ChannelError> {
        Ok(Self {
            command: compile_pattern(command)?,
            login: compile_pattern(DEFAULT_LOGIN_PROMPT)?,
            password: compile_pattern(DEFAULT_PASSWORD_PROMPT)?,
        })
    }

    /// Override the login prompt pattern.
    pub fn with_login(mut self, pattern: &str) -> Result<Self, ChannelError> {
        self.login = compile_pattern(pattern)?;
        Ok(self)
    }

    /// Override the password prompt pattern.
    pub fn with_password(mut self, pattern: &str) -> Result<Self, ChannelError> {
        self.password = compile_pattern(pattern)?;
        Ok(self)
    }
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            command: Regex::new(DEFAULT_PROMPT).expect("Invalid built-in prompt pattern"),
            login: Regex::new(DEFAULT_LOGIN_PROMPT).expect("Invalid built-in prompt pattern"),
            password: Regex::new(DEFAULT_PASSWORD_PROMPT).expect("Invalid built-in prompt pattern"),
        }
    }
}
