//! # dutterm
//!
//! Async terminal drivers for automating devices under test over Telnet,
//! SSH and serial consoles.
//!
//! dutterm opens a session, walks the in-band login, runs commands up to the
//! next prompt and records everything it reads. Transport noise (Telnet
//! option negotiation, ANSI escape sequences, serial padding) is filtered
//! before prompt matching, and pagination prompts such as `--More--` are
//! answered automatically through callbacks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dutterm::{Driver, DutConfig, TransportKind, new_driver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dutterm::Error> {
//!     let config = DutConfig {
//!         ip: "192.168.1.1".into(),
//!         username: "admin".into(),
//!         password: "secret".into(),
//!         ..Default::default()
//!     };
//!
//!     let mut driver = new_driver(TransportKind::Telnet, &config)?;
//!     driver.set_session_file("logs/telnet.log")?;
//!     driver.open_and_login().await?;
//!
//!     let version = driver.cmd("show version").await?;
//!     println!("{version}");
//!
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod driver;
pub mod error;
pub mod factory;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use channel::CallbackRule;
pub use config::DutConfig;
pub use driver::{Credentials, Driver, DriverBuilder, GenericDriver};
pub use error::{Error, Result};
pub use factory::{AnyDriver, new_driver, new_driver_with_session_file, new_driver_with_session_writer};
pub use transport::{SerialConfig, SshConfig, TelnetConfig, TransportKind};
