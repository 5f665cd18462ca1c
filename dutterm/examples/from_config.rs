//! Factory example: build a driver from a JSON device description
//!
//! # Usage
//!
//! ```bash
//! cargo run --example from_config -- dut.json serial "show interfaces"
//! ```
//!
//! where `dut.json` looks like:
//!
//! ```json
//! {
//!     "ip": "192.168.1.1",
//!     "username": "admin",
//!     "password": "secret",
//!     "serial": { "port_name": "/dev/ttyUSB0", "baud_rate": 115200, "linebreak": "\r" },
//!     "ssh": { "host_key_verification": "accept_new" }
//! }
//! ```

use std::env;

use dutterm::{Driver, DutConfig, TransportKind, new_driver_with_session_writer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = env::args().skip(1);
    let (Some(path), Some(kind)) = (args.next(), args.next()) else {
        eprintln!("usage: from_config <config.json> <telnet|ssh|serial> [COMMAND]");
        std::process::exit(1);
    };
    let command = args.next().unwrap_or_else(|| "show version".to_string());

    let config: DutConfig = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let kind: TransportKind = kind.parse()?;

    // Echo the raw session to stderr while the command runs.
    let mut driver = new_driver_with_session_writer(kind, &config, std::io::stderr())?;
    driver.open_and_login().await?;

    let output = driver.cmd(&command).await?;
    println!("{output}");

    driver.close().await?;
    Ok(())
}
