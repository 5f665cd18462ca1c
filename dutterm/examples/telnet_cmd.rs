//! Basic example: log in over Telnet and run one command
//!
//! # Usage
//!
//! ```bash
//! cargo run --example telnet_cmd -- --host 192.168.1.1 --user admin --password secret "show version"
//! ```
//!
//! Set `RUST_LOG=debug` to see the login sequence.

use std::env;
use std::time::Duration;

use dutterm::{Driver, DriverBuilder, TelnetConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("Connecting to {}:{}...", args.host, args.port);
    let mut driver = DriverBuilder::new()
        .username(&args.user)
        .password(&args.password)
        .timeout(Duration::from_secs(args.timeout))
        .line_break("\r\n")
        .callback(r"--More--", b" ")
        .bye_command("exit")
        .build(TelnetConfig::new(&args.host).with_port(args.port))?;

    driver.set_session_file("telnet_cmd.log")?;
    driver.open_and_login().await?;
    println!("Logged in");

    println!("{}", "-".repeat(50));
    println!("{}", driver.cmd(&args.command).await?);
    println!("{}", "-".repeat(50));

    driver.close().await?;
    println!("Session recorded to telnet_cmd.log");
    Ok(())
}

/// Simple argument parser
struct Args {
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: u64,
    command: String,
}

impl Args {
    fn parse() -> Self {
        let mut args = Self {
            host: "localhost".to_string(),
            port: 23,
            user: String::new(),
            password: String::new(),
            timeout: 10,
            command: "show version".to_string(),
        };

        let mut iter = env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--host" | "-h" => args.host = iter.next().unwrap_or(args.host),
                "--port" | "-p" => {
                    args.port = iter.next().and_then(|v| v.parse().ok()).unwrap_or(23)
                }
                "--user" | "-u" => args.user = iter.next().unwrap_or_default(),
                "--password" | "-P" => args.password = iter.next().unwrap_or_default(),
                "--timeout" | "-t" => {
                    args.timeout = iter.next().and_then(|v| v.parse().ok()).unwrap_or(10)
                }
                "--help" => {
                    println!(
                        "usage: telnet_cmd [--host H] [--port P] [--user U] [--password P] [--timeout SECS] [COMMAND]"
                    );
                    std::process::exit(0);
                }
                _ => args.command = arg,
            }
        }
        args
    }
}
