//! Acquisition run against a real board
//!
//! Loads an application config, applies every setting and collects once.
//!
//! Usage:
//!   cargo run --example acquire -- [OPTIONS] CONFIG
//!
//! Options:
//!   --port PORT       Override the configured serial port
//!
//! Logging follows RUST_LOG, falling back to the config's LogLevel.

use anyhow::{bail, Context, Result};
use daqlink_core::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let mut config_path = None;
    let mut port_override = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" | "-p" => {
                port_override = Some(args.next().context("--port needs a value")?);
            }
            other if other.starts_with('-') => bail!("unknown option {}", other),
            other => config_path = Some(other.to_string()),
        }
    }

    let path = config_path.context("missing config path")?;
    let mut config =
        AppConfig::load(&path).with_context(|| format!("loading config from {}", path))?;
    if let Some(port) = port_override {
        config.serial_configuration.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_deref().unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let session = AcquisitionSession::serial(config.timing.into());
    session.initialize(&config.serial_configuration)?;

    let report = session.acquire(&config.daq_configuration)?;
    for (command, ok) in &report.acknowledgements {
        println!("{:<14} {}", command.to_string(), if *ok { "ok" } else { "FAILED" });
    }
    println!("{} values collected", report.values.len());
    for chunk in report.values.chunks(16) {
        let line: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
        println!("{}", line.join(" "));
    }

    session.reset()?;
    session.uninitialize();
    Ok(())
}
