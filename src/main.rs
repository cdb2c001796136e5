//! slircd-services - replay driver for the services core.
//!
//! Reads newline-delimited JSON events on stdin, ticks the timer queue
//! once a second and writes directives to stdout as JSON lines.
//!
//! Usage: `slircd-services [config.toml] [directory.json]`

use slircd_services::config::{Config, validate};
use slircd_services::services::{
    ChannelTable, Event, JsonOutput, MemoryDirectory, NetworkOutput, Services,
};
use slircd_services::SystemClock;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // stdout carries directives, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).map_err(|e| {
            error!(path = %config_path, error = %e, "Failed to load config");
            e
        })?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        Config::default()
    };

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s)", errors.len());
    }

    let directory = match args.next() {
        Some(path) => MemoryDirectory::load(&path).map_err(|e| {
            error!(path = %path, error = %e, "Failed to load account directory");
            e
        })?,
        None => MemoryDirectory::new(),
    };
    info!(
        accounts = directory.account_count(),
        nicks = directory.nick_count(),
        "Loaded account directory"
    );

    let mut services = Services::new(config, directory, ChannelTable::new(), SystemClock);
    let mut output = JsonOutput::new(std::io::stdout());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Event>(line) {
                        Ok(event) => services.handle(event),
                        Err(e) => warn!(error = %e, "Malformed event"),
                    }
                }
                None => {
                    info!("Event feed closed");
                    break;
                }
            },
            _ = tick.tick() => {
                services.run_timers();
            }
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
        }

        for directive in services.take_directives() {
            output.dispatch(&directive);
        }
    }

    for directive in services.take_directives() {
        output.dispatch(&directive);
    }
    services.shutdown();
    Ok(())
}
