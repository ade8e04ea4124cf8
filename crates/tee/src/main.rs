//! CLI that reads stdin and forwards it to a stream URL with retries.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tailcast_tee::{Forwarder, ForwarderOptions};
use tracing::{error, info, Instrument};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Stream URL to publish stdin to
    url: String,

    /// Retries allowed after the first attempt
    #[arg(long, default_value_t = 5, env = "TAILCAST_RETRY_MAX")]
    retry_max: u32,

    /// Seconds to pause between attempts
    #[arg(long, default_value_t = 1, env = "TAILCAST_RETRY_SLEEP")]
    retry_sleep: u64,

    /// Append logs to this file; without it the forwarder is silent
    #[arg(long, env = "TAILCAST_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Extra key=value field attached to every log line (repeatable)
    #[arg(long = "log-field", value_parser = parse_field)]
    log_fields: Vec<(String, String)>,
}

fn parse_field(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(key, field)| (key.to_string(), field.to_string()))
        .ok_or_else(|| format!("unexpected log field {value:?}. Format expected: key=value"))
}

fn init_logging(log_file: Option<&Path>) {
    let Some(path) = log_file else {
        return;
    };

    // An unopenable log file degrades to silence, same as no file at all.
    if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        tracing_subscriber::fmt()
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_file.as_deref());

    let fields = args
        .log_fields
        .iter()
        .map(|(key, field)| format!("{key}={field}"))
        .collect::<Vec<_>>()
        .join(" ");
    let span = tracing::info_span!("forward", url = %args.url, fields = %fields);

    let forwarder = Forwarder::new(ForwarderOptions {
        url: args.url.clone(),
        max_retries: args.retry_max,
        sleep_duration: Duration::from_secs(args.retry_sleep),
    });

    match forwarder.stream(tokio::io::stdin()).instrument(span).await {
        Ok(status) => {
            info!(%status, "upload complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("upload failed: {err}");
            ExitCode::FAILURE
        }
    }
}
