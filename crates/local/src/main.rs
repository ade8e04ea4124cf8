//! Binary to run the relay locally: in-memory store, optional HTTP blob
//! handoff, graceful shutdown on SIGINT/SIGTERM.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

use error::Result;

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tailcast_blob::HttpBlobStore;
use tailcast_server::{router, AppState, Config, Server};
use tailcast_store_memory::MemoryStore;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(long, default_value_t = 5001, env = "PORT")]
    port: u16,

    /// Base URL completed streams are uploaded to; unset disables handoff
    #[arg(long, env = "STORAGE_BASE_URL")]
    storage_base_url: Option<String>,

    /// Seconds between keepalives on idle subscriber connections
    #[arg(long, default_value_t = 30, env = "HEARTBEAT_DURATION")]
    heartbeat_duration: u64,

    /// Seconds of inactivity before a stream expires
    #[arg(long, default_value_t = 3600, env = "CHANNEL_EXPIRE")]
    channel_expire: u64,

    /// Reject requests that were not forwarded over HTTPS
    #[arg(long, env = "ENFORCE_HTTPS")]
    enforce_https: bool,

    /// `|`-separated user:password pairs required to create streams
    #[arg(long, env = "CREDENTIALS")]
    credentials: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .finish(),
    )?;

    let args = Args::parse();

    let store = MemoryStore::new();
    let blob = args.storage_base_url.clone().map(HttpBlobStore::new);
    let state = AppState::new(
        store,
        blob,
        Config {
            heartbeat: Duration::from_secs(args.heartbeat_duration),
            channel_expire: Duration::from_secs(args.channel_expire),
            credentials: args.credentials.clone(),
            enforce_https: args.enforce_https,
        },
    );

    let listen_addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let server = Server::new(listen_addr);
    let _handle = server.start(router(state)).await?;
    info!("listening on {listen_addr}");

    // Wait for either SIGINT (Ctrl-C) or SIGTERM
    if cfg!(unix) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler failed");
        let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler failed");

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    } else {
        // Fall back to just ctrl-c on non-unix platforms
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutting down");

    server.shutdown().await;

    info!("Shutdown complete");

    Ok(())
}
