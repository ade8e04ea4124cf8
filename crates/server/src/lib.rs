//! HTTP facade over the stream broker: translates verbs, headers, and
//! paths into broker calls and streams reader output back to consumers.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod auth;
mod error;
mod handlers;
mod metrics;
mod state;

pub use error::{Error, Result};
pub use state::{AppState, Config};

use std::future::IntoFuture;
use std::net::SocketAddr;

use axum::middleware;
use axum::routing::{get, put};
use axum::Router;
use tailcast_blob::BlobStore;
use tailcast_store::Store;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Builds the relay router over the given state. The wildcard segment lets
/// stream ids contain `/`.
pub fn router<S: Store, B: BlobStore>(state: AppState<S, B>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/streams/{*id}",
            put(handlers::create::<S, B>)
                .post(handlers::publish::<S, B>)
                .get(handlers::subscribe::<S, B>)
                .delete(handlers::kill::<S, B>),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_https::<S, B>,
        ))
        .with_state(state)
}

/// The relay's HTTP server lifecycle.
pub struct Server {
    listen_addr: SocketAddr,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl Server {
    /// Creates a new instance of `Server`.
    #[must_use]
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Binds the listen address and serves `router` until shutdown.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] on a second start; [`Error::Bind`] when the
    /// listen address is unavailable.
    pub async fn start(&self, router: Router) -> Result<JoinHandle<()>> {
        if self.task_tracker.is_closed() {
            return Err(Error::AlreadyStarted);
        }

        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .map_err(Error::Bind)?;
        let shutdown_token = self.shutdown_token.clone();

        let handle = self.task_tracker.spawn(async move {
            tokio::select! {
                result = axum::serve(listener, router).into_future() => {
                    info!("http server exited {result:?}");
                }
                () = shutdown_token.cancelled() => {}
            }
        });

        self.task_tracker.close();

        Ok(handle)
    }

    /// Stops serving and waits for the accept loop to wind down.
    pub async fn shutdown(&self) {
        info!("http server shutting down...");

        self.shutdown_token.cancel();
        self.task_tracker.wait().await;

        info!("http server shutdown");
    }
}
