use std::time::Duration;

use tailcast_blob::BlobStore;
use tailcast_broker::Registrar;
use tailcast_store::Store;

use crate::auth::{self, Credential};

/// Configuration for the HTTP facade.
#[derive(Clone, Debug)]
pub struct Config {
    /// Keepalive interval for idle subscribers.
    pub heartbeat: Duration,

    /// Idle lifetime of a stream in the store; refreshed on activity.
    pub channel_expire: Duration,

    /// `|`-separated `user:password` pairs accepted for stream creation.
    /// `None` disables authentication.
    pub credentials: Option<String>,

    /// Reject requests that were not forwarded over HTTPS.
    pub enforce_https: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(30),
            channel_expire: Duration::from_secs(3600),
            credentials: None,
            enforce_https: false,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone, Debug)]
pub struct AppState<S: Store, B: BlobStore> {
    pub(crate) store: S,
    pub(crate) registrar: Registrar<S>,
    pub(crate) blob: Option<B>,
    pub(crate) heartbeat: Duration,
    pub(crate) channel_expire: Duration,
    pub(crate) credentials: Vec<Credential>,
    pub(crate) enforce_https: bool,
}

impl<S: Store, B: BlobStore> AppState<S, B> {
    /// Builds handler state over a store, an optional blob store for
    /// post-completion handoff, and the facade configuration.
    pub fn new(store: S, blob: Option<B>, config: Config) -> Self {
        let credentials = config
            .credentials
            .as_deref()
            .map(auth::parse)
            .unwrap_or_default();

        Self {
            registrar: Registrar::new(store.clone(), config.channel_expire),
            store,
            blob,
            heartbeat: config.heartbeat,
            channel_expire: config.channel_expire,
            credentials,
            enforce_https: config.enforce_https,
        }
    }
}
