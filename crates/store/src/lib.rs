//! Traits for the key-value and wakeup seam backing the relay. The broker
//! talks to its store exclusively through these, so a networked backend can
//! replace the in-memory one without touching stream semantics.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for store errors
pub trait StoreError: Debug + Error + Send + Sync + 'static {}

/// A wakeup delivered to subscribers of a stream topic.
///
/// Events carry no payload. They only say "look at the store again": a
/// subscriber that wakes and finds new bytes has satisfied every queued
/// notification, so deliveries may be coalesced.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// Bytes were appended to the stream.
    Data,

    /// The writer closed the stream cleanly.
    Done,

    /// The stream was forcibly terminated.
    Killed,
}

/// A live subscription to a stream topic.
#[async_trait]
pub trait Subscription: Send + Sync + 'static {
    /// Waits for the next event. Returns `None` once the topic can produce
    /// no further events. Implementations whose buffers overflow must
    /// degrade to a coalesced [`Event::Data`], never an error.
    async fn next(&mut self) -> Option<Event>;
}

/// A trait representing a key-value store with byte-append and pub/sub
/// wakeups, with asynchronous operations.
///
/// Keys carrying an expiry vanish once their deadline passes; callers must
/// treat an absent key the same whether it expired or never existed.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// The error type for the store.
    type Error: StoreError;

    /// The subscription type produced by [`Store::subscribe`].
    type Subscription: Subscription;

    /// Atomically appends `bytes` to the value at `key`, creating it when
    /// absent, and returns the new total length.
    async fn append<K: Into<String> + Send>(
        &self,
        key: K,
        bytes: Bytes,
    ) -> Result<u64, Self::Error>;

    /// Deletes a key from the store.
    async fn delete<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error>;

    /// Tests whether a key is present (and unexpired).
    async fn exists<K: Into<String> + Send>(&self, key: K) -> Result<bool, Self::Error>;

    /// Resets the expiry of `key` to `ttl` from now. A no-op when the key is
    /// absent.
    async fn expire<K: Into<String> + Send>(
        &self,
        key: K,
        ttl: Duration,
    ) -> Result<(), Self::Error>;

    /// Retrieves the full value associated with a key.
    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Bytes>, Self::Error>;

    /// Returns the byte length of the value at `key`; 0 when absent.
    async fn length<K: Into<String> + Send>(&self, key: K) -> Result<u64, Self::Error>;

    /// Publishes an event to every current subscriber of `topic`.
    async fn publish<K: Into<String> + Send>(
        &self,
        topic: K,
        event: Event,
    ) -> Result<(), Self::Error>;

    /// Stores a key-value pair without an expiry.
    async fn put<K: Into<String> + Send>(&self, key: K, bytes: Bytes) -> Result<(), Self::Error>;

    /// Stores a key-value pair that expires `ttl` from now.
    async fn put_with_expiry<K: Into<String> + Send>(
        &self,
        key: K,
        bytes: Bytes,
        ttl: Duration,
    ) -> Result<(), Self::Error>;

    /// Returns the slice `[offset, min(offset + limit, len))` of the value
    /// at `key`. Empty when the key is absent or `offset` is past the end.
    async fn read_range<K: Into<String> + Send>(
        &self,
        key: K,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, Self::Error>;

    /// Subscribes to events on `topic`.
    async fn subscribe<K: Into<String> + Send>(
        &self,
        topic: K,
    ) -> Result<Self::Subscription, Self::Error>;
}
