//! In-memory (single process) implementation of the relay store for local
//! development and tests. Expiry is lazy: deadlines are checked on access,
//! driven by `tokio::time` so tests can pause and advance the clock.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tailcast_store::{Event, Store, Subscription};
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;

/// Buffered wakeups per topic before subscribers start coalescing.
const TOPIC_BUFFER: usize = 64;

#[derive(Debug)]
struct Entry {
    data: BytesMut,
    deadline: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= Instant::now())
    }
}

/// In-memory store implementation.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Event>>>>,
}

impl MemoryStore {
    /// Creates a new `MemoryStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Drops `key` if its deadline has passed, then hands back what remains.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(Entry::expired) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn to_index(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[async_trait]
impl Store for MemoryStore {
    type Error = Error;
    type Subscription = MemorySubscription;

    async fn append<K: Into<String> + Send>(
        &self,
        key: K,
        bytes: Bytes,
    ) -> Result<u64, Self::Error> {
        let key = key.into();
        let mut entries = self.entries.lock().await;

        if let Some(entry) = live(&mut entries, &key) {
            entry.data.extend_from_slice(&bytes);
            return Ok(entry.data.len() as u64);
        }

        let len = bytes.len() as u64;
        entries.insert(
            key,
            Entry {
                data: BytesMut::from(bytes.as_ref()),
                deadline: None,
            },
        );

        Ok(len)
    }

    async fn delete<K: Into<String> + Send>(&self, key: K) -> Result<(), Self::Error> {
        let mut entries = self.entries.lock().await;
        entries.remove(&key.into());
        Ok(())
    }

    async fn exists<K: Into<String> + Send>(&self, key: K) -> Result<bool, Self::Error> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, &key.into()).is_some())
    }

    async fn expire<K: Into<String> + Send>(
        &self,
        key: K,
        ttl: Duration,
    ) -> Result<(), Self::Error> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = live(&mut entries, &key.into()) {
            entry.deadline = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Bytes>, Self::Error> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, &key.into()).map(|entry| Bytes::copy_from_slice(&entry.data)))
    }

    async fn length<K: Into<String> + Send>(&self, key: K) -> Result<u64, Self::Error> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, &key.into()).map_or(0, |entry| entry.data.len() as u64))
    }

    async fn publish<K: Into<String> + Send>(
        &self,
        topic: K,
        event: Event,
    ) -> Result<(), Self::Error> {
        let topics = self.topics.lock().await;
        if let Some(tx) = topics.get(&topic.into()) {
            // Send only fails when there are no subscribers.
            let _ = tx.send(event);
        }
        Ok(())
    }

    async fn put<K: Into<String> + Send>(&self, key: K, bytes: Bytes) -> Result<(), Self::Error> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.into(),
            Entry {
                data: BytesMut::from(bytes.as_ref()),
                deadline: None,
            },
        );
        Ok(())
    }

    async fn put_with_expiry<K: Into<String> + Send>(
        &self,
        key: K,
        bytes: Bytes,
        ttl: Duration,
    ) -> Result<(), Self::Error> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.into(),
            Entry {
                data: BytesMut::from(bytes.as_ref()),
                deadline: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn read_range<K: Into<String> + Send>(
        &self,
        key: K,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, Self::Error> {
        let mut entries = self.entries.lock().await;

        Ok(live(&mut entries, &key.into()).map_or_else(Bytes::new, |entry| {
            let len = entry.data.len();
            let start = to_index(offset).min(len);
            let end = to_index(offset.saturating_add(limit)).min(len);
            Bytes::copy_from_slice(&entry.data[start..end])
        }))
    }

    async fn subscribe<K: Into<String> + Send>(
        &self,
        topic: K,
    ) -> Result<Self::Subscription, Self::Error> {
        let mut topics = self.topics.lock().await;
        let tx = topics
            .entry(topic.into())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0);

        Ok(MemorySubscription { rx: tx.subscribe() })
    }
}

/// Subscription to a single topic of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySubscription {
    rx: broadcast::Receiver<Event>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Option<Event> {
        match self.rx.recv().await {
            Ok(event) => Some(event),
            // Overflow degrades to a coalesced data wakeup; the subscriber
            // re-reads store state and misses nothing.
            Err(broadcast::error::RecvError::Lagged(_)) => Some(Event::Data),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
