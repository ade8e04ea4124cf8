use std::time::Duration;

use bytes::Bytes;
use tailcast_store::{Event, Store};

use crate::channel::Channel;
use crate::error::Error;

/// The single producer handle for a stream.
///
/// There is at most one active writer per stream; a producer that
/// reconnects must consult [`Writer::len`] and resume at the current log
/// length. Appends are serialized by the store, so even two producers racing
/// the same id cannot interleave a single append.
#[derive(Debug)]
pub struct Writer<S: Store> {
    store: S,
    channel: Channel,
    channel_expire: Duration,
}

impl<S: Store> Writer<S> {
    /// Opens a writer for `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotRegistered`] when the stream id is unknown or expired.
    /// - [`Error::AlreadyDone`] when the stream completed cleanly.
    /// - [`Error::Killed`] when the stream was forcibly terminated.
    pub async fn new(store: S, id: &str, channel_expire: Duration) -> Result<Self, Error<S::Error>> {
        let channel = Channel::new(id);

        if !store.exists(channel.registration_key()).await? {
            return Err(Error::NotRegistered);
        }
        if store.exists(channel.done_key()).await? {
            return Err(Error::AlreadyDone);
        }
        if store.exists(channel.kill_key()).await? {
            return Err(Error::Killed);
        }

        Ok(Self {
            store,
            channel,
            channel_expire,
        })
    }

    /// Current length of the log in bytes. A reconnecting producer discards
    /// this many leading bytes of its replayed input.
    pub async fn len(&self) -> Result<u64, Error<S::Error>> {
        Ok(self.store.length(self.channel.log_key()).await?)
    }

    /// Appends `bytes`, refreshes the stream's expiry, and wakes readers.
    /// Returns the new log length.
    pub async fn write(&self, bytes: Bytes) -> Result<u64, Error<S::Error>> {
        if bytes.is_empty() {
            return self.len().await;
        }

        if !self.store.exists(self.channel.registration_key()).await? {
            return Err(Error::Gone);
        }

        let length = self.store.append(self.channel.log_key(), bytes).await?;
        self.store
            .expire(self.channel.log_key(), self.channel_expire)
            .await?;
        self.store
            .expire(self.channel.registration_key(), self.channel_expire)
            .await?;
        self.store.publish(self.channel.topic(), Event::Data).await?;

        Ok(length)
    }

    /// Marks the stream complete and wakes readers. The marker is only
    /// published once every preceding append is observable, which is what
    /// lets readers treat "done and drained" as EOF.
    pub async fn close(self) -> Result<(), Error<S::Error>> {
        self.store
            .put_with_expiry(self.channel.done_key(), Bytes::new(), self.channel_expire)
            .await?;
        self.store.publish(self.channel.topic(), Event::Done).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tailcast_store_memory::MemoryStore;

    use crate::registrar::Registrar;

    const EXPIRE: Duration = Duration::from_secs(3600);

    async fn registered_store() -> MemoryStore {
        let store = MemoryStore::new();
        Registrar::new(store.clone(), EXPIRE)
            .register("stream")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_unregistered_stream_is_rejected() {
        let store = MemoryStore::new();

        assert!(matches!(
            Writer::new(store, "stream", EXPIRE).await,
            Err(Error::NotRegistered)
        ));
    }

    #[tokio::test]
    async fn test_write_appends_and_reports_length() {
        let store = registered_store().await;
        let writer = Writer::new(store.clone(), "stream", EXPIRE).await.unwrap();

        assert_eq!(writer.write(Bytes::from_static(b"hello ")).await.unwrap(), 6);
        assert_eq!(writer.write(Bytes::from_static(b"world")).await.unwrap(), 11);
        assert_eq!(writer.len().await.unwrap(), 11);

        assert_eq!(
            store.get("stream").await.unwrap(),
            Some(Bytes::from_static(b"hello world"))
        );
    }

    #[tokio::test]
    async fn test_closed_stream_rejects_new_writer() {
        let store = registered_store().await;

        let writer = Writer::new(store.clone(), "stream", EXPIRE).await.unwrap();
        writer.close().await.unwrap();

        assert!(matches!(
            Writer::new(store, "stream", EXPIRE).await,
            Err(Error::AlreadyDone)
        ));
    }

    #[tokio::test]
    async fn test_killed_stream_rejects_new_writer() {
        let store = registered_store().await;
        Registrar::new(store.clone(), EXPIRE)
            .kill("stream")
            .await
            .unwrap();

        assert!(matches!(
            Writer::new(store, "stream", EXPIRE).await,
            Err(Error::Killed)
        ));
    }

    #[tokio::test]
    async fn test_reconnecting_writer_resumes_at_length() {
        let store = registered_store().await;

        let first = Writer::new(store.clone(), "stream", EXPIRE).await.unwrap();
        first.write(Bytes::from_static(b"hello ")).await.unwrap();
        drop(first);

        let second = Writer::new(store.clone(), "stream", EXPIRE).await.unwrap();
        assert_eq!(second.len().await.unwrap(), 6);
        second.write(Bytes::from_static(b"world")).await.unwrap();

        assert_eq!(
            store.get("stream").await.unwrap(),
            Some(Bytes::from_static(b"hello world"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_after_expiry_is_gone() {
        let store = MemoryStore::new();
        Registrar::new(store.clone(), Duration::from_secs(60))
            .register("stream")
            .await
            .unwrap();

        let writer = Writer::new(store, "stream", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(matches!(
            writer.write(Bytes::from_static(b"late")).await,
            Err(Error::Gone)
        ));
    }
}
