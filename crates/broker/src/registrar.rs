use std::time::Duration;

use bytes::Bytes;
use tailcast_store::{Event, Store};

use crate::channel::Channel;
use crate::error::Error;

/// Records existence, liveness, and terminal state of stream ids.
///
/// Every operation touches exactly one key; store errors surface verbatim.
#[derive(Clone, Debug)]
pub struct Registrar<S: Store> {
    store: S,
    channel_expire: Duration,
}

impl<S: Store> Registrar<S> {
    /// Creates a registrar whose streams expire `channel_expire` after their
    /// last activity.
    pub const fn new(store: S, channel_expire: Duration) -> Self {
        Self {
            store,
            channel_expire,
        }
    }

    /// Registers `id`. Idempotent; re-registration refreshes the expiry.
    pub async fn register(&self, id: &str) -> Result<(), Error<S::Error>> {
        let channel = Channel::new(id);
        self.store
            .put_with_expiry(channel.registration_key(), Bytes::new(), self.channel_expire)
            .await?;
        Ok(())
    }

    /// Tests whether `id` is currently registered.
    pub async fn is_registered(&self, id: &str) -> Result<bool, Error<S::Error>> {
        let channel = Channel::new(id);
        Ok(self.store.exists(channel.registration_key()).await?)
    }

    /// Marks the stream complete and wakes its readers.
    pub async fn mark_done(&self, id: &str) -> Result<(), Error<S::Error>> {
        let channel = Channel::new(id);
        self.store
            .put_with_expiry(channel.done_key(), Bytes::new(), self.channel_expire)
            .await?;
        self.store.publish(channel.topic(), Event::Done).await?;
        Ok(())
    }

    /// Tests the completion marker.
    pub async fn is_done(&self, id: &str) -> Result<bool, Error<S::Error>> {
        let channel = Channel::new(id);
        Ok(self.store.exists(channel.done_key()).await?)
    }

    /// Forcibly terminates the stream and wakes its readers.
    pub async fn kill(&self, id: &str) -> Result<(), Error<S::Error>> {
        let channel = Channel::new(id);
        self.store
            .put_with_expiry(channel.kill_key(), Bytes::new(), self.channel_expire)
            .await?;
        self.store.publish(channel.topic(), Event::Killed).await?;
        Ok(())
    }

    /// Tests the kill marker.
    pub async fn is_killed(&self, id: &str) -> Result<bool, Error<S::Error>> {
        let channel = Channel::new(id);
        Ok(self.store.exists(channel.kill_key()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tailcast_store_memory::MemoryStore;

    fn registrar() -> Registrar<MemoryStore> {
        Registrar::new(MemoryStore::new(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registrar = registrar();

        assert!(!registrar.is_registered("stream").await.unwrap());
        registrar.register("stream").await.unwrap();
        registrar.register("stream").await.unwrap();
        assert!(registrar.is_registered("stream").await.unwrap());
    }

    #[tokio::test]
    async fn test_done_and_kill_markers() {
        let registrar = registrar();
        registrar.register("stream").await.unwrap();

        assert!(!registrar.is_done("stream").await.unwrap());
        registrar.mark_done("stream").await.unwrap();
        assert!(registrar.is_done("stream").await.unwrap());

        assert!(!registrar.is_killed("stream").await.unwrap());
        registrar.kill("stream").await.unwrap();
        assert!(registrar.is_killed("stream").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_expires() {
        let registrar = Registrar::new(MemoryStore::new(), Duration::from_secs(60));
        registrar.register("stream").await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!registrar.is_registered("stream").await.unwrap());
    }
}
