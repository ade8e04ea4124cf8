use std::time::Duration;

use bytes::Bytes;
use tailcast_store::{Store, Subscription};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::channel::Channel;
use crate::error::Error;

/// Bytes fetched per drain round trip.
const READ_CHUNK: u64 = 16 * 1024;

/// One step of a reader's output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReadEvent {
    /// The next run of stream bytes at the reader's cursor.
    Data(Bytes),

    /// The heartbeat interval elapsed with nothing to send. Emitted so the
    /// transport can keep idle connections alive; does not advance the
    /// cursor.
    Heartbeat,
}

/// A consumer handle: a blocking tail read of one stream from a byte offset.
///
/// [`Reader::next`] drains stored bytes past the cursor, then waits for
/// wakeups until the stream completes, is killed, or expires. The wakeup
/// subscription is taken out before the first drain, so a byte appended at
/// any point after construction is delivered exactly once: either by the
/// drain or by a wakeup-then-drain.
#[derive(Debug)]
pub struct Reader<S: Store> {
    store: S,
    channel: Channel,
    cursor: u64,
    heartbeat: Duration,
    subscription: S::Subscription,
    cancel: CancellationToken,
}

impl<S: Store> Reader<S> {
    /// Opens a reader for `id` starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] when the stream id is unknown or expired;
    /// the caller decides whether a persisted copy exists elsewhere.
    pub async fn new(
        store: S,
        id: &str,
        offset: u64,
        heartbeat: Duration,
    ) -> Result<Self, Error<S::Error>> {
        let channel = Channel::new(id);

        if !store.exists(channel.registration_key()).await? {
            return Err(Error::NotRegistered);
        }

        // Subscribe before the first drain so no append can slip between.
        let subscription = store.subscribe(channel.topic()).await?;

        Ok(Self {
            store,
            channel,
            cursor: offset,
            heartbeat,
            subscription,
            cancel: CancellationToken::new(),
        })
    }

    /// The byte offset the next [`ReadEvent::Data`] will start at.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.cursor
    }

    /// True when the stream completed cleanly and the cursor has consumed
    /// everything, i.e. this reader will never yield data.
    pub async fn is_complete(&self) -> Result<bool, Error<S::Error>> {
        if !self.store.exists(self.channel.done_key()).await? {
            return Ok(false);
        }
        Ok(self.store.length(self.channel.log_key()).await? <= self.cursor)
    }

    /// Token that, once cancelled, preempts any pending [`Reader::next`]
    /// with [`Error::Closed`].
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Closes the reader. Idempotent; a concurrent pending read returns
    /// [`Error::Closed`].
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Returns the next event, `Ok(None)` at EOF (stream done and drained,
    /// or killed after draining whatever was stored).
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] when the reader was closed; [`Error::Gone`] when
    /// the registration expired while waiting.
    pub async fn next(&mut self) -> Result<Option<ReadEvent>, Error<S::Error>> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Closed);
            }

            let length = self.store.length(self.channel.log_key()).await?;
            if length > self.cursor {
                let chunk = self
                    .store
                    .read_range(self.channel.log_key(), self.cursor, READ_CHUNK)
                    .await?;
                if !chunk.is_empty() {
                    self.cursor += chunk.len() as u64;
                    return Ok(Some(ReadEvent::Data(chunk)));
                }
            }

            // Drained. Terminal markers decide before blocking; kill wins
            // over done.
            if self.store.exists(self.channel.kill_key()).await? {
                return Ok(None);
            }
            if self.store.exists(self.channel.done_key()).await? {
                return Ok(None);
            }
            if !self.store.exists(self.channel.registration_key()).await? {
                return Err(Error::Gone);
            }

            tokio::select! {
                () = self.cancel.cancelled() => return Err(Error::Closed),
                event = self.subscription.next() => {
                    if event.is_none() {
                        return Err(Error::Closed);
                    }
                    // Whatever the event was, re-examining the store is the
                    // authoritative answer; queued wakeups coalesce here.
                }
                () = sleep(self.heartbeat) => return Ok(Some(ReadEvent::Heartbeat)),
            }
        }
    }
}
