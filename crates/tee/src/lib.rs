//! The resilient forwarder: POSTs an arbitrary reader (typically a
//! process's stdout) to a stream URL with chunked transfer encoding,
//! retrying across transport failures without duplicating bytes.
//!
//! Every byte read from the source is teed into a scratch file, which is
//! the system of record for replay: each attempt resends the file from
//! byte zero and the relay discards whatever it already stored. The
//! scratch file is removed when the upload resolves either way.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use reqwest::{Body, Client, StatusCode};
use tempfile::NamedTempFile;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

const COPY_BUFFER: usize = 8 * 1024;

/// Options for the forwarder.
#[derive(Clone, Debug)]
pub struct ForwarderOptions {
    /// The stream URL to POST to.
    pub url: String,

    /// Retries allowed after the first attempt.
    pub max_retries: u32,

    /// Constant pause between attempts.
    pub sleep_duration: Duration,
}

/// How far the tee pump has gotten.
#[derive(Clone, Copy, Debug, Default)]
struct Progress {
    written: u64,
    finished: bool,
}

/// A retrying chunked-upload client over a rewindable copy of its input.
#[derive(Clone, Debug)]
pub struct Forwarder {
    options: ForwarderOptions,
    client: Client,
}

impl Forwarder {
    /// Creates a forwarder.
    #[must_use]
    pub fn new(options: ForwarderOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    /// Streams `source` to the configured URL until a terminal response.
    ///
    /// Returns the 2xx status that ended the upload. Transport errors, 5xx,
    /// and 408 are retried after `sleep_duration`; any other status is
    /// terminal. Dropping the returned future never blocks on the source:
    /// the pump owns it and winds down on its own.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedStatus`] on a terminal non-success status;
    /// [`Error::RetriesExhausted`] with the last failure once the attempt
    /// budget is spent.
    pub async fn stream<R>(&self, source: R) -> Result<StatusCode>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let scratch = NamedTempFile::new().map_err(Error::Scratch)?;
        let (progress_tx, progress_rx) = watch::channel(Progress::default());

        let sink = OpenOptions::new()
            .write(true)
            .open(scratch.path())
            .await
            .map_err(Error::Scratch)?;
        tokio::spawn(pump(source, sink, progress_tx));

        let mut last_error = None;
        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                sleep(self.options.sleep_duration).await;
            }

            match self.attempt(scratch.path(), progress_rx.clone()).await {
                Ok(status) if status.is_success() => {
                    debug!(%status, attempt, "upload complete");
                    return Ok(status);
                }
                Ok(status) if retryable_status(status) => {
                    warn!(%status, attempt, "upload attempt failed");
                    last_error = Some(Error::UnexpectedStatus(status));
                }
                Ok(status) => return Err(Error::UnexpectedStatus(status)),
                Err(error) => {
                    warn!(attempt, "upload attempt failed: {error}");
                    last_error = Some(error);
                }
            }
        }

        // The loop ran at least once, so an error was always recorded.
        Err(Error::RetriesExhausted(Box::new(
            last_error.unwrap_or_else(|| Error::Scratch(std::io::Error::other("no attempts"))),
        )))
    }

    async fn attempt(
        &self,
        scratch: &Path,
        progress: watch::Receiver<Progress>,
    ) -> Result<StatusCode> {
        // Reopen so every attempt replays from byte zero; the relay
        // discards the prefix it already holds.
        let file = File::open(scratch).await.map_err(Error::Scratch)?;

        let response = self
            .client
            .post(&self.options.url)
            .body(Body::wrap_stream(tail_scratch(file, progress)))
            .send()
            .await?;

        Ok(response.status())
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || matches!(status, StatusCode::REQUEST_TIMEOUT)
}

/// Copies the source into the scratch file, publishing progress after every
/// write. Runs detached from the upload attempts: a dropped or aborted
/// upload never blocks a pending source read.
async fn pump<R>(mut source: R, mut sink: File, progress: watch::Sender<Progress>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut written = 0u64;
    let mut buffer = vec![0u8; COPY_BUFFER];

    loop {
        match source.read(&mut buffer).await {
            Ok(0) => break,
            Ok(count) => {
                if sink.write_all(&buffer[..count]).await.is_err()
                    || sink.flush().await.is_err()
                {
                    break;
                }
                written += count as u64;
                let _ = progress.send(Progress {
                    written,
                    finished: false,
                });
            }
            Err(error) => {
                warn!("source read failed: {error}");
                break;
            }
        }
    }

    let _ = progress.send(Progress {
        written,
        finished: true,
    });
}

/// Streams the scratch file from the start, tailing it until the pump has
/// finished and every written byte has been replayed.
fn tail_scratch(
    file: File,
    progress: watch::Receiver<Progress>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send {
    struct Tail {
        file: File,
        progress: watch::Receiver<Progress>,
        position: u64,
    }

    futures::stream::unfold(
        Tail {
            file,
            progress,
            position: 0,
        },
        |mut tail| async move {
            loop {
                let snapshot = *tail.progress.borrow_and_update();

                if tail.position < snapshot.written {
                    let want = (snapshot.written - tail.position).min(COPY_BUFFER as u64);
                    let mut buffer = vec![0u8; usize::try_from(want).unwrap_or(COPY_BUFFER)];

                    match tail.file.read(&mut buffer).await {
                        Ok(0) => {
                            // The write is published but not yet visible to
                            // this handle; let the pump settle.
                            tokio::task::yield_now().await;
                        }
                        Ok(count) => {
                            tail.position += count as u64;
                            buffer.truncate(count);
                            return Some((Ok(Bytes::from(buffer)), tail));
                        }
                        Err(error) => return Some((Err(error), tail)),
                    }
                } else if snapshot.finished {
                    return None;
                } else if tail.progress.changed().await.is_err() {
                    // Pump gone without finishing; nothing more will come.
                    return None;
                }
            }
        },
    )
}
