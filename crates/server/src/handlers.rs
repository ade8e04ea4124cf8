use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE, RANGE, TRANSFER_ENCODING};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use bytes::{Buf, Bytes};
use futures::StreamExt;
use tailcast_blob::BlobStore;
use tailcast_broker::{Error as BrokerError, ReadEvent, Reader, Writer};
use tailcast_encoders::{Encoder, SseEncoder, TextEncoder};
use tailcast_store::Store;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use crate::auth;
use crate::metrics;
use crate::state::AppState;

const NOT_REGISTERED: &str = "Channel is not registered.\n";

/// Frames buffered towards a slow consumer before the pump waits.
const SUBSCRIBE_BUFFER: usize = 8;

pub(crate) async fn health() -> &'static str {
    "OK"
}

/// Rejects plain-HTTP requests when the facade requires forwarded HTTPS.
pub(crate) async fn require_https<S: Store, B: BlobStore>(
    State(state): State<AppState<S, B>>,
    request: Request,
    next: Next,
) -> Response {
    if state.enforce_https {
        let forwarded = request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|value| value.to_str().ok());
        if forwarded != Some("https") {
            return (StatusCode::FORBIDDEN, "HTTPS is required.\n").into_response();
        }
    }

    next.run(request).await
}

/// `PUT /streams/{*id}` — registers a stream id.
pub(crate) async fn create<S: Store, B: BlobStore>(
    State(state): State<AppState<S, B>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !auth::authorized(&headers, &state.credentials) {
        return auth::unauthorized();
    }

    match state.registrar.register(&id).await {
        Ok(()) => {
            metrics::count("put.create.success");
            StatusCode::CREATED.into_response()
        }
        Err(error) => {
            metrics::count("put.create.fail");
            error!(%id, "unable to register stream: {error}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Unable to create stream. Please try again.\n",
            )
                .into_response()
        }
    }
}

/// `POST /streams/{*id}` — publishes the chunked request body.
pub(crate) async fn publish<S: Store, B: BlobStore>(
    State(state): State<AppState<S, B>>,
    Path(id): Path<String>,
    request: Request,
) -> Response {
    if !is_chunked(request.headers()) {
        return (
            StatusCode::BAD_REQUEST,
            "A chunked Transfer-Encoding header is required.\n",
        )
            .into_response();
    }

    let writer = match Writer::new(state.store.clone(), &id, state.channel_expire).await {
        Ok(writer) => writer,
        Err(BrokerError::NotRegistered | BrokerError::AlreadyDone | BrokerError::Killed) => {
            return (StatusCode::NOT_FOUND, NOT_REGISTERED).into_response();
        }
        Err(error) => {
            error!(%id, "unable to open writer: {error}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    // A reconnecting producer resends from byte zero; whatever the log
    // already holds is dropped from the front of the body.
    let mut discard = match writer.len().await {
        Ok(length) => length,
        Err(error) => {
            error!(%id, "unable to read stream length: {error}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let mut body = request.into_body().into_data_stream();
    while let Some(next) = body.next().await {
        match next {
            Ok(mut chunk) => {
                if discard > 0 {
                    let skip = discard.min(chunk.len() as u64);
                    chunk.advance(usize::try_from(skip).unwrap_or(usize::MAX));
                    discard -= skip;
                }
                if chunk.is_empty() {
                    continue;
                }
                if let Err(error) = writer.write(chunk).await {
                    error!(%id, "append failed: {error}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
            Err(error) => {
                // The producer hung up mid-body. No completion marker is
                // set, so it can reconnect and resume at the current
                // length.
                metrics::count("server.pub.read.eoferror");
                debug!(%id, "producer disconnected: {error}");
                return StatusCode::OK.into_response();
            }
        }
    }

    if let Err(error) = writer.close().await {
        error!(%id, "unable to complete stream: {error}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    spawn_handoff(&state, id);

    StatusCode::OK.into_response()
}

/// `GET /streams/{*id}` — subscribes from an offset, streaming until EOF.
pub(crate) async fn subscribe<S: Store, B: BlobStore>(
    State(state): State<AppState<S, B>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let sse = wants_sse(&headers);
    let range = range_offset(&headers);
    let offset = if sse {
        last_event_id(&headers).unwrap_or(0)
    } else {
        range.unwrap_or(0)
    };

    let reader = match Reader::new(state.store.clone(), &id, offset, state.heartbeat).await {
        Ok(reader) => reader,
        Err(BrokerError::NotRegistered) => return stored_stream_response(&state, &id).await,
        Err(error) => {
            error!(%id, "unable to subscribe: {error}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    match reader.is_complete().await {
        Ok(true) => return StatusCode::NO_CONTENT.into_response(),
        Ok(false) => {}
        Err(error) => {
            error!(%id, "unable to subscribe: {error}");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    let status = if !sse && range.is_some_and(|offset| offset > 0) {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };
    let encoder: Box<dyn Encoder> = if sse {
        Box::new(SseEncoder::new(offset))
    } else {
        Box::new(TextEncoder::new())
    };

    stream_response(reader, encoder, status)
}

/// `DELETE /streams/{*id}` — forcibly terminates a stream.
pub(crate) async fn kill<S: Store, B: BlobStore>(
    State(state): State<AppState<S, B>>,
    Path(id): Path<String>,
) -> Response {
    match state.registrar.is_registered(&id).await {
        Ok(false) => (StatusCode::NOT_FOUND, NOT_REGISTERED).into_response(),
        Ok(true) => match state.registrar.kill(&id).await {
            Ok(()) => StatusCode::OK.into_response(),
            Err(error) => {
                error!(%id, "unable to kill stream: {error}");
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        },
        Err(error) => {
            error!(%id, "unable to kill stream: {error}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// Answers a subscribe for a stream the store no longer knows: redirect to
/// the persisted copy when one exists, 404 otherwise.
async fn stored_stream_response<S: Store, B: BlobStore>(
    state: &AppState<S, B>,
    id: &str,
) -> Response {
    if let Some(blob) = &state.blob {
        match blob.exists(id).await {
            Ok(true) => return Redirect::temporary(&blob.url(id)).into_response(),
            Ok(false) => {}
            Err(error) => warn!(%id, "blob existence check failed: {error}"),
        }
    }

    (StatusCode::NOT_FOUND, NOT_REGISTERED).into_response()
}

/// Pumps a reader through an encoder into a streaming response body. The
/// pump stops when the reader reaches EOF, errors, or the consumer goes
/// away (the body side of the channel is dropped).
fn stream_response<S: Store>(
    mut reader: Reader<S>,
    mut encoder: Box<dyn Encoder>,
    status: StatusCode,
) -> Response {
    let content_type = encoder.content_type();
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(SUBSCRIBE_BUFFER);

    tokio::spawn(async move {
        loop {
            let frame = match reader.next().await {
                Ok(Some(ReadEvent::Data(chunk))) => encoder.encode(chunk),
                Ok(Some(ReadEvent::Heartbeat)) => encoder.keepalive(),
                Ok(None) | Err(BrokerError::Closed) => break,
                Err(error) => {
                    warn!("subscriber stream ended: {error}");
                    break;
                }
            };

            if frame.is_empty() {
                continue;
            }
            if tx.send(Ok(frame)).await.is_err() {
                reader.close();
                break;
            }
        }
    });

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap()
}

/// Uploads the completed log to the blob store in the background. Failures
/// are logged and counted; the producer's response never waits on this.
fn spawn_handoff<S: Store, B: BlobStore>(state: &AppState<S, B>, id: String) {
    let Some(blob) = state.blob.clone() else {
        return;
    };
    let store = state.store.clone();

    tokio::spawn(async move {
        let bytes = match store.get(id.clone()).await {
            Ok(bytes) => bytes.unwrap_or_default(),
            Err(error) => {
                metrics::count("server.storage.read.fail");
                error!(%id, "handoff read failed: {error}");
                return;
            }
        };

        if let Err(error) = blob.put(&id, bytes).await {
            metrics::count("server.storage.put.fail");
            error!(%id, "handoff upload failed: {error}");
        }
    });
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(TRANSFER_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
}

fn wants_sse(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("text/event-stream"))
}

/// Parses `Range: bytes=<n>-` into the start offset. Anything else is
/// ignored; streams have no known total length while live.
fn range_offset(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
        .and_then(|value| value.split('-').next())
        .and_then(|start| start.parse().ok())
}

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("last-event-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
