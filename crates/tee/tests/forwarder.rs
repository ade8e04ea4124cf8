//! Exercises the forwarder against servers that fail in the ways the real
//! relay's front door does: 5xx answers and dropped connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tailcast_tee::{Error, Forwarder, ForwarderOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Bytes>>>,
    attempts: Arc<AtomicUsize>,
}

/// An HTTP endpoint that answers `failure_status` to the first `failures`
/// posts and 200 afterwards, recording every received body.
async fn start_flaky_endpoint(failures: usize, failure_status: StatusCode) -> (String, Recorded) {
    let recorded = Recorded::default();

    let handler = {
        let recorded = recorded.clone();
        move |body: Bytes| {
            let recorded = recorded.clone();
            async move {
                recorded.bodies.lock().await.push(body);
                let attempt = recorded.attempts.fetch_add(1, Ordering::SeqCst);
                if attempt < failures {
                    failure_status
                } else {
                    StatusCode::OK
                }
            }
        }
    };

    let router = Router::new().route("/", post(handler));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}/"), recorded)
}

/// A raw TCP endpoint that drops the first `failures` connections on the
/// floor, then speaks just enough HTTP/1.1 to accept a chunked post.
async fn start_dropping_endpoint(failures: usize) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));

    let counter = connections.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let attempt = counter.fetch_add(1, Ordering::SeqCst);

            if attempt < failures {
                drop(socket);
                continue;
            }

            tokio::spawn(async move {
                let mut seen = Vec::new();
                let mut buffer = [0u8; 1024];
                loop {
                    match socket.read(&mut buffer).await {
                        Ok(0) | Err(_) => break,
                        Ok(count) => {
                            seen.extend_from_slice(&buffer[..count]);
                            // Chunked bodies end with a zero-length chunk.
                            if seen.windows(5).any(|window| window == b"0\r\n\r\n") {
                                break;
                            }
                        }
                    }
                }
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    )
                    .await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}/"), connections)
}

fn forwarder(url: String, max_retries: u32) -> Forwarder {
    Forwarder::new(ForwarderOptions {
        url,
        max_retries,
        sleep_duration: Duration::from_millis(20),
    })
}

fn source(content: &'static [u8]) -> impl tokio::io::AsyncRead + Send + Unpin + 'static {
    std::io::Cursor::new(content)
}

#[tokio::test]
async fn test_clean_upload() {
    let (url, recorded) = start_flaky_endpoint(0, StatusCode::SERVICE_UNAVAILABLE).await;

    let status = forwarder(url, 5)
        .stream(source(b"hello world"))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(recorded.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        recorded.bodies.lock().await.as_slice(),
        &[Bytes::from_static(b"hello world")]
    );
}

#[tokio::test]
async fn test_server_errors_are_retried_with_full_replay() {
    let (url, recorded) = start_flaky_endpoint(9, StatusCode::SERVICE_UNAVAILABLE).await;
    let started = Instant::now();

    let status = forwarder(url, 10)
        .stream(source(b"hello world\n"))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(recorded.attempts.load(Ordering::SeqCst), 10);
    // Nine pauses happened between the ten attempts.
    assert!(started.elapsed() >= Duration::from_millis(9 * 20));

    // Every attempt replays the identical bytes; the relay side is what
    // discards the already-stored prefix.
    for body in recorded.bodies.lock().await.iter() {
        assert_eq!(body, &Bytes::from_static(b"hello world\n"));
    }
}

#[tokio::test]
async fn test_dropped_connections_are_retried() {
    let (url, connections) = start_dropping_endpoint(3).await;

    let status = forwarder(url, 5)
        .stream(source(b"hello world"))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(connections.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_client_errors_are_terminal() {
    let (url, recorded) = start_flaky_endpoint(usize::MAX, StatusCode::NOT_FOUND).await;

    let result = forwarder(url, 5).stream(source(b"hello world")).await;

    assert!(matches!(
        result,
        Err(Error::UnexpectedStatus(StatusCode::NOT_FOUND))
    ));
    assert_eq!(recorded.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_exhausted_reports_last_error() {
    let (url, recorded) = start_flaky_endpoint(usize::MAX, StatusCode::SERVICE_UNAVAILABLE).await;

    let result = forwarder(url, 2).stream(source(b"hello world")).await;

    match result {
        Err(Error::RetriesExhausted(last)) => {
            assert!(matches!(
                *last,
                Error::UnexpectedStatus(StatusCode::SERVICE_UNAVAILABLE)
            ));
        }
        other => panic!("expected retries exhausted, got {other:?}"),
    }
    assert_eq!(recorded.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_slow_source_is_tailed_to_completion() {
    let (url, recorded) = start_flaky_endpoint(0, StatusCode::SERVICE_UNAVAILABLE).await;

    // The source trickles in long after the request has started.
    let (mut feeder, reader) = tokio::io::duplex(64);
    tokio::spawn(async move {
        for part in [&b"hello "[..], b"world"] {
            sleep(Duration::from_millis(100)).await;
            feeder.write_all(part).await.unwrap();
        }
        // Dropping the feeder is the source's EOF.
    });

    let status = forwarder(url, 0).stream(reader).await.unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        recorded.bodies.lock().await.as_slice(),
        &[Bytes::from_static(b"hello world")]
    );
}

#[tokio::test]
async fn test_dropping_the_upload_never_blocks_on_the_source() {
    let (url, _recorded) = start_flaky_endpoint(0, StatusCode::SERVICE_UNAVAILABLE).await;

    // A source that stays silent long past the test's patience.
    let (_feeder, reader) = tokio::io::duplex(64);

    let upload = tokio::spawn(async move { forwarder(url, 0).stream(reader).await });
    sleep(Duration::from_millis(50)).await;
    upload.abort();

    // The aborted upload resolves promptly even though the source never
    // produced a byte.
    let joined = tokio::time::timeout(Duration::from_secs(1), upload).await;
    assert!(joined.unwrap().unwrap_err().is_cancelled());
}
