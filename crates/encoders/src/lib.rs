//! Framings applied to stream bytes on their way out to a consumer: the
//! identity text framing, and Server-Sent Events with resumable event ids.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use bytes::{BufMut, Bytes, BytesMut};

/// Turns raw stream chunks into wire frames.
///
/// Encoders are stateful: the SSE framing carries a cumulative byte offset
/// across chunks so a disconnected consumer can resume from the last event
/// id it saw.
pub trait Encoder: Send + 'static {
    /// Value for the response `Content-Type` header.
    fn content_type(&self) -> &'static str;

    /// Frames one chunk of stream bytes. An empty chunk produces an empty
    /// frame.
    fn encode(&mut self, chunk: Bytes) -> Bytes;

    /// A zero-information frame emitted on heartbeat to keep idle
    /// connections open. Never advances the offset.
    fn keepalive(&self) -> Bytes;
}

/// Identity framing.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextEncoder;

impl TextEncoder {
    /// Creates a text encoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Encoder for TextEncoder {
    fn content_type(&self) -> &'static str {
        "text/plain"
    }

    fn encode(&mut self, chunk: Bytes) -> Bytes {
        chunk
    }

    fn keepalive(&self) -> Bytes {
        Bytes::from_static(b"\0")
    }
}

/// Server-Sent Events framing.
///
/// Each chunk becomes one event: an `id:` line holding the byte offset
/// immediately after the chunk (the offset a resuming consumer continues
/// from), one `data:` line per newline-split segment, and a blank
/// terminator line. A chunk ending in `\n` therefore yields a final empty
/// `data:` line, which round-trips the trailing newline.
#[derive(Clone, Copy, Debug)]
pub struct SseEncoder {
    offset: u64,
}

impl SseEncoder {
    /// Creates an SSE encoder whose event ids start counting at `offset`
    /// (the consumer's resume position from `Last-Event-Id`).
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }
}

impl Encoder for SseEncoder {
    fn content_type(&self) -> &'static str {
        "text/event-stream"
    }

    fn encode(&mut self, chunk: Bytes) -> Bytes {
        if chunk.is_empty() {
            return Bytes::new();
        }

        self.offset += chunk.len() as u64;

        let mut frame = BytesMut::with_capacity(chunk.len() + 32);
        frame.put_slice(format!("id: {}\n", self.offset).as_bytes());
        for segment in chunk.split(|byte| *byte == b'\n') {
            frame.put_slice(b"data: ");
            frame.put_slice(segment);
            frame.put_u8(b'\n');
        }
        frame.put_u8(b'\n');

        frame.freeze()
    }

    fn keepalive(&self) -> Bytes {
        Bytes::from_static(b": \n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_is_identity() {
        let mut encoder = TextEncoder::new();

        assert_eq!(
            encoder.encode(Bytes::from_static(b"hello\nworld")),
            Bytes::from_static(b"hello\nworld")
        );
        assert_eq!(encoder.keepalive(), Bytes::from_static(b"\0"));
    }

    #[test]
    fn test_sse_framing_table() {
        let table: &[(u64, &str, &str)] = &[
            (0, "hello", "id: 5\ndata: hello\n\n"),
            (0, "hello\n", "id: 6\ndata: hello\ndata: \n\n"),
            (0, "hello\nworld", "id: 11\ndata: hello\ndata: world\n\n"),
            (0, "hello\nworld\n", "id: 12\ndata: hello\ndata: world\ndata: \n\n"),
            (1, "hello\nworld\n", "id: 12\ndata: ello\ndata: world\ndata: \n\n"),
            (6, "hello\nworld\n", "id: 12\ndata: world\ndata: \n\n"),
            (11, "hello\nworld\n", "id: 12\ndata: \ndata: \n\n"),
            (12, "hello\nworld\n", ""),
        ];

        for (offset, input, expected) in table {
            let mut encoder = SseEncoder::new(*offset);
            let remainder = &input.as_bytes()[usize::try_from(*offset).unwrap()..];
            let frame = encoder.encode(Bytes::copy_from_slice(remainder));

            assert_eq!(
                frame,
                Bytes::copy_from_slice(expected.as_bytes()),
                "offset {offset} of {input:?}"
            );
        }
    }

    #[test]
    fn test_sse_ids_accumulate_across_chunks() {
        let mut encoder = SseEncoder::new(0);

        assert_eq!(
            encoder.encode(Bytes::from_static(b"hello\n")),
            Bytes::from_static(b"id: 6\ndata: hello\ndata: \n\n")
        );
        assert_eq!(
            encoder.encode(Bytes::from_static(b"world\n")),
            Bytes::from_static(b"id: 12\ndata: world\ndata: \n\n")
        );
    }

    #[test]
    fn test_sse_keepalive_is_a_comment_and_keeps_offset() {
        let mut encoder = SseEncoder::new(5);

        assert_eq!(encoder.keepalive(), Bytes::from_static(b": \n\n"));
        assert_eq!(
            encoder.encode(Bytes::from_static(b"x")),
            Bytes::from_static(b"id: 6\ndata: x\n\n")
        );
    }

    #[test]
    fn test_sse_passes_binary_segments_through() {
        let mut encoder = SseEncoder::new(0);

        let frame = encoder.encode(Bytes::from_static(&[0x1f, 0x8b, b'\n', 0x00]));
        assert_eq!(
            frame,
            Bytes::from_static(b"id: 4\ndata: \x1f\x8b\ndata: \x00\n\n")
        );
    }
}
