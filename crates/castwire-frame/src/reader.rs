use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{decode_envelope, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Reads complete frames from any `AsyncRead` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame.
    ///
    /// A zero-length frame comes back as [`Frame::Empty`]. End of stream on a
    /// frame boundary is `Err(FrameError::ConnectionClosed)`; anywhere else it
    /// is `Err(FrameError::IncompleteRead { .. })`.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = decode_envelope(&mut self.buf, self.config.max_payload_size)? {
                return Ok(frame);
            }

            let read = match self.inner.read_buf(&mut self.buf).await {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(self.eof_error());
            }
        }
    }

    fn eof_error(&self) -> FrameError {
        if self.buf.is_empty() {
            return FrameError::ConnectionClosed;
        }
        let expected = match self.buf.get(..HEADER_SIZE) {
            Some(header) => {
                let mut len = [0u8; HEADER_SIZE];
                len.copy_from_slice(header);
                HEADER_SIZE + u32::from_be_bytes(len) as usize
            }
            None => HEADER_SIZE,
        };
        FrameError::IncompleteRead {
            expected,
            received: self.buf.len(),
        }
    }

    /// Bytes received but not yet decoded into a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum payload size for subsequent frame decoding.
    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.config.max_payload_size = max_payload_size;
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use bytes::{BufMut, BytesMut};
    use tokio::io::ReadBuf;

    use super::*;
    use crate::codec::{encode_envelope, encode_frame, DEFAULT_MAX_PAYLOAD};
    use crate::envelope::Envelope;

    fn envelope(ns: &str, text: &str) -> Envelope {
        Envelope::new(ns, "receiver-0", "sender-0", text)
    }

    fn wire_of(envelopes: &[Envelope]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for envelope in envelopes {
            encode_envelope(envelope, &mut wire, DEFAULT_MAX_PAYLOAD).unwrap();
        }
        wire.to_vec()
    }

    #[tokio::test]
    async fn read_single_frame() {
        let sent = envelope("urn:x-cast:a", r#"{"type":"PONG"}"#);
        let mut reader = FrameReader::new(Cursor::new(wire_of(&[sent.clone()])));

        let frame = reader.read_frame().await.unwrap();
        assert_eq!(frame, Frame::Message(sent));
    }

    #[tokio::test]
    async fn read_multiple_frames() {
        let sent = [
            envelope("urn:x-cast:a", "one"),
            envelope("urn:x-cast:b", "two"),
            envelope("urn:x-cast:c", "three"),
        ];
        let mut reader = FrameReader::new(Cursor::new(wire_of(&sent)));

        for expected in sent {
            assert_eq!(reader.read_frame().await.unwrap(), Frame::Message(expected));
        }
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn zero_length_frame_surfaces_as_empty() {
        let mut wire = BytesMut::new();
        encode_frame(&[], &mut wire).unwrap();
        wire.put_slice(&wire_of(&[envelope("ns", "after")]));

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        assert_eq!(reader.read_frame().await.unwrap(), Frame::Empty);
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Frame::Message(envelope("ns", "after"))
        );
    }

    #[tokio::test]
    async fn partial_read_handling() {
        let sent = envelope("urn:x-cast:slow", "slow");
        let mut reader = FrameReader::new(ByteByByteReader {
            bytes: wire_of(&[sent.clone()]),
            pos: 0,
        });

        assert_eq!(reader.read_frame().await.unwrap(), Frame::Message(sent));
    }

    #[tokio::test]
    async fn connection_closed_cleanly() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn connection_closed_mid_header() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x00, 0x00]));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompleteRead {
                expected: 4,
                received: 2
            }
        ));
    }

    #[tokio::test]
    async fn connection_closed_mid_body() {
        let mut partial = BytesMut::new();
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompleteRead {
                expected: 20,
                received: 13
            }
        ));
    }

    #[tokio::test]
    async fn oversized_frame_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_u32(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
        };
        let mut reader = FrameReader::with_config(Cursor::new(wire.to_vec()), cfg);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 1024, max: 16 }));
    }

    #[tokio::test]
    async fn malformed_body_in_stream() {
        let mut wire = BytesMut::new();
        encode_frame(&[0xFF, 0xFF, 0xFF], &mut wire).unwrap();

        let mut reader = FrameReader::new(Cursor::new(wire.to_vec()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(err, FrameError::MalformedBody(_)));
    }

    #[tokio::test]
    async fn interrupted_read_retries() {
        let sent = envelope("urn:x-cast:retry", "ok");
        let mut framed = FrameReader::new(InterruptedThenData {
            interrupted: false,
            bytes: wire_of(&[sent.clone()]),
            pos: 0,
        });

        assert_eq!(framed.read_frame().await.unwrap(), Frame::Message(sent));
    }

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (left, right) = tokio::io::duplex(32);
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let sent: Vec<Envelope> = (0..16)
            .map(|i| envelope("urn:x-cast:seq", &format!("msg-{i}")))
            .collect();

        let expected = sent.clone();
        let reader_task = tokio::spawn(async move {
            for envelope in expected {
                assert_eq!(reader.read_frame().await.unwrap(), Frame::Message(envelope));
            }
        });

        for envelope in &sent {
            writer.send(envelope).await.unwrap();
        }

        reader_task.await.unwrap();
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut reader = FrameReader::new(cursor);

        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.config().max_payload_size, DEFAULT_MAX_PAYLOAD);
        reader.set_max_payload_size(128);
        assert_eq!(reader.config().max_payload_size, 128);
        let _ = reader.get_ref();
        let _ = reader.get_mut();
        let _inner = reader.into_inner();
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for ByteByByteReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.pos < self.bytes.len() && buf.remaining() > 0 {
                let byte = self.bytes[self.pos];
                buf.put_slice(&[byte]);
                self.pos += 1;
            }
            Poll::Ready(Ok(()))
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl AsyncRead for InterruptedThenData {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if !self.interrupted {
                self.interrupted = true;
                return Poll::Ready(Err(std::io::Error::from(ErrorKind::Interrupted)));
            }
            let remaining = &self.bytes[self.pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }
}
