use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::Envelope;
use crate::error::{FrameError, Result};

/// Frame header: big-endian body length (4).
pub const HEADER_SIZE: usize = 4;

/// Default maximum body size: 64 KiB, the CASTV2 message limit.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// One unit read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A zero-length frame: "no data yet". Carries nothing; readers retry.
    Empty,
    /// A decoded envelope.
    Message(Envelope),
}

/// Write a length-prefixed body.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────────────────┐
/// │ Length       │ Body                         │
/// │ (4B BE)      │ (Length bytes, CastMessage)  │
/// └──────────────┴──────────────────────────────┘
/// ```
pub fn encode_frame(body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if body.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_u32(body.len() as u32);
    dst.put_slice(body);
    Ok(())
}

/// Split one length-prefixed body off the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// A zero length yields an empty body.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    let Some(body_len) = peek_length(src) else {
        return Ok(None); // Need more data
    };

    if body_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + body_len {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(body_len).freeze()))
}

/// Encode an envelope as one complete frame.
pub fn encode_envelope(envelope: &Envelope, dst: &mut BytesMut, max_payload: usize) -> Result<()> {
    let body = envelope.encode_body();
    if body.len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: max_payload,
        });
    }
    encode_frame(&body, dst)
}

/// Decode one frame into an envelope.
pub fn decode_envelope(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(body) = decode_frame(src, max_payload)? else {
        return Ok(None);
    };
    if body.is_empty() {
        return Ok(Some(Frame::Empty));
    }
    Ok(Some(Frame::Message(Envelope::decode_body(&body)?)))
}

fn peek_length(src: &BytesMut) -> Option<usize> {
    let header: [u8; HEADER_SIZE] = src.get(..HEADER_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(header) as usize)
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 64 KiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// `tokio_util` codec over [`Frame`]s and [`Envelope`]s.
#[derive(Debug, Clone)]
pub struct CastCodec {
    max_payload_size: usize,
}

impl CastCodec {
    pub fn new() -> Self {
        Self::with_config(&FrameConfig::default())
    }

    pub fn with_config(config: &FrameConfig) -> Self {
        Self {
            max_payload_size: config.max_payload_size,
        }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    pub fn set_max_payload_size(&mut self, max_payload_size: usize) {
        self.max_payload_size = max_payload_size;
    }
}

impl Default for CastCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CastCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        decode_envelope(src, self.max_payload_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let (expected, received) = match peek_length(src) {
            Some(body_len) => (HEADER_SIZE + body_len, src.len()),
            None => (HEADER_SIZE, src.len()),
        };
        Err(FrameError::IncompleteRead { expected, received })
    }
}

impl Encoder<&Envelope> for CastCodec {
    type Error = FrameError;

    fn encode(&mut self, envelope: &Envelope, dst: &mut BytesMut) -> Result<()> {
        encode_envelope(envelope, dst, self.max_payload_size)
    }
}
