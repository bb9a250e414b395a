//! Length-prefixed CASTV2 framing.
//!
//! Every message on a cast connection is framed with:
//! - A 4-byte big-endian body length
//! - A protobuf-encoded `CastMessage` body (see [`envelope`])
//!
//! A zero-length frame is a "no data yet" marker and decodes as
//! [`Frame::Empty`]. No partial reads, no buffer management in user code.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_envelope, decode_frame, encode_envelope, encode_frame, CastCodec, Frame, FrameConfig,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use envelope::{Envelope, Payload, PayloadKind, ProtocolVersion, BROADCAST_DESTINATION};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
