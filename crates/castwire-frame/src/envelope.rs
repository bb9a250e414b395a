//! The CASTV2 envelope carried in every frame body.
//!
//! The body layout is the fixed `CastMessage` protobuf (proto2) schema:
//!
//! ```text
//! message CastMessage {
//!   required ProtocolVersion protocol_version = 1;
//!   required string source_id = 2;
//!   required string destination_id = 3;
//!   required string namespace = 4;
//!   required PayloadType payload_type = 5;
//!   optional string payload_utf8 = 6;
//!   optional bytes payload_binary = 7;
//! }
//! ```

use bytes::Bytes;
use prost::Message;

use crate::error::{FrameError, Result};

/// Destination id addressing every local id on the connection.
pub const BROADCAST_DESTINATION: &str = "*";

/// Protocol version stamped into every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtocolVersion {
    CastV2_1_0 = 0,
}

/// Discriminator for the payload field that is populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum PayloadKind {
    String = 0,
    Binary = 1,
}

/// Envelope payload: UTF-8 text (JSON by convention) or opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Text(_) => PayloadKind::String,
            Payload::Binary(_) => PayloadKind::Binary,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Binary(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Binary(Bytes::from(bytes))
    }
}

/// One decoded protocol message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    protocol_version: ProtocolVersion,
    source_id: String,
    destination_id: String,
    namespace: String,
    payload: Payload,
}

impl Envelope {
    /// Build an envelope for the current protocol version.
    pub fn new(
        namespace: impl Into<String>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            protocol_version: ProtocolVersion::CastV2_1_0,
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            namespace: namespace.into(),
            payload: payload.into(),
        }
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn destination_id(&self) -> &str {
        &self.destination_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    /// Text payload, if this is a string envelope.
    pub fn payload_text(&self) -> Option<&str> {
        self.payload.as_text()
    }

    /// True when addressed to every local id.
    pub fn is_broadcast(&self) -> bool {
        self.destination_id == BROADCAST_DESTINATION
    }

    /// Size of the serialized body (without the length prefix).
    pub fn encoded_len(&self) -> usize {
        self.to_wire().encoded_len()
    }

    /// Serialize into a protobuf body.
    pub fn encode_body(&self) -> Vec<u8> {
        self.to_wire().encode_to_vec()
    }

    /// Parse a protobuf body.
    pub fn decode_body(body: &[u8]) -> Result<Self> {
        CastMessage::decode(body)?.try_into()
    }

    fn to_wire(&self) -> CastMessage {
        let (payload_utf8, payload_binary) = match &self.payload {
            Payload::Text(text) => (Some(text.clone()), None),
            Payload::Binary(bytes) => (None, Some(bytes.clone())),
        };
        CastMessage {
            protocol_version: self.protocol_version.into(),
            source_id: self.source_id.clone(),
            destination_id: self.destination_id.clone(),
            namespace: self.namespace.clone(),
            payload_type: self.payload.kind().into(),
            payload_utf8,
            payload_binary,
        }
    }
}

impl TryFrom<CastMessage> for Envelope {
    type Error = FrameError;

    fn try_from(wire: CastMessage) -> Result<Self> {
        let protocol_version = ProtocolVersion::try_from(wire.protocol_version).map_err(|_| {
            FrameError::MalformedBody(format!(
                "unknown protocol version {}",
                wire.protocol_version
            ))
        })?;
        let kind = PayloadKind::try_from(wire.payload_type).map_err(|_| {
            FrameError::MalformedBody(format!("unknown payload type {}", wire.payload_type))
        })?;

        let payload = match kind {
            PayloadKind::String => Payload::Text(wire.payload_utf8.ok_or_else(|| {
                FrameError::MalformedBody("string payload without payload_utf8".to_string())
            })?),
            PayloadKind::Binary => Payload::Binary(wire.payload_binary.ok_or_else(|| {
                FrameError::MalformedBody("binary payload without payload_binary".to_string())
            })?),
        };

        Ok(Self {
            protocol_version,
            source_id: wire.source_id,
            destination_id: wire.destination_id,
            namespace: wire.namespace,
            payload,
        })
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct CastMessage {
    #[prost(enumeration = "ProtocolVersion", required, tag = "1")]
    pub protocol_version: i32,
    #[prost(string, required, tag = "2")]
    pub source_id: String,
    #[prost(string, required, tag = "3")]
    pub destination_id: String,
    #[prost(string, required, tag = "4")]
    pub namespace: String,
    #[prost(enumeration = "PayloadKind", required, tag = "5")]
    pub payload_type: i32,
    #[prost(string, optional, tag = "6")]
    pub payload_utf8: Option<String>,
    #[prost(bytes = "bytes", optional, tag = "7")]
    pub payload_binary: Option<Bytes>,
}
