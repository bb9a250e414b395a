use serde::{Deserialize, Serialize};

/// Namespace carrying the virtual-connection handshake.
pub const CONNECTION_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.connection";
/// Namespace carrying liveness probes.
pub const HEARTBEAT_NAMESPACE: &str = "urn:x-cast:com.google.cast.tp.heartbeat";

/// Default local id of a sender application.
pub const DEFAULT_SENDER_ID: &str = "sender-0";
/// Default id of the receiver platform.
pub const DEFAULT_RECEIVER_ID: &str = "receiver-0";

/// Heartbeat message type: liveness probe.
pub const PING: &str = "PING";
/// Heartbeat message type: liveness reply.
pub const PONG: &str = "PONG";
/// Connection message type: open a virtual connection.
pub const CONNECT: &str = "CONNECT";
/// Connection message type: close a virtual connection.
pub const CLOSE: &str = "CLOSE";

/// The common `type` discriminator of every JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayloadHeader {
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl PayloadHeader {
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
        }
    }

    pub fn ping() -> Self {
        Self::new(PING)
    }

    pub fn pong() -> Self {
        Self::new(PONG)
    }

    pub fn connect() -> Self {
        Self::new(CONNECT)
    }

    pub fn close() -> Self {
        Self::new(CLOSE)
    }

    /// Parse just the `type` of a text payload. Extra fields are ignored.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    pub fn is(&self, msg_type: &str) -> bool {
        self.msg_type == msg_type
    }
}
