use std::time::Duration;

/// Errors that can occur in mux operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// Frame-level error on the connection.
    #[error("frame error: {0}")]
    Frame(#[from] castwire_frame::FrameError),

    /// The peer closed the connection cleanly.
    #[error("peer disconnected")]
    Disconnected,

    /// The channel (or its connection) has been closed locally.
    #[error("channel closed")]
    ChannelClosed,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request payload could not be stamped with a request id.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The peer answered with one of the configured error types.
    #[error("request rejected ({kind}): {reason}")]
    Rejected { kind: String, reason: String },

    /// The waiting side was cancelled before a reply arrived.
    #[error("request cancelled")]
    Cancelled,

    /// The reply channel ended before a reply arrived.
    #[error("response channel closed")]
    ResponseChannelClosed,

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A connection task was aborted before it finished.
    #[error("connection task aborted")]
    Aborted,

    /// The peer stopped answering liveness probes.
    #[error("peer unresponsive ({missed} missed heartbeats)")]
    PeerUnresponsive { missed: u32 },
}

impl MuxError {
    /// True when the error means the connection itself is unusable.
    pub fn is_transport_fatal(&self) -> bool {
        matches!(
            self,
            MuxError::Frame(_) | MuxError::Disconnected | MuxError::PeerUnresponsive { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
