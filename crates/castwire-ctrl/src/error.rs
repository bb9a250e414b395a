use castwire_mux::MuxError;

/// Errors returned by the cast controllers.
#[derive(Debug, thiserror::Error)]
pub enum CtrlError {
    /// Channel, correlation or transport error.
    #[error(transparent)]
    Mux(#[from] MuxError),

    /// A reply could not be decoded into the expected shape.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The receiver answered `LOAD_FAILED`.
    #[error("media load failed")]
    LoadFailed,

    /// The receiver answered `LOAD_CANCELLED`.
    #[error("media load cancelled")]
    LoadCancelled,

    /// The receiver answered `LAUNCH_ERROR`.
    #[error("application launch failed: {0}")]
    LaunchFailed(String),

    /// The peer closed the virtual connection.
    #[error("virtual connection closed by peer")]
    ClosedByPeer,
}

impl CtrlError {
    /// True when the underlying connection is no longer usable.
    pub fn is_transport_fatal(&self) -> bool {
        matches!(self, CtrlError::Mux(err) if err.is_transport_fatal())
    }
}

pub type Result<T> = std::result::Result<T, CtrlError>;
