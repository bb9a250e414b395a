/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared or encoded body exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream ended in the middle of a frame.
    #[error("incomplete read ({received} of {expected} bytes before end of stream)")]
    IncompleteRead { expected: usize, received: usize },

    /// The stream stopped accepting bytes in the middle of a frame.
    #[error("incomplete write ({written} of {expected} bytes)")]
    IncompleteWrite { expected: usize, written: usize },

    /// The frame body is not a valid envelope.
    #[error("malformed envelope body: {0}")]
    MalformedBody(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,
}

impl From<prost::DecodeError> for FrameError {
    fn from(err: prost::DecodeError) -> Self {
        FrameError::MalformedBody(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
