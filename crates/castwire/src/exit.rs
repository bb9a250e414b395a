use std::fmt;
use std::io;

use castwire_ctrl::CtrlError;
use castwire_frame::FrameError;
use castwire_mux::MuxError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PEER_UNRESPONSIVE: i32 = 30;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
/// Conventional code for termination by SIGINT.
pub const INTERRUPTED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::MalformedBody(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Frame(err) => frame_error(context, err),
        MuxError::Disconnected | MuxError::ChannelClosed | MuxError::ResponseChannelClosed => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        MuxError::PeerUnresponsive { .. } => {
            CliError::new(PEER_UNRESPONSIVE, format!("{context}: {err}"))
        }
        MuxError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        MuxError::Json(_) | MuxError::InvalidRequest(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        MuxError::Rejected { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        MuxError::Aborted => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn ctrl_error(context: &str, err: CtrlError) -> CliError {
    match err {
        CtrlError::Mux(err) => mux_error(context, err),
        CtrlError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        CtrlError::ClosedByPeer => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}
