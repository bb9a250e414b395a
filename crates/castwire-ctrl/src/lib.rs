//! Controllers for the standard cast namespaces.
//!
//! Each controller owns one channel on a [`castwire_mux::Connection`]:
//! [`ConnectionController`] opens and closes the virtual connection,
//! [`ReceiverController`] drives the receiver platform and
//! [`MediaController`] drives playback inside an application.

use std::time::Duration;

use castwire_mux::RequestIds;

pub mod connection;
pub mod error;
pub mod media;
pub mod receiver;

pub use connection::{CloseReason, ConnectionController};
pub use error::{CtrlError, Result};
pub use media::{
    LoadOptions, MediaController, MediaInfo, MediaStatus, MediaTrack, StreamType, TrackType,
    DEFAULT_MEDIA_RECEIVER, MEDIA_NAMESPACE,
};
pub use receiver::{
    AppNamespace, ApplicationSession, ReceiverController, ReceiverStatus, Volume,
    RECEIVER_NAMESPACE,
};

/// Options shared by the correlated controllers.
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Upper bound on each request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Id sequence; share one across controllers on the same connection.
    pub request_ids: RequestIds,
}
