//! Channel multiplexing for one CASTV2 connection.
//!
//! A [`Connection`] reads frames on a background task and fans each envelope
//! out to the [`Channel`]s whose route accepts it. On top of channels sit a
//! [`RequestCorrelator`] for `requestId`-matched request/reply and a
//! [`Heartbeat`] liveness monitor.

pub mod broadcaster;
pub mod channel;
pub mod connection;
pub mod connector;
pub mod control;
pub mod error;
pub mod heartbeat;
pub mod mailbox;
pub mod request;

pub use broadcaster::{Broadcaster, Filter, SubscriberId, Subscription};
pub use channel::{Channel, Route};
pub use connection::{Connection, ConnectionConfig, DEFAULT_MAILBOX_CAPACITY};
pub use connector::{connect, connect_with_config, DEFAULT_PORT};
pub use control::{
    PayloadHeader, CLOSE, CONNECT, CONNECTION_NAMESPACE, DEFAULT_RECEIVER_ID, DEFAULT_SENDER_ID,
    HEARTBEAT_NAMESPACE, PING, PONG,
};
pub use error::{MuxError, Result};
pub use heartbeat::{Heartbeat, HeartbeatConfig, HeartbeatState};
pub use request::{
    CorrelatorConfig, PendingReply, RequestCorrelator, RequestIds, Response, INVALID_REQUEST,
};
