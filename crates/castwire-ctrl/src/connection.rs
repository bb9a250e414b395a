use std::fmt;
use std::sync::Arc;

use castwire_mux::{Channel, Connection, PayloadHeader, CLOSE, CONNECTION_NAMESPACE};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{CtrlError, Result};

/// Why a virtual connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent `CLOSE`.
    Peer,
    /// Closed locally with [`ConnectionController::close`].
    Local,
    /// The underlying connection went away.
    Disconnected,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CloseReason::Peer => "closed by peer",
            CloseReason::Local => "closed locally",
            CloseReason::Disconnected => "disconnected",
        };
        f.write_str(reason)
    }
}

type ReasonCell = Arc<watch::Sender<Option<CloseReason>>>;

fn settle(reason: &ReasonCell, value: CloseReason) -> bool {
    reason.send_if_modified(|current| {
        if current.is_some() {
            return false;
        }
        *current = Some(value);
        true
    })
}

/// Opens and closes the virtual connection between a local id and a peer.
pub struct ConnectionController {
    channel: Channel,
    reason: ReasonCell,
    cancel: CancellationToken,
}

impl ConnectionController {
    pub fn new(
        connection: &Connection,
        local_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        let channel = connection.channel(CONNECTION_NAMESPACE, local_id, peer_id);
        let (reason, _) = watch::channel(None);
        let reason = Arc::new(reason);
        let cancel = CancellationToken::new();

        tokio::spawn(watch_close(
            channel.clone(),
            Arc::clone(&reason),
            cancel.clone(),
        ));

        Self {
            channel,
            reason,
            cancel,
        }
    }

    /// Send `CONNECT`.
    pub async fn connect(&self) -> Result<()> {
        if self.close_reason() == Some(CloseReason::Peer) {
            return Err(CtrlError::ClosedByPeer);
        }
        self.channel.send_json(&PayloadHeader::connect()).await?;
        debug!(peer = self.channel.peer_id(), "virtual connection requested");
        Ok(())
    }

    /// Send `CLOSE` (unless the peer already closed) and detach the channel.
    pub async fn close(&self) -> Result<()> {
        let result = if self.close_reason().is_none() && !self.channel.is_closed() {
            self.channel.send_json(&PayloadHeader::close()).await
        } else {
            Ok(())
        };
        settle(&self.reason, CloseReason::Local);
        self.cancel.cancel();
        self.channel.close();
        result.map_err(CtrlError::from)
    }

    /// Wait until the virtual connection ends for any reason.
    pub async fn wait_closed(&self) -> CloseReason {
        let mut rx = self.reason.subscribe();
        let reason = rx.wait_for(Option::is_some).await.map(|reason| *reason);
        match reason {
            Ok(reason) => reason.unwrap_or(CloseReason::Disconnected),
            Err(_) => CloseReason::Disconnected,
        }
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.reason.borrow()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for ConnectionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionController")
            .field("channel", &self.channel)
            .field("close_reason", &self.close_reason())
            .finish_non_exhaustive()
    }
}

async fn watch_close(channel: Channel, reason: ReasonCell, cancel: CancellationToken) {
    let outcome = loop {
        let envelope = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            envelope = channel.recv() => envelope,
        };
        let Some(envelope) = envelope else {
            break CloseReason::Disconnected;
        };
        match envelope.payload_text().and_then(PayloadHeader::parse) {
            Some(header) if header.is(CLOSE) => break CloseReason::Peer,
            Some(header) => trace!(kind = %header.msg_type, "ignoring connection message"),
            None => debug!("ignoring malformed connection payload"),
        }
    };

    if settle(&reason, outcome) {
        debug!(peer = channel.peer_id(), reason = %outcome, "virtual connection ended");
    }
}
