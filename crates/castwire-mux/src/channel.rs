use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use castwire_frame::{Envelope, Payload, BROADCAST_DESTINATION};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::broadcaster::{Broadcaster, Filter, SubscriberId};
use crate::connection::{Outbox, WriteRequest};
use crate::error::{MuxError, Result};
use crate::mailbox::{MailboxReceiver, TryRecvError};

/// Addressing for one logical channel: namespace plus local and peer ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub namespace: String,
    pub local_id: String,
    pub peer_id: String,
}

impl Route {
    pub fn new(
        namespace: impl Into<String>,
        local_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            local_id: local_id.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Whether an inbound envelope belongs on this channel.
    ///
    /// The namespace must match and the envelope must come from the peer,
    /// addressed either to the local id or to everyone (`"*"`).
    pub fn accepts(&self, envelope: &Envelope) -> bool {
        envelope.namespace() == self.namespace
            && envelope.source_id() == self.peer_id
            && (envelope.destination_id() == self.local_id
                || envelope.destination_id() == BROADCAST_DESTINATION)
    }

    /// Build an outbound envelope from the local id to the peer.
    pub fn envelope(&self, payload: impl Into<Payload>) -> Envelope {
        Envelope::new(
            self.namespace.clone(),
            self.local_id.clone(),
            self.peer_id.clone(),
            payload,
        )
    }

    fn filter(&self) -> Filter {
        let route = self.clone();
        Arc::new(move |envelope: &Envelope| route.accepts(envelope))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}<->{}", self.namespace, self.local_id, self.peer_id)
    }
}

/// A logical, bidirectional channel multiplexed over one connection.
///
/// Cheap to clone; clones share the same inbox. Inbound delivery goes through
/// a drop-oldest mailbox, so a slow consumer loses the oldest envelopes
/// rather than stalling the connection.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    route: Route,
    subscriber: SubscriberId,
    inbox: MailboxReceiver<Arc<Envelope>>,
    outbox: Outbox,
    broadcaster: Broadcaster,
    terminated: CancellationToken,
    closed: AtomicBool,
}

impl Channel {
    pub(crate) fn open(
        route: Route,
        capacity: usize,
        broadcaster: &Broadcaster,
        outbox: Outbox,
        terminated: CancellationToken,
    ) -> Self {
        let subscription = broadcaster.subscribe(Some(route.filter()), capacity);
        debug!(route = %route, subscriber = %subscription.id, capacity, "channel opened");
        Self {
            inner: Arc::new(ChannelInner {
                route,
                subscriber: subscription.id,
                inbox: subscription.receiver,
                outbox,
                broadcaster: broadcaster.clone(),
                terminated,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn route(&self) -> &Route {
        &self.inner.route
    }

    pub fn namespace(&self) -> &str {
        &self.inner.route.namespace
    }

    pub fn local_id(&self) -> &str {
        &self.inner.route.local_id
    }

    pub fn peer_id(&self) -> &str {
        &self.inner.route.peer_id
    }

    /// Wait for the next envelope routed to this channel.
    ///
    /// Returns `None` once the channel or its connection is closed and the
    /// inbox has drained.
    pub async fn recv(&self) -> Option<Arc<Envelope>> {
        self.inner.inbox.recv().await
    }

    pub fn try_recv(&self) -> Option<Arc<Envelope>> {
        match self.inner.inbox.try_recv() {
            Ok(envelope) => Some(envelope),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Envelopes dropped from this channel's inbox by overflow.
    pub fn evicted(&self) -> u64 {
        self.inner.inbox.evicted()
    }

    /// Write one envelope to the peer and wait until it is on the wire.
    /// Errors propagate; there is no retry.
    ///
    /// Cancel-safe: once queued, the frame is written whole even if this
    /// future is dropped.
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        if self.is_closed() {
            return Err(MuxError::ChannelClosed);
        }

        let envelope = self.inner.route.envelope(payload);
        let bytes = envelope.payload().len();
        let (done, written) = oneshot::channel();
        self.inner
            .outbox
            .send(WriteRequest { envelope, done })
            .await
            .map_err(|_| MuxError::ChannelClosed)?;
        written.await.map_err(|_| MuxError::ChannelClosed)??;

        trace!(route = %self.inner.route, bytes, "envelope sent");
        Ok(())
    }

    /// Serialize `payload` as JSON and send it as a text envelope.
    pub async fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        self.send(text).await
    }

    /// Detach from the connection. Idempotent.
    ///
    /// Pending and future `recv` calls see end-of-stream; `send` fails with
    /// [`MuxError::ChannelClosed`].
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.broadcaster.unsubscribe(self.inner.subscriber);
        self.inner.inbox.close();
        debug!(route = %self.inner.route, "channel closed");
    }

    /// True after [`Channel::close`] or once the connection has terminated.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.terminated.is_cancelled()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("route", &self.inner.route)
            .field("subscriber", &self.inner.subscriber)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            self.broadcaster.unsubscribe(self.subscriber);
        }
    }
}
