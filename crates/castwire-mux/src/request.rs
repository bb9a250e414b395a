//! Request/response correlation over one channel.
//!
//! Outbound JSON requests are stamped with a `requestId`; a dispatch task
//! reads the channel and completes the waiter registered under the reply's
//! `requestId`. Replies nobody waits for are dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::channel::Channel;
use crate::error::{MuxError, Result};

/// Reply type the cast platform uses for malformed requests.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Source of request ids. Clone it to share one sequence across correlators.
///
/// Ids run from 1 up to `i32::MAX` and then wrap back to 1. Zero and negative
/// ids are never issued; receivers use 0 for unsolicited messages.
#[derive(Debug, Clone)]
pub struct RequestIds(Arc<AtomicI32>);

impl RequestIds {
    pub fn new() -> Self {
        Self(Arc::new(AtomicI32::new(1)))
    }

    pub fn next_id(&self) -> i32 {
        let issued = self.0.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
            Some(if id >= i32::MAX { 1 } else { id + 1 })
        });
        match issued {
            Ok(id) | Err(id) => id,
        }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Correlator configuration.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Upper bound on waiting for a reply. `None` waits until the reply,
    /// cancellation, or the channel ending.
    pub request_timeout: Option<Duration>,
    /// Reply types classified as [`MuxError::Rejected`].
    pub error_types: Vec<String>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            error_types: vec![INVALID_REQUEST.to_string()],
        }
    }
}

/// A correlated reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// The reply's `type` field.
    pub kind: String,
    pub request_id: i32,
    /// The whole reply payload.
    pub body: Value,
}

impl Response {
    /// Deserialize the reply body into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.body)?)
    }
}

#[derive(Deserialize)]
struct ReplyHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "requestId", default)]
    request_id: i32,
}

#[derive(Default)]
struct Pending {
    slots: HashMap<i32, oneshot::Sender<Response>>,
    closed: bool,
}

#[derive(Default)]
struct PendingTable {
    inner: Mutex<Pending>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, request_id: i32) -> Result<oneshot::Receiver<Response>> {
        let mut pending = self.lock();
        if pending.closed {
            return Err(MuxError::ResponseChannelClosed);
        }
        let (tx, rx) = oneshot::channel();
        pending.slots.insert(request_id, tx);
        Ok(rx)
    }

    fn complete(&self, response: Response) -> bool {
        let slot = self.lock().slots.remove(&response.request_id);
        match slot {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    fn remove(&self, request_id: i32) {
        self.lock().slots.remove(&request_id);
    }

    fn close(&self) {
        let drained = {
            let mut pending = self.lock();
            pending.closed = true;
            std::mem::take(&mut pending.slots)
        };
        if !drained.is_empty() {
            debug!(waiters = drained.len(), "response channel ended with requests in flight");
        }
    }

    fn len(&self) -> usize {
        self.lock().slots.len()
    }
}

/// Issues requests on a channel and matches replies by `requestId`.
///
/// The correlator consumes the channel's inbox; don't read the same channel
/// elsewhere.
pub struct RequestCorrelator {
    channel: Channel,
    ids: RequestIds,
    pending: Arc<PendingTable>,
    config: CorrelatorConfig,
    error_types: Arc<[String]>,
    cancel: CancellationToken,
}

impl RequestCorrelator {
    /// Start correlating on `channel` with a private id sequence.
    pub fn new(channel: Channel, config: CorrelatorConfig) -> Self {
        Self::with_request_ids(channel, config, RequestIds::new())
    }

    /// Start correlating with an explicitly shared id sequence.
    pub fn with_request_ids(channel: Channel, config: CorrelatorConfig, ids: RequestIds) -> Self {
        let pending = Arc::new(PendingTable::default());
        let cancel = CancellationToken::new();
        tokio::spawn(dispatch(
            channel.clone(),
            Arc::clone(&pending),
            cancel.clone(),
        ));

        let error_types = config.error_types.clone().into();
        Self {
            channel,
            ids,
            pending,
            config,
            error_types,
            cancel,
        }
    }

    /// Send a request without waiting. The slot is registered before the
    /// write, so a fast reply cannot be missed.
    ///
    /// `payload` must serialize to a JSON object.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<PendingReply> {
        if self.cancel.is_cancelled() {
            return Err(MuxError::Cancelled);
        }

        let mut value = serde_json::to_value(payload)?;
        let Some(object) = value.as_object_mut() else {
            return Err(MuxError::InvalidRequest(
                "request payload must be a JSON object".to_string(),
            ));
        };
        let request_id = self.ids.next_id();
        object.insert("requestId".to_string(), Value::from(request_id));

        let reply = PendingReply {
            request_id,
            rx: self.pending.register(request_id)?,
            pending: Arc::clone(&self.pending),
            cancel: self.cancel.clone(),
            timeout: self.config.request_timeout,
            error_types: Arc::clone(&self.error_types),
        };

        // On failure `reply` drops here and removes its slot.
        self.channel.send_json(&value).await?;
        trace!(request_id, namespace = self.channel.namespace(), "request sent");
        Ok(reply)
    }

    /// Send a request and wait for its reply.
    pub async fn request<T: Serialize + ?Sized>(&self, payload: &T) -> Result<Response> {
        self.send(payload).await?.wait().await
    }

    /// Cancel every in-flight and future request. The channel stays open.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of requests currently awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn request_ids(&self) -> &RequestIds {
        &self.ids
    }
}

impl Drop for RequestCorrelator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("channel", &self.channel)
            .field("in_flight", &self.in_flight())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A sent request awaiting its reply. Dropping it abandons the wait.
pub struct PendingReply {
    request_id: i32,
    rx: oneshot::Receiver<Response>,
    pending: Arc<PendingTable>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    error_types: Arc<[String]>,
}

impl PendingReply {
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    /// Wait for the first of: reply, cancellation, channel end, timeout.
    pub async fn wait(mut self) -> Result<Response> {
        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(MuxError::Cancelled),
            reply = &mut self.rx => match reply {
                Ok(response) => classify(response, &self.error_types),
                Err(_) => Err(MuxError::ResponseChannelClosed),
            },
            () = deadline => Err(MuxError::Timeout(timeout.unwrap_or_default())),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.pending.remove(self.request_id);
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

fn classify(response: Response, error_types: &[String]) -> Result<Response> {
    if error_types.iter().any(|kind| *kind == response.kind) {
        let reason = match response.body.get("reason") {
            Some(Value::String(reason)) => reason.clone(),
            _ => response.body.to_string(),
        };
        return Err(MuxError::Rejected {
            kind: response.kind,
            reason,
        });
    }
    Ok(response)
}

async fn dispatch(channel: Channel, pending: Arc<PendingTable>, cancel: CancellationToken) {
    loop {
        let envelope = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = channel.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let Some(text) = envelope.payload_text() else {
            debug!(namespace = envelope.namespace(), "dropping binary payload");
            continue;
        };
        let body: Value = match serde_json::from_str(text) {
            Ok(body) => body,
            Err(err) => {
                debug!(namespace = envelope.namespace(), error = %err, "dropping malformed payload");
                continue;
            }
        };
        let header = match ReplyHeader::deserialize(&body) {
            Ok(header) => header,
            Err(err) => {
                debug!(namespace = envelope.namespace(), error = %err, "dropping payload without type");
                continue;
            }
        };

        let request_id = header.request_id;
        let kind = header.kind;
        if !pending.complete(Response {
            kind: kind.clone(),
            request_id,
            body,
        }) {
            trace!(request_id, kind = %kind, "no waiter for reply");
        }
    }

    pending.close();
    trace!(namespace = channel.namespace(), "correlator dispatch stopped");
}
