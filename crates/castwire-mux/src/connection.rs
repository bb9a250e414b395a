use std::fmt;
use std::io;
use std::sync::Arc;

use castwire_frame::{
    Envelope, Frame, FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::broadcaster::Broadcaster;
use crate::channel::{Channel, Route};
use crate::error::{MuxError, Result};

/// Frames queued for the writer task before `send` waits.
const OUTBOX_CAPACITY: usize = 64;

/// One outbound frame and where to report how writing it went.
pub(crate) struct WriteRequest {
    pub(crate) envelope: Envelope,
    pub(crate) done: oneshot::Sender<Result<()>>,
}

/// Outbound queue of a connection, shared by every channel.
pub(crate) type Outbox = mpsc::Sender<WriteRequest>;

/// Default per-channel inbox capacity.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximum frame body size, both directions. Default: 64 KiB.
    pub max_payload_size: usize,
    /// Inbox capacity for channels opened with [`Connection::channel`].
    pub mailbox_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// One cast connection: a reader task feeding a broadcaster, plus a writer
/// task draining the outbound queue of every channel opened on it.
///
/// Frames are written whole by the writer task, so a caller that gives up
/// on `send` never leaves half a frame on the wire. A failed write is fatal:
/// it stops the reader and closes every channel.
///
/// Dropping the connection stops both tasks and closes every channel inbox.
pub struct Connection {
    broadcaster: Broadcaster,
    outbox: Outbox,
    cancel: CancellationToken,
    terminated: CancellationToken,
    reader: Option<JoinHandle<Result<()>>>,
    writer: Option<JoinHandle<Result<()>>>,
    config: ConnectionConfig,
}

impl Connection {
    /// Take ownership of `stream` and start reading from it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let frame_config = FrameConfig {
            max_payload_size: config.max_payload_size,
        };

        let reader = FrameReader::with_config(read_half, frame_config.clone());
        let writer = FrameWriter::with_config(write_half, frame_config);
        let (outbox, requests) = mpsc::channel(OUTBOX_CAPACITY);

        let broadcaster = Broadcaster::spawn();
        let cancel = CancellationToken::new();
        let terminated = CancellationToken::new();

        let reader = tokio::spawn(read_loop(
            reader,
            broadcaster.clone(),
            cancel.clone(),
            terminated.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            writer,
            requests,
            cancel.clone(),
            terminated.clone(),
        ));
        debug!(
            max_payload_size = config.max_payload_size,
            mailbox_capacity = config.mailbox_capacity,
            "connection started"
        );

        Self {
            broadcaster,
            outbox,
            cancel,
            terminated,
            reader: Some(reader),
            writer: Some(writer),
            config,
        }
    }

    /// Open a channel with the configured inbox capacity.
    pub fn channel(
        &self,
        namespace: impl Into<String>,
        local_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Channel {
        self.channel_with_capacity(namespace, local_id, peer_id, self.config.mailbox_capacity)
    }

    /// Open a channel with an explicit inbox capacity (minimum 1).
    pub fn channel_with_capacity(
        &self,
        namespace: impl Into<String>,
        local_id: impl Into<String>,
        peer_id: impl Into<String>,
        capacity: usize,
    ) -> Channel {
        Channel::open(
            Route::new(namespace, local_id, peer_id),
            capacity,
            &self.broadcaster,
            self.outbox.clone(),
            self.terminated.clone(),
        )
    }

    /// Ask the reader to stop. Channels observe end-of-stream once it has.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait until the reader has stopped, for any reason.
    pub async fn closed(&self) {
        self.terminated.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Wait for both tasks to stop and return why the connection ended.
    ///
    /// `Ok(())` after [`Connection::close`]; `Err(MuxError::Disconnected)` when
    /// the peer closed the stream; `Err(MuxError::Frame(_))` on any other
    /// read, decode or write failure. A panic in either task is resumed here.
    pub async fn join(mut self) -> Result<()> {
        let read = match self.reader.take() {
            Some(task) => joined(task.await),
            None => Ok(()),
        };
        let write = match self.writer.take() {
            Some(task) => joined(task.await),
            None => Ok(()),
        };
        read.and(write)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn read_loop<R>(
    mut reader: FrameReader<R>,
    broadcaster: Broadcaster,
    cancel: CancellationToken,
    terminated: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let _terminated = terminated.drop_guard();

    let result = loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => break Ok(()),
            frame = reader.read_frame() => frame,
        };

        match frame {
            Ok(Frame::Empty) => continue,
            Ok(Frame::Message(envelope)) => {
                trace!(
                    namespace = envelope.namespace(),
                    source = envelope.source_id(),
                    destination = envelope.destination_id(),
                    "envelope received"
                );
                broadcaster.publish(Arc::new(envelope));
            }
            Err(FrameError::ConnectionClosed) => break Err(MuxError::Disconnected),
            Err(err) => break Err(MuxError::Frame(err)),
        }
    };

    broadcaster.shutdown();
    match &result {
        Ok(()) => debug!("connection reader cancelled"),
        Err(MuxError::Disconnected) => debug!("peer closed the connection"),
        Err(err) => warn!(error = %err, "connection reader failed"),
    }
    result
}

fn joined(outcome: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match outcome {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(MuxError::Aborted),
    }
}

async fn write_loop<W>(
    mut writer: FrameWriter<W>,
    mut requests: mpsc::Receiver<WriteRequest>,
    cancel: CancellationToken,
    terminated: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let request = tokio::select! {
            biased;
            () = terminated.cancelled() => return Ok(()),
            request = requests.recv() => match request {
                Some(request) => request,
                None => return Ok(()),
            },
        };

        // Only a dead connection interrupts a frame mid-write.
        let written = tokio::select! {
            biased;
            () = terminated.cancelled() => {
                let _ = request.done.send(Err(MuxError::ChannelClosed));
                return Ok(());
            }
            written = writer.send(&request.envelope) => written,
        };

        match written {
            Ok(()) => {
                let _ = request.done.send(Ok(()));
            }
            // Rejected before any byte was written; the stream is intact.
            Err(err @ FrameError::PayloadTooLarge { .. }) => {
                let _ = request.done.send(Err(err.into()));
            }
            Err(err) => {
                warn!(error = %err, "connection writer failed");
                let fault = replicate(&err);
                let _ = request.done.send(Err(MuxError::Frame(err)));
                cancel.cancel();
                return Err(MuxError::Frame(fault));
            }
        }
    }
}

/// Copy of a write failure for [`Connection::join`]; the original goes to
/// the caller whose frame failed.
fn replicate(err: &FrameError) -> FrameError {
    match err {
        FrameError::IncompleteWrite { expected, written } => FrameError::IncompleteWrite {
            expected: *expected,
            written: *written,
        },
        FrameError::Io(source) => FrameError::Io(io::Error::new(source.kind(), source.to_string())),
        other => FrameError::Io(io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use castwire_frame::Envelope;
    use tokio::io::AsyncWriteExt;
    use tokio::time::timeout;

    use super::*;

    const NS: &str = "urn:x-cast:test";

    #[tokio::test]
    async fn routes_inbound_envelope_to_matching_channel() {
        let (local, remote) = tokio::io::duplex(4096);
        let connection = Connection::spawn(local, ConnectionConfig::default());
        let channel = connection.channel(NS, "sender-0", "receiver-0");

        let mut peer = FrameWriter::new(remote);
        peer.send(&Envelope::new(NS, "receiver-0", "sender-0", "hello"))
            .await
            .unwrap();

        let envelope = timeout(Duration::from_secs(1), channel.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.payload_text(), Some("hello"));
    }

    #[tokio::test]
    async fn outbound_send_reaches_peer() {
        let (local, remote) = tokio::io::duplex(4096);
        let connection = Connection::spawn(local, ConnectionConfig::default());
        let channel = connection.channel(NS, "sender-0", "receiver-0");

        channel.send(r#"{"type":"PING"}"#).await.unwrap();

        let mut peer = FrameReader::new(remote);
        let frame = peer.read_frame().await.unwrap();
        assert_eq!(
            frame,
            Frame::Message(Envelope::new(NS, "sender-0", "receiver-0", r#"{"type":"PING"}"#))
        );
    }

    #[tokio::test]
    async fn peer_eof_is_disconnected_and_closes_channels() {
        let (local, remote) = tokio::io::duplex(4096);
        let connection = Connection::spawn(local, ConnectionConfig::default());
        let channel = connection.channel(NS, "sender-0", "receiver-0");

        drop(remote);

        assert_eq!(timeout(Duration::from_secs(1), channel.recv()).await.unwrap(), None);
        connection.closed().await;
        assert!(channel.is_closed());
        assert!(matches!(
            channel.send("late").await,
            Err(MuxError::ChannelClosed)
        ));
        assert!(matches!(connection.join().await, Err(MuxError::Disconnected)));
    }

    #[tokio::test]
    async fn truncated_frame_is_a_frame_error() {
        let (local, mut remote) = tokio::io::duplex(4096);
        let connection = Connection::spawn(local, ConnectionConfig::default());

        remote.write_all(&[0x00, 0x00, 0x00, 0x10, 0x01]).await.unwrap();
        drop(remote);

        let result = timeout(Duration::from_secs(1), connection.join())
            .await
            .unwrap();
        assert!(matches!(
            result,
            Err(MuxError::Frame(FrameError::IncompleteRead { .. }))
        ));
    }

    #[tokio::test]
    async fn empty_frames_are_skipped() {
        let (local, mut remote) = tokio::io::duplex(4096);
        let connection = Connection::spawn(local, ConnectionConfig::default());
        let channel = connection.channel(NS, "sender-0", "receiver-0");

        remote.write_all(&[0, 0, 0, 0, 0, 0, 0, 0]).await.unwrap();
        let mut peer = FrameWriter::new(remote);
        peer.send(&Envelope::new(NS, "receiver-0", "*", "after-empty"))
            .await
            .unwrap();

        let envelope = timeout(Duration::from_secs(1), channel.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(envelope.payload_text(), Some("after-empty"));
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn oversized_frame_fails_alone() {
        let (local, remote) = tokio::io::duplex(4096);
        let config = ConnectionConfig {
            max_payload_size: 64,
            ..ConnectionConfig::default()
        };
        let connection = Connection::spawn(local, config);
        let channel = connection.channel(NS, "sender-0", "receiver-0");

        let err = channel.send("x".repeat(128)).await.unwrap_err();
        assert!(matches!(err, MuxError::Frame(FrameError::PayloadTooLarge { .. })));

        channel.send("small").await.unwrap();
        let mut peer = FrameReader::new(remote);
        let Frame::Message(envelope) = peer.read_frame().await.unwrap() else {
            panic!("expected a message");
        };
        assert_eq!(envelope.payload_text(), Some("small"));
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn aborted_task_is_not_a_transport_error() {
        let task: JoinHandle<Result<()>> = tokio::spawn(std::future::pending());
        task.abort();
        assert!(matches!(joined(task.await), Err(MuxError::Aborted)));
    }

    #[tokio::test]
    #[should_panic(expected = "reader exploded")]
    async fn panicked_task_is_resumed() {
        let task: JoinHandle<Result<()>> = tokio::spawn(async { panic!("reader exploded") });
        let _ = joined(task.await);
    }

    #[test]
    fn replicated_write_failure_keeps_its_kind() {
        let err = FrameError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe gone"));
        let FrameError::Io(copy) = replicate(&err) else {
            panic!("expected an io error");
        };
        assert_eq!(copy.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(copy.to_string(), "pipe gone");
    }

    #[tokio::test]
    async fn local_close_is_clean() {
        let (local, _remote) = tokio::io::duplex(4096);
        let connection = Connection::spawn(local, ConnectionConfig::default());
        let channel = connection.channel(NS, "sender-0", "receiver-0");

        connection.close();
        connection.closed().await;

        assert_eq!(channel.recv().await, None);
        assert!(connection.join().await.is_ok());
    }
}
