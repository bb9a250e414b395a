#![allow(dead_code)]

use std::time::Duration;

use castwire_frame::{Envelope, Frame, FrameReader, FrameWriter};
use castwire_mux::{Connection, ConnectionConfig};
use serde_json::Value;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

pub const SENDER: &str = "sender-0";
pub const RECEIVER: &str = "receiver-0";

/// The far end of a duplex pipe, scripted by the test.
pub struct FakeReceiver {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: FrameWriter<WriteHalf<DuplexStream>>,
}

impl FakeReceiver {
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        loop {
            match self.reader.read_frame().await {
                Ok(Frame::Message(envelope)) => return Some(envelope),
                Ok(Frame::Empty) => continue,
                Err(_) => return None,
            }
        }
    }

    pub async fn next_json(&mut self) -> Option<(Envelope, Value)> {
        let envelope = self.next_envelope().await?;
        let body = serde_json::from_str(envelope.payload_text()?).ok()?;
        Some((envelope, body))
    }

    pub async fn send(&mut self, namespace: &str, source: &str, destination: &str, text: &str) {
        self.writer
            .send(&Envelope::new(namespace, source, destination, text))
            .await
            .expect("fake receiver write should succeed");
    }

    pub async fn send_json(&mut self, namespace: &str, source: &str, destination: &str, body: &Value) {
        self.send(namespace, source, destination, &body.to_string()).await;
    }

    /// Answer `request` from its destination back to its source.
    pub async fn reply_json(&mut self, request: &Envelope, body: &Value) {
        self.writer
            .send(&Envelope::new(
                request.namespace(),
                request.destination_id(),
                request.source_id(),
                body.to_string(),
            ))
            .await
            .expect("fake receiver reply should succeed");
    }
}

pub fn pair() -> (Connection, FakeReceiver) {
    pair_with_config(ConnectionConfig::default())
}

pub fn pair_with_config(config: ConnectionConfig) -> (Connection, FakeReceiver) {
    pair_with_buffer(config, 256 * 1024)
}

/// A pair whose pipe holds at most `buffer` unread bytes.
pub fn pair_with_buffer(
    config: ConnectionConfig,
    buffer: usize,
) -> (Connection, FakeReceiver) {
    let (local, remote) = tokio::io::duplex(buffer);
    let connection = Connection::spawn(local, config);
    let (read_half, write_half) = tokio::io::split(remote);
    (
        connection,
        FakeReceiver {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
        },
    )
}

pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("operation should complete in time")
}
