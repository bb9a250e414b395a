use std::time::Duration;

use castwire_ctrl::{
    CloseReason, ConnectionController, ControllerOptions, CtrlError, LoadOptions,
    MediaController, MediaInfo, ReceiverController, StreamType,
};
use castwire_frame::{Envelope, Frame, FrameReader, FrameWriter};
use castwire_mux::{Connection, ConnectionConfig, MuxError, RequestIds, CONNECTION_NAMESPACE};
use serde_json::{json, Value};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

const SENDER: &str = "sender-0";
const RECEIVER: &str = "receiver-0";

struct FakeDevice {
    reader: FrameReader<ReadHalf<DuplexStream>>,
    writer: FrameWriter<WriteHalf<DuplexStream>>,
}

impl FakeDevice {
    async fn next_json(&mut self) -> (Envelope, Value) {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.reader.read_frame())
                .await
                .expect("device should receive in time")
                .expect("device read should succeed");
            if let Frame::Message(envelope) = frame {
                let body = serde_json::from_str(envelope.payload_text().expect("text payload"))
                    .expect("json payload");
                return (envelope, body);
            }
        }
    }

    async fn reply(&mut self, request: &Envelope, request_body: &Value, mut body: Value) {
        body["requestId"] = request_body["requestId"].clone();
        self.writer
            .send(&Envelope::new(
                request.namespace(),
                request.destination_id(),
                request.source_id(),
                body.to_string(),
            ))
            .await
            .expect("device write should succeed");
    }

    async fn send(&mut self, namespace: &str, source: &str, destination: &str, body: Value) {
        self.writer
            .send(&Envelope::new(namespace, source, destination, body.to_string()))
            .await
            .expect("device write should succeed");
    }
}

fn pair() -> (Connection, FakeDevice) {
    let (local, remote) = tokio::io::duplex(256 * 1024);
    let connection = Connection::spawn(local, ConnectionConfig::default());
    let (read_half, write_half) = tokio::io::split(remote);
    (
        connection,
        FakeDevice {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
        },
    )
}

#[tokio::test]
async fn connect_then_peer_close() {
    let (connection, mut device) = pair();
    let controller = ConnectionController::new(&connection, SENDER, RECEIVER);

    controller.connect().await.unwrap();
    let (envelope, body) = device.next_json().await;
    assert_eq!(envelope.namespace(), CONNECTION_NAMESPACE);
    assert_eq!(body["type"], "CONNECT");

    device
        .send(CONNECTION_NAMESPACE, RECEIVER, SENDER, json!({"type": "CLOSE"}))
        .await;

    let reason = tokio::time::timeout(Duration::from_secs(5), controller.wait_closed())
        .await
        .unwrap();
    assert_eq!(reason, CloseReason::Peer);
    assert!(matches!(
        controller.connect().await,
        Err(CtrlError::ClosedByPeer)
    ));

    // No CLOSE is echoed back after the peer closed.
    controller.close().await.unwrap();
    assert_eq!(controller.close_reason(), Some(CloseReason::Peer));
}

#[tokio::test]
async fn local_close_sends_close() {
    let (connection, mut device) = pair();
    let controller = ConnectionController::new(&connection, SENDER, RECEIVER);

    controller.close().await.unwrap();

    let (_, body) = device.next_json().await;
    assert_eq!(body["type"], "CLOSE");
    assert_eq!(controller.wait_closed().await, CloseReason::Local);
}

#[tokio::test]
async fn every_waiter_sees_the_close_reason() {
    let (connection, mut device) = pair();
    let controller = ConnectionController::new(&connection, SENDER, RECEIVER);
    let controller = std::sync::Arc::new(controller);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.wait_closed().await })
        })
        .collect();
    tokio::task::yield_now().await;

    device
        .send(CONNECTION_NAMESPACE, RECEIVER, SENDER, json!({"type": "CLOSE"}))
        .await;

    for waiter in waiters {
        let reason = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, CloseReason::Peer);
    }
    // Already closed: resolves immediately.
    assert_eq!(controller.wait_closed().await, CloseReason::Peer);
}

#[tokio::test]
async fn transport_loss_is_disconnected() {
    let (connection, device) = pair();
    let controller = ConnectionController::new(&connection, SENDER, RECEIVER);

    drop(device);

    let reason = tokio::time::timeout(Duration::from_secs(5), controller.wait_closed())
        .await
        .unwrap();
    assert_eq!(reason, CloseReason::Disconnected);
}

#[tokio::test]
async fn receiver_status_and_volume() {
    let (connection, mut device) = pair();
    let receiver = ReceiverController::new(&connection, SENDER, RECEIVER);

    let server = tokio::spawn(async move {
        let (request, body) = device.next_json().await;
        assert_eq!(body["type"], "GET_STATUS");
        device
            .reply(
                &request,
                &body,
                json!({"type": "RECEIVER_STATUS", "status": {
                    "applications": [{"appId": "CC1AD845", "sessionId": "s-1", "transportId": "web-1"}],
                    "volume": {"level": 0.4, "muted": false}
                }}),
            )
            .await;

        let (request, body) = device.next_json().await;
        assert_eq!(body["type"], "SET_VOLUME");
        assert_eq!(body["volume"], json!({"muted": true}));
        device
            .reply(
                &request,
                &body,
                json!({"type": "RECEIVER_STATUS", "status": {"volume": {"level": 0.4, "muted": true}}}),
            )
            .await;

        let (request, body) = device.next_json().await;
        assert_eq!(body["type"], "STOP");
        assert_eq!(body["sessionId"], "s-1");
        device
            .reply(&request, &body, json!({"type": "RECEIVER_STATUS", "status": {}}))
            .await;
    });

    let status = receiver.get_status().await.unwrap();
    assert_eq!(
        status.application("CC1AD845").unwrap().session_id.as_deref(),
        Some("s-1")
    );

    let status = receiver.set_muted(true).await.unwrap();
    assert_eq!(status.volume.unwrap().muted, Some(true));

    let status = receiver.stop("s-1").await.unwrap();
    assert!(status.applications.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn launch_error_is_typed() {
    let (connection, mut device) = pair();
    let receiver = ReceiverController::new(&connection, SENDER, RECEIVER);

    let server = tokio::spawn(async move {
        let (request, body) = device.next_json().await;
        assert_eq!(body["type"], "LAUNCH");
        assert_eq!(body["appId"], "DEADBEEF");
        device
            .reply(
                &request,
                &body,
                json!({"type": "LAUNCH_ERROR", "reason": "NOT_FOUND"}),
            )
            .await;
        device
    });

    let err = receiver.launch("DEADBEEF").await.unwrap_err();
    assert!(matches!(err, CtrlError::LaunchFailed(ref reason) if reason == "NOT_FOUND"));
    server.await.unwrap();
}

#[tokio::test]
async fn invalid_request_is_rejected() {
    let (connection, mut device) = pair();
    let receiver = ReceiverController::new(&connection, SENDER, RECEIVER);

    let server = tokio::spawn(async move {
        let (request, body) = device.next_json().await;
        device
            .reply(
                &request,
                &body,
                json!({"type": "INVALID_REQUEST", "reason": "INVALID_COMMAND"}),
            )
            .await;
        device
    });

    let err = receiver.get_status().await.unwrap_err();
    assert!(matches!(
        err,
        CtrlError::Mux(MuxError::Rejected { ref kind, .. }) if kind == "INVALID_REQUEST"
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn media_load_play_and_failures() {
    let (connection, mut device) = pair();
    let options = ControllerOptions {
        request_timeout: Some(Duration::from_secs(5)),
        request_ids: RequestIds::new(),
    };
    let media = MediaController::with_options(&connection, SENDER, "web-1", options);

    let server = tokio::spawn(async move {
        let (request, body) = device.next_json().await;
        assert_eq!(request.destination_id(), "web-1");
        assert_eq!(body["type"], "LOAD");
        assert_eq!(body["autoplay"], true);
        assert_eq!(body["media"]["streamType"], "LIVE");
        device
            .reply(
                &request,
                &body,
                json!({"type": "MEDIA_STATUS", "status": [{"mediaSessionId": 3, "playerState": "PLAYING"}]}),
            )
            .await;

        let (request, body) = device.next_json().await;
        assert_eq!(body["type"], "PLAY");
        assert_eq!(body["mediaSessionId"], 3);
        device
            .reply(&request, &body, json!({"type": "MEDIA_STATUS", "status": []}))
            .await;

        let (request, body) = device.next_json().await;
        device.reply(&request, &body, json!({"type": "LOAD_FAILED"})).await;

        let (request, body) = device.next_json().await;
        device.reply(&request, &body, json!({"type": "LOAD_CANCELLED"})).await;
    });

    let info = MediaInfo::new("http://example.test/live.m3u8", "application/x-mpegurl")
        .with_stream_type(StreamType::Live);
    let autoplay = LoadOptions {
        autoplay: true,
        ..LoadOptions::default()
    };

    let status = media.load(&info, &autoplay).await.unwrap();
    assert_eq!(status[0].media_session_id, 3);
    assert_eq!(status[0].player_state, "PLAYING");

    assert!(media.play(3).await.unwrap().is_empty());
    assert!(matches!(
        media.load(&info, &autoplay).await,
        Err(CtrlError::LoadFailed)
    ));
    assert!(matches!(
        media.load(&info, &autoplay).await,
        Err(CtrlError::LoadCancelled)
    ));
    server.await.unwrap();
}
