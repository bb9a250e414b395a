use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use castwire_ctrl::{ConnectionController, ControllerOptions, ReceiverController};
use castwire_mux::{
    connect, Connection, Heartbeat, HeartbeatConfig, HeartbeatState, RequestIds,
    HEARTBEAT_NAMESPACE,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cmd::{parse_duration, with_default_port, DeviceArgs};
use crate::exit::{
    ctrl_error, mux_error, CliError, CliResult, INTERRUPTED, PEER_UNRESPONSIVE, TIMEOUT,
    TRANSPORT_ERROR,
};

/// A connected receiver platform with its virtual connection and heartbeat.
pub struct Session {
    connection: Connection,
    platform: ConnectionController,
    heartbeat: Arc<Heartbeat>,
    heartbeat_task: JoinHandle<castwire_mux::Result<()>>,
    receiver: ReceiverController,
    options: ControllerOptions,
    sender_id: String,
}

impl Session {
    pub async fn open(args: &DeviceArgs) -> CliResult<Self> {
        let timeout = parse_duration(&args.timeout)?;
        let interval = parse_duration(&args.heartbeat)?;
        let addr = with_default_port(&args.addr);

        let connection = tokio::time::timeout(timeout, connect(addr.as_str()))
            .await
            .map_err(|_| {
                CliError::new(TIMEOUT, format!("connect to {addr} timed out after {timeout:?}"))
            })?
            .map_err(|err| mux_error(&format!("connect to {addr}"), err))?;

        let platform = ConnectionController::new(&connection, &args.sender_id, &args.receiver_id);
        platform
            .connect()
            .await
            .map_err(|err| ctrl_error("connect", err))?;

        let heartbeat = Arc::new(Heartbeat::new(
            connection.channel(HEARTBEAT_NAMESPACE, &args.sender_id, &args.receiver_id),
            HeartbeatConfig {
                interval,
                ..HeartbeatConfig::default()
            },
        ));
        let heartbeat_task = {
            let heartbeat = Arc::clone(&heartbeat);
            tokio::spawn(async move { heartbeat.beat().await })
        };

        let options = ControllerOptions {
            request_timeout: Some(timeout),
            request_ids: RequestIds::new(),
        };
        let receiver = ReceiverController::with_options(
            &connection,
            &args.sender_id,
            &args.receiver_id,
            options.clone(),
        );

        debug!(%addr, receiver = %args.receiver_id, "session established");
        Ok(Self {
            connection,
            platform,
            heartbeat,
            heartbeat_task,
            receiver,
            options,
            sender_id: args.sender_id.clone(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn receiver(&self) -> &ReceiverController {
        &self.receiver
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    /// Options for further controllers; they share this session's id sequence.
    pub fn options(&self) -> ControllerOptions {
        self.options.clone()
    }

    /// Drive `work` until it finishes, the peer dies or the user interrupts.
    pub async fn run<T, F>(&self, context: &str, work: F) -> CliResult<T>
    where
        F: Future<Output = castwire_ctrl::Result<T>>,
    {
        tokio::select! {
            biased;
            result = work => result.map_err(|err| ctrl_error(context, err)),
            () = peer_dead(self.heartbeat.watch_state()) => {
                let code = if self.connection.is_closed() {
                    TRANSPORT_ERROR
                } else {
                    PEER_UNRESPONSIVE
                };
                Err(CliError::new(code, format!("{context}: receiver stopped responding")))
            }
            () = interrupted() => Err(CliError::new(INTERRUPTED, format!("{context}: interrupted"))),
        }
    }

    /// Stop the heartbeat, close the virtual connection and the transport.
    pub async fn close(self) {
        self.heartbeat.stop();
        match self.heartbeat_task.await {
            Ok(Err(err)) => debug!(%err, "heartbeat ended with error"),
            Err(err) => warn!(%err, "heartbeat task failed"),
            Ok(Ok(())) => {}
        }

        self.receiver.close();
        if !self.connection.is_closed() {
            let closing = tokio::time::timeout(Duration::from_secs(1), self.platform.close());
            match closing.await {
                Ok(Err(err)) => debug!(%err, "virtual connection close failed"),
                Err(_) => debug!("virtual connection close timed out"),
                Ok(Ok(())) => {}
            }
        }

        self.connection.close();
        self.connection.closed().await;
    }
}

async fn peer_dead(mut state: watch::Receiver<HeartbeatState>) {
    if state
        .wait_for(|state| *state == HeartbeatState::Dead)
        .await
        .is_err()
    {
        std::future::pending::<()>().await;
    }
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
