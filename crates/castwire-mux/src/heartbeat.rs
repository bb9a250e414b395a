use std::fmt;
use std::time::Duration;

use castwire_frame::Envelope;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::channel::Channel;
use crate::control::{PayloadHeader, PING, PONG};
use crate::error::{MuxError, Result};

/// Heartbeat configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time between probes; also the reply deadline. Default: 5 s.
    pub interval: Duration,
    /// Consecutive unanswered probes before the peer is declared dead.
    /// Default: 3. Values below 1 are treated as 1.
    pub miss_limit: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            miss_limit: 3,
        }
    }
}

/// Observable liveness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    /// No probe outstanding.
    Idle,
    /// A probe is awaiting its reply.
    Probing,
    /// The peer missed too many probes or the channel ended.
    Dead,
    /// Stopped locally.
    Stopped,
}

impl fmt::Display for HeartbeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HeartbeatState::Idle => "idle",
            HeartbeatState::Probing => "probing",
            HeartbeatState::Dead => "dead",
            HeartbeatState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Liveness monitor driven over a heartbeat channel.
///
/// The monitor owns the channel's inbox: it reads replies and answers the
/// peer's own probes.
pub struct Heartbeat {
    channel: Channel,
    config: HeartbeatConfig,
    cancel: CancellationToken,
    state: watch::Sender<HeartbeatState>,
}

impl Heartbeat {
    pub fn new(channel: Channel, config: HeartbeatConfig) -> Self {
        let (state, _) = watch::channel(HeartbeatState::Idle);
        Self {
            channel,
            config,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Run the probe loop until the peer is declared dead or [`stop`] is
    /// called.
    ///
    /// Returns `Ok(())` when stopped, `Err(MuxError::PeerUnresponsive { .. })`
    /// when the peer goes silent, or the send error if a probe cannot be
    /// written.
    ///
    /// [`stop`]: Heartbeat::stop
    pub async fn beat(&self) -> Result<()> {
        let miss_limit = self.config.miss_limit.max(1);
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut misses = Misses::default();
        self.state.send_replace(HeartbeatState::Idle);

        let outcome = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    // A reply already queued beats the deadline.
                    if let Err(err) = self.drain_inbox(&mut misses).await {
                        break Err(err);
                    }
                    if misses.awaiting {
                        misses.missed += 1;
                        warn!(
                            missed = misses.missed,
                            miss_limit,
                            peer = self.channel.peer_id(),
                            "heartbeat probe unanswered"
                        );
                        if misses.missed >= miss_limit {
                            break Err(MuxError::PeerUnresponsive { missed: misses.missed });
                        }
                    }
                    if let Err(err) = self.channel.send_json(&PayloadHeader::ping()).await {
                        break Err(err);
                    }
                    trace!(peer = self.channel.peer_id(), "PING sent");
                    misses.awaiting = true;
                    self.state.send_replace(HeartbeatState::Probing);
                }
                envelope = self.channel.recv() => {
                    let Some(envelope) = envelope else {
                        debug!(peer = self.channel.peer_id(), "heartbeat channel ended");
                        break Err(MuxError::PeerUnresponsive { missed: misses.missed });
                    };
                    if let Err(err) = self.on_envelope(&envelope, &mut misses).await {
                        break Err(err);
                    }
                }
            }
        };

        let final_state = match outcome {
            Ok(()) => HeartbeatState::Stopped,
            Err(_) => HeartbeatState::Dead,
        };
        self.state.send_replace(final_state);
        debug!(state = %final_state, "heartbeat finished");
        outcome
    }

    async fn drain_inbox(&self, misses: &mut Misses) -> Result<()> {
        while let Some(envelope) = self.channel.try_recv() {
            self.on_envelope(&envelope, misses).await?;
        }
        Ok(())
    }

    async fn on_envelope(&self, envelope: &Envelope, misses: &mut Misses) -> Result<()> {
        match envelope.payload_text().and_then(PayloadHeader::parse) {
            Some(header) if header.is(PONG) => {
                trace!(peer = self.channel.peer_id(), "PONG received");
                *misses = Misses::default();
                self.state.send_replace(HeartbeatState::Idle);
            }
            Some(header) if header.is(PING) => {
                self.channel.send_json(&PayloadHeader::pong()).await?;
                trace!(peer = self.channel.peer_id(), "answered peer PING");
            }
            _ => trace!("ignoring non-heartbeat payload"),
        }
        Ok(())
    }

    /// Stop the probe loop; `beat` returns `Ok(())`.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> HeartbeatState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<HeartbeatState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}

/// Miss bookkeeping for one `beat` run.
#[derive(Debug, Default)]
struct Misses {
    missed: u32,
    awaiting: bool,
}

impl fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heartbeat")
            .field("channel", &self.channel)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
