//! Single-owner fan-out of inbound envelopes to channel mailboxes.
//!
//! The subscriber map lives inside one task. Every other party talks to it
//! through an unbounded command queue, so `publish`, `subscribe` and
//! `unsubscribe` never block and are safe to call from `Drop`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use castwire_frame::Envelope;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::mailbox::{self, MailboxReceiver, MailboxSender};

/// Subscription predicate. `None` in [`Broadcaster::subscribe`] accepts all.
pub type Filter = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Identifies one subscription on a broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A registered subscription: its id and the mailbox it is fed through.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: MailboxReceiver<Arc<Envelope>>,
}

enum Command {
    Publish(Arc<Envelope>),
    Subscribe {
        id: SubscriberId,
        sender: MailboxSender<Arc<Envelope>>,
        filter: Option<Filter>,
    },
    Unsubscribe(SubscriberId),
    Shutdown,
}

struct Subscriber {
    sender: MailboxSender<Arc<Envelope>>,
    filter: Option<Filter>,
}

impl Subscriber {
    fn accepts(&self, envelope: &Envelope) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(envelope))
    }
}

/// Handle to a running broadcaster task. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl Broadcaster {
    /// Start the broadcaster task on the current tokio runtime.
    pub fn spawn() -> Self {
        let (commands, intake) = mpsc::unbounded_channel();
        tokio::spawn(run(intake));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Fan `envelope` out to every accepting subscriber.
    pub fn publish(&self, envelope: Arc<Envelope>) {
        if self.commands.send(Command::Publish(envelope)).is_err() {
            trace!("publish after broadcaster shutdown dropped");
        }
    }

    /// Register a subscriber with a drop-oldest mailbox of `capacity`.
    ///
    /// After shutdown the returned receiver is already closed.
    pub fn subscribe(&self, filter: Option<Filter>, capacity: usize) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mailbox::channel(capacity);
        // On a closed intake the command, and with it the sender, is dropped.
        let _ = self.commands.send(Command::Subscribe { id, sender, filter });
        Subscription { id, receiver }
    }

    /// Remove a subscriber and close its mailbox. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.commands.send(Command::Unsubscribe(id));
    }

    /// Stop the broadcaster and close every subscriber mailbox.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_shutdown(&self) -> bool {
        self.commands.is_closed()
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

async fn run(mut intake: mpsc::UnboundedReceiver<Command>) {
    let mut subscribers: HashMap<SubscriberId, Subscriber> = HashMap::new();

    while let Some(command) = intake.recv().await {
        match command {
            Command::Publish(envelope) => fan_out(&mut subscribers, &envelope),
            Command::Subscribe { id, sender, filter } => {
                trace!(subscriber = %id, "subscriber added");
                subscribers.insert(id, Subscriber { sender, filter });
            }
            Command::Unsubscribe(id) => {
                if subscribers.remove(&id).is_some() {
                    trace!(subscriber = %id, "subscriber removed");
                }
            }
            Command::Shutdown => break,
        }
    }

    intake.close();
    debug!(
        subscribers = subscribers.len(),
        "broadcaster stopped; closing subscriber mailboxes"
    );
    // Dropping the senders closes every mailbox; queued Subscribe commands
    // are dropped with `intake`.
}

fn fan_out(subscribers: &mut HashMap<SubscriberId, Subscriber>, envelope: &Arc<Envelope>) {
    let mut gone = Vec::new();
    let mut delivered = 0usize;

    for (id, subscriber) in subscribers.iter() {
        if !subscriber.accepts(envelope) {
            continue;
        }
        match subscriber.sender.push(Arc::clone(envelope)) {
            Ok(None) => delivered += 1,
            Ok(Some(_)) => {
                delivered += 1;
                warn!(
                    subscriber = %id,
                    namespace = envelope.namespace(),
                    evicted = subscriber.sender.evicted(),
                    "mailbox full; oldest envelope dropped"
                );
            }
            Err(_) => gone.push(*id),
        }
    }

    for id in gone {
        trace!(subscriber = %id, "pruning closed subscriber");
        subscribers.remove(&id);
    }

    trace!(
        namespace = envelope.namespace(),
        source = envelope.source_id(),
        destination = envelope.destination_id(),
        delivered,
        "envelope fanned out"
    );
}
