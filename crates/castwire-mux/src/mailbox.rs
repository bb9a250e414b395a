//! Fixed-capacity, drop-oldest mailbox.
//!
//! The producer side never blocks: when the buffer is full the oldest item is
//! evicted to make room. The consumer side awaits items in FIFO order.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Returned by [`MailboxSender::push`] once the receiver side is closed.
#[derive(Debug, PartialEq, Eq)]
pub struct Closed<T>(pub T);

impl<T> fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("mailbox closed")
    }
}

/// Returned by [`MailboxReceiver::try_recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing buffered right now.
    Empty,
    /// Closed and fully drained.
    Closed,
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    capacity: usize,
    evicted: AtomicU64,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self, discard: bool) {
        {
            let mut state = self.lock();
            state.closed = true;
            if discard {
                state.queue.clear();
            }
        }
        self.notify.notify_waiters();
    }
}

/// Create a mailbox holding at most `capacity` items (minimum 1).
pub fn channel<T>(capacity: usize) -> (MailboxSender<T>, MailboxReceiver<T>) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::with_capacity(capacity),
            closed: false,
        }),
        notify: Notify::new(),
        capacity,
        evicted: AtomicU64::new(0),
    });
    (
        MailboxSender {
            shared: Arc::clone(&shared),
        },
        MailboxReceiver { shared },
    )
}

/// Producer half. Dropping it closes the mailbox; buffered items stay readable.
pub struct MailboxSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> MailboxSender<T> {
    /// Append an item without blocking.
    ///
    /// Returns the evicted oldest item when the buffer was full.
    pub fn push(&self, item: T) -> Result<Option<T>, Closed<T>> {
        let evicted = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(Closed(item));
            }
            let evicted = if state.queue.len() >= self.shared.capacity {
                state.queue.pop_front()
            } else {
                None
            };
            state.queue.push_back(item);
            evicted
        };
        if evicted.is_some() {
            self.shared.evicted.fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify.notify_one();
        Ok(evicted)
    }

    /// Close the mailbox; the receiver drains what is buffered, then ends.
    pub fn close(&self) {
        self.shared.close(false);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Total number of items evicted by overflow.
    pub fn evicted(&self) -> u64 {
        self.shared.evicted.load(Ordering::Relaxed)
    }
}

impl<T> Drop for MailboxSender<T> {
    fn drop(&mut self) {
        self.shared.close(false);
    }
}

impl<T> fmt::Debug for MailboxSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSender")
            .field("capacity", &self.shared.capacity)
            .finish_non_exhaustive()
    }
}

/// Consumer half.
pub struct MailboxReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> MailboxReceiver<T> {
    /// Wait for the oldest buffered item.
    ///
    /// Returns `None` once the mailbox is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a push between the check and
            // the await is not missed.
            notified.as_mut().enable();

            match self.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => {}
            }

            notified.await;
        }
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.shared.lock();
        match state.queue.pop_front() {
            Some(item) => Ok(item),
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Close the mailbox and discard anything buffered.
    pub fn close(&self) {
        self.shared.close(true);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Total number of items evicted by overflow.
    pub fn evicted(&self) -> u64 {
        self.shared.evicted.load(Ordering::Relaxed)
    }
}

impl<T> Drop for MailboxReceiver<T> {
    fn drop(&mut self) {
        self.shared.close(true);
    }
}

impl<T> fmt::Debug for MailboxReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxReceiver")
            .field("capacity", &self.shared.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
