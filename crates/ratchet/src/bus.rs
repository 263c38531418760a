//! Fan-out of transition events to independently positioned feeds.
//!
//! Every feed owns its own queue. A feed only sees events published after it
//! was opened, in publication order, and dropping it releases its slot right
//! away.
//!
//! Publishing never waits. A bounded feed whose buffer is full when an event
//! arrives is disconnected instead: it keeps the events it already holds,
//! then ends, and [`Feed::lagged`] reports why.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures::Stream;
use smallvec::SmallVec;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use crate::core::Event;

enum FeedSender<S> {
    Unbounded(mpsc::UnboundedSender<Event<S>>),
    Bounded {
        tx: mpsc::Sender<Event<S>>,
        lagged: Arc<AtomicBool>,
    },
}

enum Delivery {
    Delivered,
    Closed,
    Lagged,
}

impl<S: Clone> FeedSender<S> {
    fn deliver(&self, event: &Event<S>) -> Delivery {
        match self {
            FeedSender::Unbounded(tx) => match tx.send(event.clone()) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            },
            FeedSender::Bounded { tx, lagged } => match tx.try_send(event.clone()) {
                Ok(()) => Delivery::Delivered,
                Err(TrySendError::Closed(_)) => Delivery::Closed,
                Err(TrySendError::Full(_)) => {
                    lagged.store(true, Ordering::Release);
                    Delivery::Lagged
                }
            },
        }
    }
}

enum FeedReceiver<S> {
    Unbounded(mpsc::UnboundedReceiver<Event<S>>),
    Bounded(mpsc::Receiver<Event<S>>),
}

type Registry<S> = DashMap<u64, FeedSender<S>>;

pub(crate) struct EventBus<S> {
    feeds: Arc<Registry<S>>,
    next_id: AtomicU64,
    capacity: Option<usize>,
}

impl<S: Clone + Send + 'static> EventBus<S> {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            feeds: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            capacity,
        }
    }

    pub(crate) fn subscribe(&self) -> Feed<S> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let lagged = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = match self.capacity {
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (FeedSender::Unbounded(tx), FeedReceiver::Unbounded(rx))
            }
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity.max(1));
                let sender = FeedSender::Bounded {
                    tx,
                    lagged: Arc::clone(&lagged),
                };
                (sender, FeedReceiver::Bounded(rx))
            }
        };
        self.feeds.insert(id, sender);
        trace!(feed = id, "feed opened");

        Feed {
            id,
            receiver,
            lagged,
            registry: Arc::downgrade(&self.feeds),
        }
    }

    /// Deliver `event` to every open feed without waiting.
    ///
    /// Feeds that are gone, or bounded feeds with no room left, are removed
    /// from the registry.
    pub(crate) fn publish(&self, event: Event<S>) {
        let mut dropped: SmallVec<[(u64, Delivery); 4]> = SmallVec::new();
        for entry in self.feeds.iter() {
            match entry.value().deliver(&event) {
                Delivery::Delivered => {}
                outcome => dropped.push((*entry.key(), outcome)),
            }
        }

        // Removal takes a shard write lock, so only after iteration ends.
        for (id, outcome) in dropped {
            match outcome {
                Delivery::Lagged => {
                    warn!(feed = id, sequence = event.sequence, "disconnecting lagging feed")
                }
                _ => warn!(feed = id, sequence = event.sequence, "pruning closed feed"),
            }
            self.feeds.remove(&id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.feeds.len()
    }
}

/// An independent subscription to a store's event stream.
///
/// Obtained from [`Store::subscribe_events`](crate::Store::subscribe_events).
/// Also usable as a [`Stream`] of events.
pub struct Feed<S> {
    id: u64,
    receiver: FeedReceiver<S>,
    lagged: Arc<AtomicBool>,
    registry: Weak<Registry<S>>,
}

impl<S> Feed<S> {
    /// Wait for the next event. Returns `None` once the store is gone and
    /// the buffer is drained.
    pub async fn recv(&mut self) -> Option<Event<S>> {
        match &mut self.receiver {
            FeedReceiver::Unbounded(rx) => rx.recv().await,
            FeedReceiver::Bounded(rx) => rx.recv().await,
        }
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event<S>> {
        match &mut self.receiver {
            FeedReceiver::Unbounded(rx) => rx.try_recv().ok(),
            FeedReceiver::Bounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Whether the store disconnected this feed because its buffer was full.
    /// Events received before that point are still delivered in order.
    pub fn lagged(&self) -> bool {
        self.lagged.load(Ordering::Acquire)
    }

    /// Stop deliveries and free the buffer. Same as dropping the feed.
    pub fn close(self) {}
}

impl<S> Drop for Feed<S> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
            trace!(feed = self.id, "feed closed");
        }
    }
}

impl<S> Stream for Feed<S> {
    type Item = Event<S>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match &mut self.get_mut().receiver {
            FeedReceiver::Unbounded(rx) => rx.poll_recv(cx),
            FeedReceiver::Bounded(rx) => rx.poll_recv(cx),
        }
    }
}
