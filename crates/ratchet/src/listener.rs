//! Change listeners and their subscription handles.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{error, trace};

use crate::core::StoreId;
use crate::store::Shared;

pub(crate) type ListenerFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub(crate) id: u64,
    pub(crate) callback: ListenerFn,
}

/// Registered listeners in insertion order.
///
/// A dispatch snapshots the `Arc`; registrations go through
/// [`Arc::make_mut`], which copies the list only while a snapshot of it is
/// still being notified.
pub(crate) type Listeners = Arc<Vec<ListenerEntry>>;

/// Run every listener of `snapshot` on a task of its own.
///
/// Listeners run one after another in registration order. A panicking
/// listener is logged and the rest still run.
pub(crate) fn notify(store: StoreId, sequence: u64, snapshot: Listeners) {
    if snapshot.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for entry in snapshot.iter() {
            let outcome = AssertUnwindSafe(async { (entry.callback)().await })
                .catch_unwind()
                .await;
            if outcome.is_err() {
                error!(store = %store, listener = entry.id, sequence, "listener panicked");
            }
        }
    });
}

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe).
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
pub struct Subscription<S> {
    id: u64,
    active: AtomicBool,
    store: Weak<Shared<S>>,
}

impl<S: Clone + Send + Sync + 'static> Subscription<S> {
    pub(crate) fn new(id: u64, store: Weak<Shared<S>>) -> Self {
        Self {
            id,
            active: AtomicBool::new(true),
            store,
        }
    }

    /// Remove the listener from every dispatch that has not yet taken its
    /// snapshot. Calling this again does nothing.
    pub async fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(store) = self.store.upgrade() {
            store.remove_listener(self.id).await;
        }
        trace!(listener = self.id, "unsubscribed");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl<S> std::fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.load(Ordering::Acquire))
            .finish()
    }
}
