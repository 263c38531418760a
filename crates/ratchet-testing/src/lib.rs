//! Testing utilities for Ratchet stores.
//!
//! Listeners run on their own task after `dispatch` returns, so tests
//! observe them by waiting, not by asserting right away:
//!
//! ```ignore
//! let probe = ListenerProbe::new();
//! let _subscription = store.subscribe(probe.listener()).await;
//!
//! store.dispatch(Action::new(Increment)).await?;
//! probe.wait_for(1, DEFAULT_TIMEOUT).await?;
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::future::{ready, Ready};
use ratchet_core::{Action, Dispatch, Event, Feed, Middleware, MiddlewareApi, Store};
use tokio::sync::watch;

/// How long helpers wait before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Counts listener invocations and lets tests wait for them.
#[derive(Clone)]
pub struct ListenerProbe {
    count: Arc<watch::Sender<usize>>,
}

impl ListenerProbe {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// A listener to pass to [`Store::subscribe`].
    pub fn listener(&self) -> impl Fn() -> Ready<()> + Send + Sync + 'static {
        let count = Arc::clone(&self.count);
        move || {
            count.send_modify(|n| *n += 1);
            ready(())
        }
    }

    /// Invocations so far.
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until the listener has run at least `n` times.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> anyhow::Result<()> {
        let mut seen = self.count.subscribe();
        let reached = async move { seen.wait_for(|count| *count >= n).await.map(|_| ()) };
        tokio::time::timeout(timeout, reached)
            .await
            .map_err(|_| anyhow!("expected {n} notifications within {timeout:?}, saw {}", self.count()))?
            .context("probe closed")
    }
}

impl Default for ListenerProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Middleware that records every action passing through it, then passes
/// it on unchanged.
#[derive(Clone, Default)]
pub struct ActionRecorder {
    actions: Arc<Mutex<Vec<Action>>>,
}

impl ActionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn recorded_types(&self) -> Vec<&'static str> {
        self.actions().iter().map(Action::type_name).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[async_trait]
impl<S: Clone + Send + Sync + 'static> Middleware<S> for ActionRecorder {
    async fn handle(
        &self,
        _api: &MiddlewareApi<S>,
        action: Action,
        next: Dispatch,
    ) -> ratchet_core::Result<Action> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action.clone());
        next(action).await
    }
}

/// Receive exactly `n` events from `feed`, failing if they do not all
/// arrive within `timeout`.
pub async fn collect_events<S>(
    feed: &mut Feed<S>,
    n: usize,
    timeout: Duration,
) -> anyhow::Result<Vec<Event<S>>> {
    let collect = async {
        let mut events = Vec::with_capacity(n);
        while events.len() < n {
            match feed.recv().await {
                Some(event) => events.push(event),
                None => break,
            }
        }
        events
    };
    let events = tokio::time::timeout(timeout, collect)
        .await
        .map_err(|_| anyhow!("expected {n} events within {timeout:?}"))?;
    if events.len() < n {
        anyhow::bail!("feed closed after {} of {n} events", events.len());
    }
    Ok(events)
}

/// Poll the store until its state satisfies `predicate`.
pub async fn wait_for_state<S, P>(store: &Store<S>, predicate: P, timeout: Duration) -> anyhow::Result<S>
where
    S: Clone + Send + Sync + 'static,
    P: Fn(&S) -> bool,
{
    let poll = async {
        loop {
            let state = store.state().await;
            if predicate(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| anyhow!("store state did not settle within {timeout:?}"))
}
