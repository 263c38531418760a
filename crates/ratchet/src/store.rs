//! The store: one serialized owner of state, reducer and listeners.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::bus::{EventBus, Feed};
use crate::config::StoreConfig;
use crate::core::{Action, Event, StoreId};
use crate::error::{Result, StoreError};
use crate::listener::{self, ListenerEntry, Listeners, Subscription};
use crate::reducer::Reducer;

/// The dispatch entry point, as wrapped by middleware.
pub type Dispatch = Arc<dyn Fn(Action) -> BoxFuture<'static, Result<Action>> + Send + Sync>;

/// A store-construction function.
pub type StoreConstructor<S> = Arc<dyn Fn(Reducer<S>, S) -> Result<Store<S>> + Send + Sync>;

/// Wraps the store-construction function to add capabilities such as
/// middleware. Enhancers stack with [`compose`](crate::compose).
pub type StoreEnhancer<S> = Box<dyn Fn(StoreConstructor<S>) -> StoreConstructor<S> + Send + Sync>;

/// Everything guarded by the store's lock.
struct Core<S> {
    state: S,
    reducer: Reducer<S>,
    listeners: Listeners,
    sequence: u64,
}

pub(crate) struct Shared<S> {
    id: StoreId,
    name: Option<String>,
    core: Mutex<Core<S>>,
    bus: EventBus<S>,
    dispatch: RwLock<Dispatch>,
    next_listener_id: AtomicU64,
}

impl<S: Clone + Send + Sync + 'static> Shared<S> {
    pub(crate) fn live_dispatch(&self) -> Dispatch {
        Arc::clone(&self.dispatch.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) async fn state(&self) -> S {
        self.core.lock().await.state.clone()
    }

    /// The unwrapped dispatch: validate, then run the transition.
    async fn dispatch_base(self: Arc<Self>, action: Action) -> Result<Action> {
        if action.is_callable() {
            warn!(store = %self.id, action = action.type_name(), "rejected callable action");
            return Err(StoreError::InvalidAction {
                type_name: action.type_name(),
            });
        }
        self.spawn_transition(None, action.clone()).await;
        Ok(action)
    }

    /// Run a transition on its own task, so a caller that stops waiting
    /// cannot abandon it halfway through publishing.
    async fn spawn_transition(self: Arc<Self>, replacement: Option<Reducer<S>>, action: Action) {
        let handle = tokio::spawn(async move { self.transition(replacement, action).await });
        if let Err(err) = handle.await {
            if err.is_panic() {
                std::panic::resume_unwind(err.into_panic());
            }
        }
    }

    /// The critical section: reduce (through the replacement reducer, if
    /// any), publish, commit, snapshot listeners. The replacement is only
    /// installed once its reduction returned. Listeners run after the lock
    /// is released.
    async fn transition(&self, replacement: Option<Reducer<S>>, action: Action) {
        let (sequence, snapshot) = {
            let mut core = self.core.lock().await;
            let next = {
                let reducer = replacement.as_ref().unwrap_or(&core.reducer);
                reducer(&core.state, &action)
            };
            if let Some(reducer) = replacement {
                core.reducer = reducer;
            }
            core.sequence += 1;
            let sequence = core.sequence;

            self.bus.publish(Event {
                state: next.clone(),
                action: action.clone(),
                sequence,
            });

            core.state = next;
            (sequence, Arc::clone(&core.listeners))
        };

        debug!(
            store = %self.id,
            name = self.name.as_deref(),
            action = action.type_name(),
            sequence,
            listeners = snapshot.len(),
            "dispatched"
        );
        listener::notify(self.id, sequence, snapshot);
    }

    pub(crate) async fn remove_listener(&self, id: u64) {
        let mut core = self.core.lock().await;
        Arc::make_mut(&mut core.listeners).retain(|entry| entry.id != id);
    }
}

fn base_dispatch<S: Clone + Send + Sync + 'static>(store: Weak<Shared<S>>) -> Dispatch {
    Arc::new(move |action: Action| {
        let store = store.upgrade();
        async move {
            match store {
                Some(store) => store.dispatch_base(action).await,
                None => Err(StoreError::StoreDropped),
            }
        }
        .boxed()
    })
}

/// A serialized, observable state container.
///
/// `Store` is a handle: clones share the same state. All transitions are
/// linearized behind one lock, readers never see a half-applied
/// transition, and listeners run after the lock is released.
///
/// ```
/// use ratchet_core::{create_store, reducer, Action};
///
/// struct Increment;
///
/// # tokio_test_main(async {
/// let store = create_store(
///     reducer(|n: &u32, action: &Action| if action.is::<Increment>() { n + 1 } else { *n }),
///     0,
/// );
/// store.dispatch(Action::new(Increment)).await.unwrap();
/// assert_eq!(store.state().await, 1);
/// # });
/// # fn tokio_test_main(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct Store<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> std::fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl<S: Clone + Send + Sync + 'static> Store<S> {
    /// Start configuring a store.
    pub fn builder(reducer: Reducer<S>, preloaded: S) -> StoreBuilder<S> {
        StoreBuilder::new(reducer, preloaded)
    }

    /// Build the base store and apply `INIT`. Nobody can observe the store
    /// yet, so `INIT` needs neither the lock nor a notification.
    fn construct(reducer: Reducer<S>, preloaded: S, config: &StoreConfig) -> Self {
        let state = reducer(&preloaded, &Action::init());
        let id = StoreId::new();
        let shared = Arc::new_cyclic(|weak: &Weak<Shared<S>>| Shared {
            id,
            name: config.name.clone(),
            core: Mutex::new(Core {
                state,
                reducer,
                listeners: Listeners::default(),
                sequence: 0,
            }),
            bus: EventBus::new(config.feed_capacity),
            dispatch: RwLock::new(base_dispatch(weak.clone())),
            next_listener_id: AtomicU64::new(0),
        });
        debug!(store = %id, name = config.name.as_deref(), "store created");
        Self { shared }
    }

    pub fn id(&self) -> StoreId {
        self.shared.id
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name.as_deref()
    }

    /// Dispatch an action through the live entry point (including any
    /// middleware). Returns the action for convenience; middleware may
    /// return something else.
    pub async fn dispatch(&self, action: Action) -> Result<Action> {
        let dispatch = self.shared.live_dispatch();
        dispatch(action).await
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> S {
        self.shared.state().await
    }

    /// Snapshot of the current state, if no transition holds the lock.
    pub fn try_state(&self) -> Option<S> {
        self.shared
            .core
            .try_lock()
            .ok()
            .map(|core| core.state.clone())
    }

    /// Register a listener, invoked after every subsequent transition.
    ///
    /// A dispatch notifies exactly the listeners registered when its
    /// transition committed; subscribing or unsubscribing while listeners
    /// run takes effect from the next dispatch on.
    pub async fn subscribe<F, Fut>(&self, listener: F) -> Subscription<S>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.shared.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let entry = ListenerEntry {
            id,
            callback: Arc::new(move || listener().boxed()),
        };
        {
            let mut core = self.shared.core.lock().await;
            Arc::make_mut(&mut core.listeners).push(entry);
        }
        trace!(store = %self.shared.id, listener = id, "subscribed");
        Subscription::new(id, Arc::downgrade(&self.shared))
    }

    /// Swap the reducer and apply `REPLACE` through it, atomically.
    pub async fn replace_reducer(&self, next: Reducer<S>) -> &Self {
        Arc::clone(&self.shared)
            .spawn_transition(Some(next), Action::replace())
            .await;
        self
    }

    /// Open a feed of every event published from now on.
    pub fn subscribe_events(&self) -> Feed<S> {
        self.shared.bus.subscribe()
    }

    pub async fn listener_count(&self) -> usize {
        self.shared.core.lock().await.listeners.len()
    }

    pub fn feed_count(&self) -> usize {
        self.shared.bus.len()
    }

    /// Install a new live dispatch and return the previous one.
    ///
    /// Enhancer plumbing: [`apply_middleware`](crate::apply_middleware)
    /// uses it to guard construction and then install the composed chain.
    pub fn replace_dispatch(&self, dispatch: Dispatch) -> Dispatch {
        let mut live = self
            .shared
            .dispatch
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *live, dispatch)
    }

    /// The unwrapped dispatch, bypassing middleware.
    pub fn base_dispatch(&self) -> Dispatch {
        base_dispatch(Arc::downgrade(&self.shared))
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared<S>> {
        Arc::downgrade(&self.shared)
    }
}

/// Configures and builds a [`Store`].
pub struct StoreBuilder<S> {
    reducer: Reducer<S>,
    preloaded: S,
    config: StoreConfig,
    enhancer: Option<StoreEnhancer<S>>,
}

impl<S: Clone + Send + Sync + 'static> StoreBuilder<S> {
    pub fn new(reducer: Reducer<S>, preloaded: S) -> Self {
        Self {
            reducer,
            preloaded,
            config: StoreConfig::default(),
            enhancer: None,
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn enhancer(mut self, enhancer: StoreEnhancer<S>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Build the store, letting the enhancer (if any) wrap construction.
    pub fn build(self) -> Result<Store<S>> {
        let config = self.config;
        let base: StoreConstructor<S> =
            Arc::new(move |reducer: Reducer<S>, preloaded: S| -> Result<Store<S>> {
                Ok(Store::construct(reducer, preloaded, &config))
            });
        let create = match self.enhancer {
            Some(enhance) => enhance(base),
            None => base,
        };
        create(self.reducer, self.preloaded)
    }
}

/// Create a store with default configuration and no enhancer.
pub fn create_store<S>(reducer: Reducer<S>, preloaded: S) -> Store<S>
where
    S: Clone + Send + Sync + 'static,
{
    Store::construct(reducer, preloaded, &StoreConfig::default())
}

/// Create a store whose construction is wrapped by `enhancer`.
pub fn create_store_with<S>(
    reducer: Reducer<S>,
    preloaded: S,
    enhancer: StoreEnhancer<S>,
) -> Result<Store<S>>
where
    S: Clone + Send + Sync + 'static,
{
    StoreBuilder::new(reducer, preloaded).enhancer(enhancer).build()
}
