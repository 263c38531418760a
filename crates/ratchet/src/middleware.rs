//! Dispatch-wrapping middleware.
//!
//! [`apply_middleware`] builds a [`StoreEnhancer`]: it creates the base
//! store, guards `dispatch` while the chain is assembled, lets every
//! middleware attach, composes the layers right to left around the base
//! dispatch, and installs the result as the store's live dispatch.
//!
//! ```text
//! store.dispatch(a)
//!     │
//!     ▼
//! first.handle(a, next) ──► second.handle(a, next) ──► base dispatch
//!                                                         │
//!                                                         ▼
//!                                              reduce, publish, notify
//! ```

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::compose::compose;
use crate::core::{Action, StoreId, Thunk};
use crate::error::{Result, StoreError};
use crate::reducer::Reducer;
use crate::store::{Dispatch, Shared, Store, StoreConstructor, StoreEnhancer};

/// What a middleware sees of the store.
///
/// Holds the store weakly; once every [`Store`] handle is gone its
/// operations fail with [`StoreError::StoreDropped`].
pub struct MiddlewareApi<S> {
    id: StoreId,
    store: Weak<Shared<S>>,
}

impl<S> Clone for MiddlewareApi<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            store: Weak::clone(&self.store),
        }
    }
}

impl<S: Clone + Send + Sync + 'static> MiddlewareApi<S> {
    pub(crate) fn new(store: &Store<S>) -> Self {
        Self {
            id: store.id(),
            store: store.downgrade(),
        }
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    /// Dispatch through the whole live chain, starting at the first
    /// middleware.
    pub async fn dispatch(&self, action: Action) -> Result<Action> {
        let store = self.store.upgrade().ok_or(StoreError::StoreDropped)?;
        let dispatch = store.live_dispatch();
        drop(store);
        dispatch(action).await
    }

    pub async fn state(&self) -> Result<S> {
        let store = self.store.upgrade().ok_or(StoreError::StoreDropped)?;
        Ok(store.state().await)
    }
}

/// An interceptor around the dispatch entry point.
///
/// `handle` receives every action dispatched through the store and the
/// `next` step of the chain; it may pass the action on, transform it,
/// swallow it, or dispatch others.
#[async_trait]
pub trait Middleware<S: Clone + Send + Sync + 'static>: Send + Sync + 'static {
    /// Called once while the chain is assembled. Dispatching from here
    /// fails with [`StoreError::ConstructionOrdering`].
    fn attach(&self, _api: &MiddlewareApi<S>) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, api: &MiddlewareApi<S>, action: Action, next: Dispatch) -> Result<Action>;
}

type DispatchLayer = Box<dyn Fn(Dispatch) -> Dispatch + Send + Sync>;

fn construction_guard() -> Dispatch {
    Arc::new(|_action: Action| futures::future::ready(Err(StoreError::ConstructionOrdering)).boxed())
}

fn layer<S: Clone + Send + Sync + 'static>(
    middleware: Arc<dyn Middleware<S>>,
    api: MiddlewareApi<S>,
) -> DispatchLayer {
    Box::new(move |next: Dispatch| -> Dispatch {
        let middleware = Arc::clone(&middleware);
        let api = api.clone();
        Arc::new(move |action: Action| {
            let middleware = Arc::clone(&middleware);
            let api = api.clone();
            let next = Arc::clone(&next);
            async move { middleware.handle(&api, action, next).await }.boxed()
        })
    })
}

/// Build an enhancer that wraps the store's dispatch with `middlewares`,
/// the first one outermost.
pub fn apply_middleware<S>(middlewares: Vec<Arc<dyn Middleware<S>>>) -> StoreEnhancer<S>
where
    S: Clone + Send + Sync + 'static,
{
    let middlewares: Arc<[Arc<dyn Middleware<S>>]> = middlewares.into();
    Box::new(move |create: StoreConstructor<S>| -> StoreConstructor<S> {
        let middlewares = Arc::clone(&middlewares);
        Arc::new(move |reducer: Reducer<S>, preloaded: S| -> Result<Store<S>> {
            let store = create(reducer, preloaded)?;
            let base = store.replace_dispatch(construction_guard());

            let api = MiddlewareApi::new(&store);
            for middleware in middlewares.iter() {
                middleware.attach(&api)?;
            }

            let layers: Vec<DispatchLayer> = middlewares
                .iter()
                .map(|middleware| layer(Arc::clone(middleware), api.clone()))
                .collect();
            store.replace_dispatch(compose(layers)(base));
            debug!(store = %store.id(), middlewares = middlewares.len(), "middleware applied");
            Ok(store)
        })
    })
}

/// Logs every action and its outcome at debug level.
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware;

#[async_trait]
impl<S: Clone + Send + Sync + 'static> Middleware<S> for LoggingMiddleware {
    async fn handle(&self, api: &MiddlewareApi<S>, action: Action, next: Dispatch) -> Result<Action> {
        let action_type = action.type_name();
        debug!(store = %api.id(), action = action_type, "dispatching");
        let outcome = next(action).await;
        match &outcome {
            Ok(_) => debug!(store = %api.id(), action = action_type, "dispatch complete"),
            Err(e) => warn!(store = %api.id(), action = action_type, error = %e, "dispatch failed"),
        }
        outcome
    }
}

/// Runs callable actions built with [`Action::thunk`] instead of passing
/// them on; plain actions go to `next` untouched.
///
/// A thunk receives a [`MiddlewareApi`] and may dispatch and read state.
/// Its error, if any, is returned as [`StoreError::Middleware`].
#[derive(Debug, Clone, Default)]
pub struct ThunkMiddleware;

#[async_trait]
impl<S: Clone + Send + Sync + 'static> Middleware<S> for ThunkMiddleware {
    async fn handle(&self, api: &MiddlewareApi<S>, action: Action, next: Dispatch) -> Result<Action> {
        let run = match action.downcast_ref::<Thunk<S>>() {
            Some(thunk) => Arc::clone(&thunk.run),
            None => return next(action).await,
        };
        run(api.clone()).await.map_err(StoreError::Middleware)?;
        Ok(action)
    }
}
