//! Core value types: actions, events, and store identity.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::MiddlewareApi;

/// Actions the store dispatches on its own behalf.
///
/// Reducers see these like any other action and should answer them with
/// their default (or migrated) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Dispatched once when a store is created so that every reducer
    /// produces its initial state.
    Init,
    /// Dispatched right after `replace_reducer`. Reducers that existed in
    /// both the old and the new root receive their previous state, which
    /// populates the new tree with whatever is still relevant.
    Replace,
}

/// An opaque description of "what happened".
///
/// `Action` is a cheap, clonable handle over any `Send + Sync` value.
/// Reducers recover the concrete type with [`Action::downcast_ref`].
///
/// ```
/// use ratchet_core::Action;
///
/// #[derive(Debug, PartialEq)]
/// struct Increment(i64);
///
/// let action = Action::new(Increment(2));
/// assert_eq!(action.downcast_ref::<Increment>(), Some(&Increment(2)));
/// assert!(!action.is_callable());
/// ```
#[derive(Clone)]
pub struct Action {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    callable: bool,
}

impl Action {
    /// Wrap a plain data value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            payload: Arc::new(value),
            type_name: std::any::type_name::<T>(),
            callable: false,
        }
    }

    /// The reserved initialization action.
    pub fn init() -> Self {
        Self::new(ActionType::Init)
    }

    /// The reserved reducer-replacement action.
    pub fn replace() -> Self {
        Self::new(ActionType::Replace)
    }

    /// Wrap an asynchronous function as an action.
    ///
    /// The base store rejects callable actions with
    /// [`StoreError::InvalidAction`](crate::StoreError::InvalidAction);
    /// they only make sense behind [`ThunkMiddleware`](crate::ThunkMiddleware),
    /// which runs them with access to `dispatch` and `state`.
    pub fn thunk<S, F, Fut>(f: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(MiddlewareApi<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let run: ThunkFn<S> = Arc::new(move |api| Box::pin(f(api)));
        Self {
            payload: Arc::new(Thunk { run }),
            type_name: "thunk",
            callable: true,
        }
    }

    /// Whether this action wraps a function rather than data.
    pub fn is_callable(&self) -> bool {
        self.callable
    }

    /// Returns `true` if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    /// Borrow the payload as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// The reserved action this is, if any.
    pub fn reserved(&self) -> Option<ActionType> {
        self.downcast_ref::<ActionType>().copied()
    }

    /// Type name of the payload, for logs.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Two handles to the same dispatched payload.
    pub fn ptr_eq(&self, other: &Action) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.payload) as *const (),
            Arc::as_ptr(&other.payload) as *const (),
        )
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("type", &self.type_name)
            .field("callable", &self.callable)
            .finish()
    }
}

pub(crate) type ThunkFn<S> =
    Arc<dyn Fn(MiddlewareApi<S>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Payload of a callable action created by [`Action::thunk`].
pub(crate) struct Thunk<S> {
    pub(crate) run: ThunkFn<S>,
}

/// A transition that happened: the state it produced and the action that
/// caused it.
///
/// `sequence` numbers transitions since the store was created; the
/// initialization transition is `0`.
#[derive(Debug, Clone)]
pub struct Event<S> {
    pub state: S,
    pub action: Action,
    pub sequence: u64,
}

/// Unique identity of a store instance, carried in every log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(Uuid);

impl StoreId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
