//! # Ratchet
//!
//! A serialized, observable state container: reducers decide, dispatch is
//! linearized, listeners and feeds observe.
//!
//! ## Core Concepts
//!
//! Ratchet separates **what happened** from **what the state is**:
//! - [`Action`] = What happened (opaque, immutable)
//! - [`Reducer`] = How state follows from it (pure `(state, action) -> state`)
//!
//! The key principle: **state only changes through `dispatch`**, one
//! transition at a time, and is replaced wholesale, never mutated in place.
//!
//! ## Architecture
//!
//! ```text
//! Caller (any task)
//!     │
//!     ▼ dispatch()
//! Middleware chain ── thunks, logging, ... ─────────┐
//!     │                                             │
//!     ▼ base dispatch                               │
//! ┌─────────── store lock ───────────┐              │
//! │ next = reducer(state, action)    │              │
//! │ publish Event(next, action) ─────┼──► Feed A    │
//! │                                  ├──► Feed B    │
//! │ state = next                     │              │
//! │ snapshot listeners               │              │
//! └──────────────────────────────────┘              │
//!     │                                             │
//!     ▼ spawned task                                │
//! listener 1, listener 2, ... ── may dispatch() ────┘
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Linearized transitions** - Concurrent dispatches never interleave
//! 2. **Torn-free reads** - `state()` never observes a half-applied transition
//! 3. **Snapshot notification** - A dispatch notifies exactly the listeners
//!    registered when its transition committed
//! 4. **Non-blocking listeners** - Listeners run after the lock is released;
//!    a slow listener never stalls the next dispatch
//! 5. **Independent feeds** - Each feed sees every event after it opened, in order;
//!    a bounded feed that falls behind is disconnected, never waited on
//!
//! ## Example
//!
//! ```ignore
//! use ratchet_core::{apply_middleware, reducer, Action, Middleware, Store, ThunkMiddleware};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Default)]
//! struct Counter { value: i64 }
//!
//! struct Increment(i64);
//!
//! let root = reducer(|state: &Counter, action: &Action| match action.downcast_ref::<Increment>() {
//!     Some(Increment(by)) => Counter { value: state.value + by },
//!     None => state.clone(),
//! });
//!
//! let middleware: Vec<Arc<dyn Middleware<Counter>>> = vec![Arc::new(ThunkMiddleware)];
//! let store = Store::builder(root, Counter::default())
//!     .enhancer(apply_middleware(middleware))
//!     .build()?;
//!
//! let mut feed = store.subscribe_events();
//! let subscription = store.subscribe(|| async { println!("changed") }).await;
//!
//! store.dispatch(Action::new(Increment(2))).await?;
//! assert_eq!(store.state().await.value, 2);
//! assert_eq!(feed.recv().await.unwrap().sequence, 1);
//!
//! subscription.unsubscribe().await;
//! ```
//!
//! ## What This Is Not
//!
//! Ratchet does not persist state, has no time travel or undo, and puts no
//! schema on state or actions.

// Core modules
mod bus;
mod combine;
mod compose;
mod config;
mod core;
mod error;
mod listener;
mod middleware;
mod reducer;
mod store;

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export core types
pub use crate::core::{Action, ActionType, Event, StoreId};

// Re-export error types
pub use crate::error::{Result, StoreError};

// Re-export reducer utilities
pub use combine::{combine_reducers, CombineReducers, CombinedState, Slice, SliceMap, SliceReducer};
pub use compose::compose;
pub use reducer::{reduce_reducers, reducer, Reducer};

// Re-export store types
pub use bus::Feed;
pub use config::StoreConfig;
pub use listener::Subscription;
pub use store::{
    create_store, create_store_with, Dispatch, Store, StoreBuilder, StoreConstructor, StoreEnhancer,
};

// Re-export middleware types
pub use middleware::{apply_middleware, LoggingMiddleware, Middleware, MiddlewareApi, ThunkMiddleware};

// Re-export commonly used external types
pub use async_trait::async_trait;
