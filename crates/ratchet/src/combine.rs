//! Keyed reducer combination over a map-shaped state.
//!
//! Each key owns one slice of the state and one reducer for it. Slices are
//! reference counted and compared by pointer: a slice reducer signals "no
//! change" by handing back the `Arc` it was given. When every slice comes
//! back unchanged the combined reducer returns the previous map itself, so
//! callers upstream can detect changes with [`Arc::ptr_eq`].

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::core::Action;
use crate::error::{Result, StoreError};
use crate::reducer::Reducer;

/// One entry of a [`SliceMap`]; compared by identity, never by value.
#[derive(Clone)]
pub struct Slice(Arc<dyn Any + Send + Sync>);

impl Slice {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self(value)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Recover the typed `Arc`, sharing the same allocation.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &Slice) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slice({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Map-shaped state produced by [`combine_reducers`].
#[derive(Debug, Clone, Default)]
pub struct SliceMap {
    slices: BTreeMap<String, Slice>,
}

/// The state type a combined reducer operates on.
pub type CombinedState = Arc<SliceMap>;

impl SliceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for preloaded state.
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.slices.insert(key.into(), Slice::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.slices.get(key).and_then(Slice::downcast_ref)
    }

    pub fn slice(&self, key: &str) -> Option<&Slice> {
        self.slices.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slices.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Wrap as the shared state a combined reducer expects.
    pub fn into_state(self) -> CombinedState {
        Arc::new(self)
    }
}

type ErasedSliceReducer = Arc<dyn Fn(Option<&Slice>, &Action) -> Slice + Send + Sync>;

/// A type-erased reducer for a single key.
#[derive(Clone)]
pub struct SliceReducer {
    reduce: ErasedSliceReducer,
}

impl SliceReducer {
    /// Erase a typed slice reducer.
    ///
    /// A slice that is missing, or holds some other type, is seeded with
    /// `T::default()` before the reducer runs.
    pub fn new<T, F>(f: F) -> Self
    where
        T: Default + Send + Sync + 'static,
        F: Fn(&Arc<T>, &Action) -> Arc<T> + Send + Sync + 'static,
    {
        Self {
            reduce: Arc::new(move |current, action| {
                let current = current
                    .and_then(Slice::downcast::<T>)
                    .unwrap_or_else(|| Arc::new(T::default()));
                Slice::from_arc(f(&current, action))
            }),
        }
    }

    /// Use a reducer over `Arc<T>` (including another combined reducer) as a slice.
    pub fn from_reducer<T>(reducer: Reducer<Arc<T>>) -> Self
    where
        T: Default + Send + Sync + 'static,
    {
        Self::new(move |state: &Arc<T>, action: &Action| reducer(state, action))
    }
}

impl fmt::Debug for SliceReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceReducer").finish_non_exhaustive()
    }
}

/// Fold `(key, reducer)` pairs into one reducer over a [`SliceMap`].
///
/// Fails with [`StoreError::DuplicateKey`] if a key repeats.
pub fn combine_reducers<K, I>(pairs: I) -> Result<Reducer<CombinedState>>
where
    K: Into<String>,
    I: IntoIterator<Item = (K, SliceReducer)>,
{
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for (key, reducer) in pairs {
        let key = key.into();
        if !seen.insert(key.clone()) {
            return Err(StoreError::DuplicateKey { key });
        }
        entries.push((key, reducer));
    }

    Ok(Arc::new(move |state: &CombinedState, action: &Action| {
        let mut next = BTreeMap::new();
        let mut changed = false;
        for (key, reducer) in &entries {
            let previous = state.slices.get(key);
            let slice = (reducer.reduce)(previous, action);
            changed |= previous.map_or(true, |previous| !previous.ptr_eq(&slice));
            next.insert(key.clone(), slice);
        }
        // Keys without a reducer are dropped from the next state.
        changed |= next.len() != state.slices.len();

        if changed {
            Arc::new(SliceMap { slices: next })
        } else {
            Arc::clone(state)
        }
    }))
}

/// Builder over [`combine_reducers`].
///
/// ```
/// use std::sync::Arc;
/// use ratchet_core::{Action, CombineReducers, SliceMap};
///
/// let root = CombineReducers::new()
///     .slice("clicks", |n: &Arc<u32>, _action: &Action| Arc::new(**n + 1))
///     .slice("label", |s: &Arc<String>, _action: &Action| Arc::clone(s))
///     .build()
///     .unwrap();
///
/// let state = root(&SliceMap::new().into_state(), &Action::init());
/// assert_eq!(state.get::<u32>("clicks"), Some(&1));
/// assert_eq!(state.get::<String>("label"), Some(&String::new()));
/// ```
#[derive(Debug, Default)]
pub struct CombineReducers {
    entries: Vec<(String, SliceReducer)>,
}

impl CombineReducers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slice<T, F>(self, key: impl Into<String>, f: F) -> Self
    where
        T: Default + Send + Sync + 'static,
        F: Fn(&Arc<T>, &Action) -> Arc<T> + Send + Sync + 'static,
    {
        self.reducer(key, SliceReducer::new(f))
    }

    pub fn reducer(mut self, key: impl Into<String>, reducer: SliceReducer) -> Self {
        self.entries.push((key.into(), reducer));
        self
    }

    pub fn build(self) -> Result<Reducer<CombinedState>> {
        combine_reducers(self.entries)
    }
}
