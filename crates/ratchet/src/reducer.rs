//! Transition functions and sequential folding.

use std::sync::Arc;

use crate::core::Action;

/// A pure transition `(state, action) -> next state`.
///
/// The store never mutates state in place; the reducer returns the value
/// that replaces it wholesale.
pub type Reducer<S> = Arc<dyn Fn(&S, &Action) -> S + Send + Sync>;

/// Box a closure as a [`Reducer`].
pub fn reducer<S, F>(f: F) -> Reducer<S>
where
    F: Fn(&S, &Action) -> S + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Thread one state through several reducers, in order.
///
/// Each reducer consumes the previous one's output. An empty list yields
/// the identity reducer.
pub fn reduce_reducers<S, I>(reducers: I) -> Reducer<S>
where
    S: Clone + 'static,
    I: IntoIterator<Item = Reducer<S>>,
{
    let reducers: Vec<Reducer<S>> = reducers.into_iter().collect();
    Arc::new(move |state: &S, action: &Action| {
        let mut reducers = reducers.iter();
        let Some(first) = reducers.next() else {
            return state.clone();
        };
        reducers.fold(first(state, action), |acc, next| next(&acc, action))
    })
}
