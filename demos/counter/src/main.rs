//! Counter demo: a store behind logging and thunk middleware, one listener
//! and one event feed.
//!
//! Run with `RUST_LOG=debug` to see the store's own tracing.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use ratchet_core::{
    apply_middleware, reducer, Action, LoggingMiddleware, Middleware, MiddlewareApi, Reducer, Store,
    StoreConfig, ThunkMiddleware,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default)]
struct Counter {
    value: i64,
    history: Vec<i64>,
}

#[derive(Debug)]
enum CounterAction {
    Add(i64),
    Reset,
}

fn counter() -> Reducer<Counter> {
    reducer(|state: &Counter, action: &Action| {
        match action.downcast_ref::<CounterAction>() {
            Some(CounterAction::Add(by)) => {
                let mut history = state.history.clone();
                history.push(state.value);
                Counter {
                    value: state.value + by,
                    history,
                }
            }
            Some(CounterAction::Reset) => Counter::default(),
            None => state.clone(),
        }
    })
}

/// Adds `by` after a short delay, then again if the total is still odd.
fn add_later(by: i64) -> Action {
    Action::thunk(move |api: MiddlewareApi<Counter>| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        api.dispatch(Action::new(CounterAction::Add(by))).await?;
        if api.state().await?.value % 2 != 0 {
            api.dispatch(Action::new(CounterAction::Add(by))).await?;
        }
        anyhow::Ok(())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let middleware: Vec<Arc<dyn Middleware<Counter>>> = vec![Arc::new(LoggingMiddleware), Arc::new(ThunkMiddleware)];
    let store = Store::builder(counter(), Counter::default())
        .config(StoreConfig::named("counter"))
        .enhancer(apply_middleware(middleware))
        .build()?;

    let subscription = store
        .subscribe({
            let store = store.clone();
            move || {
                let store = store.clone();
                async move {
                    let state = store.state().await;
                    info!(value = state.value, "counter changed");
                }
            }
        })
        .await;

    let feed = store.subscribe_events();
    let watcher = tokio::spawn(
        feed.take(5)
            .for_each(|event| async move {
                info!(sequence = event.sequence, action = event.action.type_name(), value = event.state.value, "event");
            }),
    );

    store.dispatch(Action::new(CounterAction::Add(2))).await?;
    store.dispatch(add_later(3)).await?;
    store.dispatch(Action::new(CounterAction::Reset)).await?;
    store.dispatch(Action::new(CounterAction::Add(1))).await?;

    watcher.await?;
    subscription.unsubscribe().await;

    let state = store.state().await;
    info!(value = state.value, history = ?state.history, "done");
    Ok(())
}
