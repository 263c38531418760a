//! Concurrency and ordering tests for the store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{create_store, reducer, Action, Reducer, Subscription};

#[derive(Debug, Clone, Default, PartialEq)]
struct Tally {
    count: u64,
    followups: u64,
}

struct Bump;
struct FollowUp;

fn tally() -> Reducer<Tally> {
    reducer(|state: &Tally, action: &Action| {
        if action.is::<Bump>() {
            Tally {
                count: state.count + 1,
                ..state.clone()
            }
        } else if action.is::<FollowUp>() {
            Tally {
                followups: state.followups + 1,
                ..state.clone()
            }
        } else {
            state.clone()
        }
    })
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

fn counting(counter: &Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<()> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_lose_no_updates() {
    const TASKS: u64 = 8;
    const PER_TASK: u64 = 250;

    let store = create_store(tally(), Tally::default());
    let mut feed = store.subscribe_events();

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..PER_TASK {
                    store.dispatch(Action::new(Bump)).await.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.state().await.count, TASKS * PER_TASK);

    // Every transition was published once, in order, with the state it produced.
    for expected in 1..=TASKS * PER_TASK {
        let event = feed.recv().await.unwrap();
        assert_eq!(event.sequence, expected);
        assert_eq!(event.state.count, expected);
    }
    assert!(feed.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reads_after_dispatch_see_at_least_that_dispatch() {
    let store = create_store(tally(), Tally::default());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut last_seen = 0;
                for _ in 0..100 {
                    store.dispatch(Action::new(Bump)).await.unwrap();
                    let count = store.state().await.count;
                    assert!(count > last_seen, "read went backwards: {count} after {last_seen}");
                    last_seen = count;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(store.state().await.count, 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_listener_runs_once_per_dispatch() {
    let store = create_store(tally(), Tally::default());
    let counters: Vec<Arc<AtomicUsize>> = (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let mut subscriptions = Vec::new();
    for counter in &counters {
        subscriptions.push(store.subscribe(counting(counter)).await);
    }

    store.dispatch(Action::new(Bump)).await.unwrap();
    eventually(|| counters.iter().all(|c| c.load(Ordering::SeqCst) == 1)).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(counters.iter().all(|c| c.load(Ordering::SeqCst) == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsubscribing_during_notification_takes_effect_next_dispatch() {
    let store = create_store(tally(), Tally::default());
    let first_calls = Arc::new(AtomicUsize::new(0));
    let victim_calls = Arc::new(AtomicUsize::new(0));
    let sentinel_calls = Arc::new(AtomicUsize::new(0));
    let victim_slot: Arc<Mutex<Option<Subscription<Tally>>>> = Arc::new(Mutex::new(None));

    // Registered first, so it runs before the victim and removes it.
    let _first = store
        .subscribe({
            let calls = Arc::clone(&first_calls);
            let slot = Arc::clone(&victim_slot);
            move || {
                let calls = Arc::clone(&calls);
                let slot = Arc::clone(&slot);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let victim = slot.lock().unwrap().take();
                    if let Some(victim) = victim {
                        victim.unsubscribe().await;
                    }
                }
            }
        })
        .await;
    let victim = store.subscribe(counting(&victim_calls)).await;
    *victim_slot.lock().unwrap() = Some(victim);
    let _sentinel = store.subscribe(counting(&sentinel_calls)).await;

    store.dispatch(Action::new(Bump)).await.unwrap();
    eventually(|| sentinel_calls.load(Ordering::SeqCst) == 1).await;
    assert_eq!(victim_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.listener_count().await, 2);

    store.dispatch(Action::new(Bump)).await.unwrap();
    eventually(|| sentinel_calls.load(Ordering::SeqCst) == 2).await;
    assert_eq!(first_calls.load(Ordering::SeqCst), 2);
    assert_eq!(victim_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscribing_during_notification_waits_for_next_dispatch() {
    let store = create_store(tally(), Tally::default());
    let late_calls = Arc::new(AtomicUsize::new(0));
    let sentinel_calls = Arc::new(AtomicUsize::new(0));
    let late_subscription: Arc<Mutex<Option<Subscription<Tally>>>> = Arc::new(Mutex::new(None));

    let _subscriber = store
        .subscribe({
            let store = store.clone();
            let late_calls = Arc::clone(&late_calls);
            let slot = Arc::clone(&late_subscription);
            move || {
                let store = store.clone();
                let late_calls = Arc::clone(&late_calls);
                let slot = Arc::clone(&slot);
                async move {
                    if slot.lock().unwrap().is_some() {
                        return;
                    }
                    let subscription = store.subscribe(counting(&late_calls)).await;
                    *slot.lock().unwrap() = Some(subscription);
                }
            }
        })
        .await;
    let _sentinel = store.subscribe(counting(&sentinel_calls)).await;

    store.dispatch(Action::new(Bump)).await.unwrap();
    eventually(|| sentinel_calls.load(Ordering::SeqCst) == 1).await;
    eventually(|| late_subscription.lock().unwrap().is_some()).await;
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    store.dispatch(Action::new(Bump)).await.unwrap();
    eventually(|| late_calls.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listeners_may_dispatch() {
    let store = create_store(tally(), Tally::default());
    let _subscription = store
        .subscribe({
            let store = store.clone();
            move || {
                let store = store.clone();
                async move {
                    let state = store.state().await;
                    if state.count == 1 && state.followups == 0 {
                        store.dispatch(Action::new(FollowUp)).await.unwrap();
                    }
                }
            }
        })
        .await;

    tokio::time::timeout(Duration::from_secs(2), store.dispatch(Action::new(Bump)))
        .await
        .expect("nested dispatch deadlocked")
        .unwrap();

    let probe = store.clone();
    tokio::time::timeout(Duration::from_secs(2), async move {
        while probe.state().await.followups == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("follow-up never dispatched");
    assert_eq!(
        store.state().await,
        Tally {
            count: 1,
            followups: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_interleavings_stay_linearized() {
    let store = create_store(tally(), Tally::default());
    let dispatched = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..6u64)
        .map(|seed| {
            let store = store.clone();
            let dispatched = Arc::clone(&dispatched);
            tokio::spawn(async move {
                let mut rng = fastrand::Rng::with_seed(seed);
                let mut subscriptions = Vec::new();
                let mut last_seen = 0;
                for _ in 0..200 {
                    match rng.u8(0..10) {
                        0..=5 => {
                            store.dispatch(Action::new(Bump)).await.unwrap();
                            dispatched.fetch_add(1, Ordering::SeqCst);
                        }
                        6..=7 => {
                            let count = store.state().await.count;
                            assert!(count >= last_seen);
                            last_seen = count;
                        }
                        8 => subscriptions.push(store.subscribe(|| async {}).await),
                        _ => {
                            if !subscriptions.is_empty() {
                                let index = rng.usize(..subscriptions.len());
                                let subscription: Subscription<Tally> = subscriptions.swap_remove(index);
                                subscription.unsubscribe().await;
                            }
                        }
                    }
                    if rng.bool() {
                        tokio::task::yield_now().await;
                    }
                }
                subscriptions.len()
            })
        })
        .collect();

    let mut still_subscribed = 0;
    for handle in handles {
        still_subscribed += handle.await.unwrap();
    }

    assert_eq!(
        store.state().await.count,
        dispatched.load(Ordering::SeqCst) as u64
    );
    assert_eq!(store.listener_count().await, still_subscribed);
}
