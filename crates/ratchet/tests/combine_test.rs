//! Keyed reducer combination running inside a store.

use std::sync::Arc;

use ratchet_core::{
    combine_reducers, create_store, Action, CombineReducers, SliceMap, SliceReducer, StoreError,
};
use ratchet_testing::{ListenerProbe, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Default, PartialEq)]
struct Person {
    name: String,
    age: u32,
}

#[derive(Default)]
struct UpdatePerson {
    name: Option<&'static str>,
    age: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Text {
    value: String,
    length: usize,
}

struct UpdateText(&'static str);

fn person(state: &Arc<Person>, action: &Action) -> Arc<Person> {
    match action.downcast_ref::<UpdatePerson>() {
        Some(update) => Arc::new(Person {
            name: update.name.map_or_else(|| state.name.clone(), str::to_string),
            age: update.age.unwrap_or(state.age),
        }),
        None => Arc::clone(state),
    }
}

fn text(state: &Arc<Text>, action: &Action) -> Arc<Text> {
    match action.downcast_ref::<UpdateText>() {
        Some(UpdateText(value)) => Arc::new(Text {
            value: value.to_string(),
            length: value.len(),
        }),
        None => Arc::clone(state),
    }
}

#[tokio::test]
async fn combines_keyed_reducers_into_one_store() {
    let root = combine_reducers([
        ("person", SliceReducer::new(person)),
        ("text", SliceReducer::new(text)),
    ])
    .unwrap();
    let preloaded = SliceMap::new()
        .with("person", Person::default())
        .with("text", Text::default())
        .into_state();
    let store = create_store(root, preloaded);

    store
        .dispatch(Action::new(UpdatePerson {
            name: Some("Bob"),
            age: Some(42),
        }))
        .await
        .unwrap();
    store.dispatch(Action::new(UpdateText("Word"))).await.unwrap();

    let state = store.state().await;
    assert_eq!(
        state.get::<Person>("person"),
        Some(&Person {
            name: "Bob".to_string(),
            age: 42
        })
    );
    assert_eq!(
        state.get::<Text>("text"),
        Some(&Text {
            value: "Word".to_string(),
            length: 4
        })
    );
}

#[tokio::test]
async fn unrelated_actions_keep_the_same_state() {
    let root = CombineReducers::new()
        .slice("person", person)
        .slice("text", text)
        .build()
        .unwrap();
    let store = create_store(root, SliceMap::new().into_state());
    let before = store.state().await;

    store.dispatch(Action::new(UpdatePerson::default())).await.unwrap();
    let after_noop_update = store.state().await;
    assert!(!Arc::ptr_eq(&before, &after_noop_update));

    struct Unrelated;
    store.dispatch(Action::new(Unrelated)).await.unwrap();
    assert!(Arc::ptr_eq(&after_noop_update, &store.state().await));
}

#[tokio::test]
async fn listeners_fire_even_when_nothing_changed() {
    let root = CombineReducers::new().slice("text", text).build().unwrap();
    let store = create_store(root, SliceMap::new().into_state());
    let probe = ListenerProbe::new();
    let _subscription = store.subscribe(probe.listener()).await;

    struct Unrelated;
    store.dispatch(Action::new(Unrelated)).await.unwrap();
    probe.wait_for(1, DEFAULT_TIMEOUT).await.unwrap();
}

#[tokio::test]
async fn nested_combinations_compose() {
    let profile = CombineReducers::new().slice("person", person).build().unwrap();
    let root = CombineReducers::new()
        .reducer("profile", SliceReducer::from_reducer(profile))
        .slice("text", text)
        .build()
        .unwrap();
    let store = create_store(root, SliceMap::new().into_state());

    store
        .dispatch(Action::new(UpdatePerson {
            name: Some("Ann"),
            age: None,
        }))
        .await
        .unwrap();

    let state = store.state().await;
    let profile = state.get::<SliceMap>("profile").unwrap();
    assert_eq!(profile.get::<Person>("person").unwrap().name, "Ann");
    assert_eq!(state.get::<Text>("text"), Some(&Text::default()));
}

#[test]
fn duplicate_keys_are_rejected() {
    let err = CombineReducers::new()
        .slice("text", text)
        .slice("text", text)
        .build()
        .err()
        .expect("duplicate key accepted");
    assert!(matches!(err, StoreError::DuplicateKey { ref key } if key == "text"));
}
