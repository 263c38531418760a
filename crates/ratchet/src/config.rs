//! Store configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a store instance.
///
/// Deserializable so applications can keep it next to the rest of their
/// configuration; every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Label attached to the store's log lines.
    pub name: Option<String>,
    /// Per-feed event buffer. `None` buffers without bound; `Some(n)` holds
    /// at most `n` events per feed and disconnects a feed that is still
    /// full when the next event arrives.
    pub feed_capacity: Option<usize>,
}

impl StoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = Some(capacity);
        self
    }
}
