//! Error types surfaced by the store and its utilities.

use thiserror::Error;

/// Every failure is local and synchronous to the caller; nothing is retried.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A callable value was dispatched where plain data was expected.
    #[error("actions must be plain data, got callable `{type_name}`; use middleware for async actions")]
    InvalidAction { type_name: &'static str },

    /// `dispatch` was called while the middleware chain was still being built.
    #[error("dispatching while constructing your middleware is not allowed")]
    ConstructionOrdering,

    /// Keyed reducer combination received the same key twice.
    #[error("combine_reducers requires all keys to be unique, `{key}` appears more than once")]
    DuplicateKey { key: String },

    /// A weak handle outlived every `Store` handle.
    #[error("store has been dropped")]
    StoreDropped,

    /// Failure raised by custom middleware or a thunk.
    #[error("middleware failed: {0}")]
    Middleware(#[source] anyhow::Error),
}

impl StoreError {
    /// Errors caused by how the caller used the API, as opposed to failures
    /// raised from inside user middleware.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidAction { .. }
                | StoreError::ConstructionOrdering
                | StoreError::DuplicateKey { .. }
        )
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
