use thiserror::Error;

use super::ids::{CacheIdentity, PageId, RequestId};

/// Failures of the engine API itself.
///
/// A page that cannot be cached is never an error: that outcome is a
/// [`NotRestoredReason`](super::NotRestoredReason) recorded as data. These
/// variants cover misuse of the API and collaborator failures.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Request {0} not found")]
    RequestNotFound(RequestId),

    #[error("Identity {0} is already stored")]
    DuplicateIdentity(CacheIdentity),

    #[error("Isolation violation: {0}")]
    IsolationViolation(String),

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Lifecycle event '{0}' already dispatched in this cycle")]
    DuplicateLifecycleEvent(String),

    #[error("Page {0} is frozen")]
    PageFrozen(PageId),

    #[error("Renderer error: {0}")]
    RendererError(String),

    #[error("Renderer did not acknowledge '{0}' in time")]
    RendererTimeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
