//! Host-side error types.
//!
//! Per the error handling design, nothing from a *script* ever escapes as a
//! Rust `Result` — compile failures, thrown exceptions, OOM, and
//! cancellation are all represented as tagged [`crate::value::Value`]s
//! delivered through the normal result path (see `ops::eval`). `HostError`
//! is reserved for the boundary failures a client cannot recover from by
//! inspecting a tag: a poisoned lock, a channel disconnect, or a core-level
//! engine error that happened outside any script (e.g. context creation).

use thiserror::Error;

pub use hostjs_core::EngineError as CoreError;

#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The owner thread is gone (panicked or already shut down) so the
    /// submitted task's result will never arrive.
    #[error("owner thread is no longer running")]
    OwnerThreadGone,

    /// A task handle or internal lock observed an inconsistent state;
    /// indicates a programmer error in this crate, not client misuse.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl HostError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_json::Error> for HostError {
    fn from(e: serde_json::Error) -> Self {
        Self::Core(CoreError::JsonError(e))
    }
}

pub type HostResult<T> = Result<T, HostError>;
