// src/error.rs
// Error taxonomy for the classification and routing core (see spec §7).

use thiserror::Error;

/// Core error type returned by the synchronous API surface.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Caller violated an input constraint (empty body, malformed email). Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// All backends for a modality are dead and no fallback is available.
    #[error("classification error: {0}")]
    ClassificationError(String),

    /// Attempted to record a result for an already-processed inquiry.
    /// Callers should treat this as success (idempotent retry).
    #[error("inquiry {0} already processed")]
    PersistenceConflict(uuid::Uuid),

    /// Transient store error. Retried at the drain level via `processing_attempts`.
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] sqlx::Error),

    /// Per-inquiry or drain-invocation deadline exceeded.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("routing rules error: {0}")]
    RoutingRules(String),
}

impl CoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn classification(msg: impl Into<String>) -> Self {
        Self::ClassificationError(msg.into())
    }

    pub fn routing_rules(msg: impl Into<String>) -> Self {
        Self::RoutingRules(msg.into())
    }
}

/// Internal signal from a learned backend. Consumed by the Predictor Host; never
/// surfaced outside it (see spec §4.5, §7).
#[derive(Error, Debug, Clone)]
pub enum ModelUnavailable {
    #[error("model not present: {0}")]
    NotPresent(String),
    #[error("load timeout after {0:?}")]
    LoadTimeout(std::time::Duration),
    #[error("out of memory loading model: {0}")]
    OutOfMemory(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
