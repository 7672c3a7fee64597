use crate::model::structures::season_state::SeasonState;
use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed rating or parameter. Caller bug, never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot transition season from {from} to {to} (allowed: [{}])", .allowed.iter().join(", "))]
    InvalidTransition {
        from: SeasonState,
        to: SeasonState,
        allowed: Vec<SeasonState>
    },

    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// The persisted version advanced since it was read. Re-read and retry.
    #[error("Concurrent write detected for {entity} {id} (expected version {expected}, found {actual})")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: u64,
        actual: u64
    },

    #[error("Storage failure: {0}")]
    Storage(String)
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string()
        }
    }

    pub fn invalid_transition(from: SeasonState, to: SeasonState) -> Self {
        EngineError::InvalidTransition {
            from,
            to,
            allowed: from.allowed_transitions().to_vec()
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Cache lock poisoned during {0}")]
    LockPoisoned(&'static str)
}

pub type EngineResult<T> = Result<T, EngineError>;
