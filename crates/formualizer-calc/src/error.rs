//! Error types for registration, request validation and the worker pool.

use crate::engine::EngineError;
use thiserror::Error;

/// Failure while translating a request's symbols into the engine.
///
/// Display output is shown to callers, so it names user keys and table names only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("Failed to register variable '{key}': name collision")]
    DuplicateVariable { key: String },

    #[error("Failed to register variable '{key}'")]
    Variable { key: String, source: EngineError },

    #[error("Failed to register lookup table '{table}'")]
    Table { table: String, source: EngineError },

    #[error("Lookup tables '{other}' and '{table}' map to the same sheet name")]
    SheetCollision { table: String, other: String },

    #[error("Lookup table '{table}' uses a reserved sheet name")]
    ReservedSheet { table: String },

    #[error("Lookup table '{table}' has no usable characters in its name")]
    UnnamedTable { table: String },

    #[error("Lookup table '{table}' is too large")]
    TableTooLarge { table: String },
}

/// Request rejected before it reaches the pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("formula must be a non-empty string")]
    EmptyFormula,

    #[error(
        "Invalid variable name '{0}': variable names must start with a letter or underscore, and contain only letters, numbers, or underscores."
    )]
    InvalidVariableName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("worker queue full")]
    Busy,

    #[error("pool is draining and no longer accepts work")]
    Draining,

    #[error("worker exited before replying")]
    WorkerLost,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}
