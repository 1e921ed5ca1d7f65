//! Error types shared by the pool, the scene host and configuration loading.
//!
//! The public pool surface never returns these directly: acquire/return
//! collapse them into `Option` / `bool` after logging. Internal helpers and
//! configuration loading propagate them with `?`.

/// Errors that can occur while managing pooled actors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Handle failed its validity check or the actor was reclaimed
    InvalidObject,
    /// Actor class does not match the pool's class
    WrongClass {
        /// Class the pool manages
        expected: String,
        /// Class of the offending actor
        found: String,
    },
    /// Pool was never successfully constructed
    NotInitialised,
    /// The world refused to spawn an actor
    ConstructionFailed(String),
    /// The world refused to complete construction of an actor
    ActivationFailed(String),
    /// Pool exceeded its hard limit (informational)
    Overflow {
        /// Configured hard limit
        limit: usize,
        /// Pool size when the limit was crossed
        size: usize,
    },
    /// A lifecycle handler reported a failure
    HandlerFailed(String),
    /// Re-entrant use of a pool or handler on the same thread
    Contention(String),
    /// Invalid or unparsable configuration
    Config(String),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidObject => write!(f, "Invalid or reclaimed actor"),
            Self::WrongClass { expected, found } => {
                write!(f, "Wrong actor class: expected {expected}, found {found}")
            }
            Self::NotInitialised => write!(f, "Pool is not initialised"),
            Self::ConstructionFailed(e) => write!(f, "Construction failed: {e}"),
            Self::ActivationFailed(e) => write!(f, "Activation failed: {e}"),
            Self::Overflow { limit, size } => {
                write!(f, "Pool size {size} reached hard limit {limit}")
            }
            Self::HandlerFailed(e) => write!(f, "Lifecycle handler failed: {e}"),
            Self::Contention(e) => write!(f, "Contention: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Result alias used throughout the crate
pub type PoolResult<T> = Result<T, PoolError>;
