pub mod config;
pub mod metrics;
pub mod store;
pub mod workflow;

use thiserror::Error;

use crate::workflow::{Capability, StateId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid state value: {0} (must be between 1 and 4)")]
    InvalidStateValue(i64),
    #[error("{state} has no {capability} transition")]
    UnsupportedTransition {
        capability: Capability,
        state: StateId,
    },
    #[error("Transition table and {capability} successor disagree for {state}: {table} vs {successor}")]
    TransitionMismatch {
        capability: Capability,
        state: StateId,
        table: StateId,
        successor: StateId,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures of the store itself, as opposed to rejected requests.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Error::Persistence(_) | Error::Sqlx(_) | Error::Migrate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
