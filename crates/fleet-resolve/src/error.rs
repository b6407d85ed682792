//! Resolve-cycle error types.
//!
//! Only failures that abort a whole cycle live here. Per-pair failures are
//! [`fleet_state::ResolveError`] values inside the cycle's log.

use fleet_state::QueryError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ResolveCycleError {
    #[error("{phase}: {source}")]
    Phase {
        phase: &'static str,
        #[source]
        source: QueryError,
    },

    #[error("reading state: {0}")]
    ReadState(#[source] QueryError),

    #[error("resolve cycle cancelled")]
    Cancelled,

    #[error("resolve task aborted: {0}")]
    Aborted(String),
}

impl ResolveCycleError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveCycleError::Phase { source, .. } | ResolveCycleError::ReadState(source) => {
                source.retryable
            }
            ResolveCycleError::Cancelled | ResolveCycleError::Aborted(_) => false,
        }
    }
}

pub type ResolveCycleResult<T> = Result<T, ResolveCycleError>;
