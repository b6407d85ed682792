//! State-layer error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::DeploymentId;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("duplicate deployment in snapshot: {0}")]
    DuplicateDeployment(DeploymentId),

    #[error("invalid request ID {id:?}: {reason}")]
    InvalidRequestId { id: String, reason: &'static str },

    #[error("query failed: {0}")]
    Query(#[from] QueryError),
}

pub type StateResult<T> = Result<T, StateError>;

/// Failure reported by an external collaborator (registry, deployer, state
/// reader). Retryability is decided by the collaborator when it builds the
/// error.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct QueryError {
    pub message: String,
    pub retryable: bool,
}

impl QueryError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}
