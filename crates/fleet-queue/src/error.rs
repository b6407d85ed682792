//! Queue error types.

use fleet_state::DeploymentId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("dropped: queue full for {deployment_id} (capacity {capacity})")]
    Full {
        deployment_id: DeploymentId,
        capacity: usize,
    },

    #[error("dropped: queue not empty for {deployment_id}")]
    NotEmpty { deployment_id: DeploymentId },

    #[error("queue workers need a tokio runtime")]
    NoRuntime,
}

impl QueueError {
    /// Short reason for observers and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            QueueError::Full { .. } => "queue full",
            QueueError::NotEmpty { .. } => "queue not empty",
            QueueError::NoRuntime => "no runtime",
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;
