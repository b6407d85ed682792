//! Contracts for the external collaborators the reconciler drives.
//!
//! Implementations must be safe to call concurrently from several
//! pipeline tasks at once.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::artifact::{BuildArtifact, DeployablePair};
use crate::deployment::{Clusters, DeployState};
use crate::error::QueryError;
use crate::ids::SourceId;
use crate::resolution::DiffResolution;
use crate::snapshot::{DeployStates, Deployments};

/// Maps sources to runnable artifacts and back.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn get_artifact(&self, source: &SourceId) -> Result<BuildArtifact, QueryError>;

    async fn get_source_id(&self, artifact: &BuildArtifact) -> Result<SourceId, QueryError>;
}

/// Drives clusters: reports what runs there and applies changes.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Everything currently running across `clusters`.
    async fn running_deployments(&self, clusters: &Clusters) -> Result<DeployStates, QueryError>;

    /// Apply one pair's change. Failures are reported in the returned
    /// resolution, never as a panic or early return.
    async fn rectify(&self, pair: &DeployablePair) -> DiffResolution;

    /// Live state of the pair's intended deployment.
    async fn status(&self, clusters: &Clusters, pair: &DeployablePair) -> Result<DeployState, QueryError>;
}

/// Declared fleet: cluster definitions plus intended deployments.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub clusters: Clusters,
    pub intended: Deployments,
}

#[async_trait]
pub trait StateReader: Send + Sync {
    async fn read_state(&self) -> Result<State, QueryError>;
}

/// A [`StateReader`] over state held in memory, replaced wholesale.
#[derive(Debug, Default)]
pub struct StaticStateReader {
    state: RwLock<State>,
}

impl StaticStateReader {
    pub fn new(state: State) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn replace(&self, state: State) {
        *self.state.write().expect("state lock") = state;
    }
}

#[async_trait]
impl StateReader for StaticStateReader {
    async fn read_state(&self) -> Result<State, QueryError> {
        Ok(self.state.read().expect("state lock").clone())
    }
}
