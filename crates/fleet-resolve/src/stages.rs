//! The two resolution stages: artifact guard and rectify dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{retry, RetryPolicy};
use fleet_state::{
    BuildArtifact, DeployablePair, Deployer, Deployment, DiffResolution, PairKind, Registry,
    ResolutionDesc, ResolveError,
};
use tracing::debug;

use crate::pipeline::{Outcome, Stage};

/// Look up the artifact for `deployment` and check its advisories against
/// the target cluster. `Ok(None)` when no artifact is needed because the
/// deployment runs zero instances.
pub async fn guard_image(
    registry: &dyn Registry,
    deployment: &Deployment,
    policy: RetryPolicy,
) -> Result<Option<BuildArtifact>, ResolveError> {
    if deployment.num_instances() == 0 {
        debug!(deployment_id = %deployment.id(), "zero instances, no artifact needed");
        return Ok(None);
    }

    let artifact = retry(
        policy,
        "get artifact",
        |e: &fleet_state::QueryError| e.retryable,
        move || registry.get_artifact(&deployment.source_id),
    )
    .await
    .map_err(ResolveError::missing_image)?;

    if let Some(advisory) = artifact
        .advisories()
        .find(|a| !deployment.cluster.allows_advisory(a))
    {
        return Err(ResolveError::unacceptable_advisory(
            advisory,
            &deployment.cluster_name,
        ));
    }
    Ok(Some(artifact))
}

/// Resolves artifacts for pairs that will deploy something.
pub struct ArtifactStage {
    registry: Arc<dyn Registry>,
    policy: RetryPolicy,
}

impl ArtifactStage {
    pub fn new(registry: Arc<dyn Registry>, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }
}

#[async_trait]
impl Stage for ArtifactStage {
    fn name(&self) -> &'static str {
        "resolve artifacts"
    }

    async fn process(&self, mut pair: DeployablePair) -> Outcome {
        let kind = pair.kind();
        match kind {
            PairKind::Added | PairKind::Modified => {
                let Some(post) = pair.post.as_mut() else {
                    return Outcome::Forward(pair);
                };
                match guard_image(self.registry.as_ref(), &post.deployment, self.policy).await {
                    Ok(artifact) => {
                        post.artifact = artifact;
                        Outcome::Forward(pair)
                    }
                    Err(e) => {
                        let desc = if kind == PairKind::Added {
                            ResolutionDesc::NotCreated
                        } else {
                            ResolutionDesc::NotUpdated
                        };
                        Outcome::Finish(DiffResolution::failed(pair.id().clone(), desc, e))
                    }
                }
            }
            // Removals never need an image, so nothing here may block one.
            PairKind::Removed | PairKind::Same => Outcome::Forward(pair),
        }
    }
}

/// Hands every pair to the deployer; always finishes.
pub struct DispatchStage {
    deployer: Arc<dyn Deployer>,
}

impl DispatchStage {
    pub fn new(deployer: Arc<dyn Deployer>) -> Self {
        Self { deployer }
    }
}

#[async_trait]
impl Stage for DispatchStage {
    fn name(&self) -> &'static str {
        "rectify"
    }

    async fn process(&self, pair: DeployablePair) -> Outcome {
        Outcome::Finish(self.deployer.rectify(&pair).await)
    }
}
