//! Deployer over an abstract cluster-control client.
//!
//! The client speaks in cluster requests (one per deployment identity,
//! named by [`make_request_id`]) and deploys of an artifact onto a
//! request. [`ClusterDeployer`] maps pair kinds onto those operations:
//!
//! | kind     | operations                                      |
//! |----------|-------------------------------------------------|
//! | Added    | post request, then deploy the artifact          |
//! | Removed  | delete request                                  |
//! | Modified | scale if the count changed; redeploy if version, resources, env, volumes or startup changed |
//! | Same     | none; report observed status                    |

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use fleet_state::{
    BuildArtifact, Cluster, Clusters, DeployConfig, DeployState, DeployStates, DeployStatus,
    DeployablePair, Deployer, Deployment, DiffResolution, ManifestKind, PairKind, QueryError,
    Registry, ResolutionDesc, ResolveError, SourceId,
};
use tracing::{debug, warn};

use crate::request_id::{make_request_id, parse_request_id};

/// A request as a cluster reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedRequest {
    pub request_id: String,
    pub artifact: BuildArtifact,
    pub deploy_config: DeployConfig,
    pub owners: BTreeSet<String>,
    pub kind: ManifestKind,
    pub status: DeployStatus,
}

/// Cluster-control operations the deployer needs.
#[async_trait]
pub trait RectificationClient: Send + Sync {
    /// Create or update the request for a deployment.
    async fn post_request(
        &self,
        cluster: &Cluster,
        request_id: &str,
        deployment: &Deployment,
    ) -> Result<(), QueryError>;

    async fn deploy(
        &self,
        cluster: &Cluster,
        request_id: &str,
        deployment: &Deployment,
        artifact: &BuildArtifact,
    ) -> Result<(), QueryError>;

    async fn scale(&self, cluster: &Cluster, request_id: &str, instances: u32) -> Result<(), QueryError>;

    async fn delete_request(&self, cluster: &Cluster, request_id: &str) -> Result<(), QueryError>;

    async fn running(&self, cluster: &Cluster) -> Result<Vec<ObservedRequest>, QueryError>;

    async fn request_status(&self, cluster: &Cluster, request_id: &str) -> Result<DeployStatus, QueryError>;
}

pub struct ClusterDeployer<C> {
    client: C,
    registry: Arc<dyn Registry>,
}

impl<C: RectificationClient> ClusterDeployer<C> {
    pub fn new(client: C, registry: Arc<dyn Registry>) -> Self {
        Self { client, registry }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn observe_cluster(&self, cluster: &Cluster, states: &DeployStates) -> Result<(), QueryError> {
        for request in self.client.running(cluster).await? {
            let id = match parse_request_id(&request.request_id) {
                Ok(id) => id,
                Err(e) => {
                    debug!(cluster = %cluster.name, error = %e, "skipping foreign request");
                    continue;
                }
            };
            if id.cluster != cluster.name {
                debug!(cluster = %cluster.name, request_id = %request.request_id, "request belongs to another cluster");
                continue;
            }

            let source_id = match self.registry.get_source_id(&request.artifact).await {
                Ok(source_id) => source_id,
                Err(e) if e.retryable => return Err(e),
                Err(e) => {
                    warn!(request_id = %request.request_id, artifact = %request.artifact.name, error = %e, "unknown artifact, skipping request");
                    continue;
                }
            };

            let deployment = Deployment {
                source_id: SourceId {
                    location: id.manifest_id.source.clone(),
                    version: source_id.version,
                },
                flavor: id.manifest_id.flavor.clone(),
                cluster_name: cluster.name.clone(),
                cluster: cluster.clone(),
                deploy_config: request.deploy_config,
                owners: request.owners,
                kind: request.kind,
            };
            if let Err(e) = states.add(DeployState {
                deployment,
                status: request.status,
            }) {
                warn!(cluster = %cluster.name, error = %e, "duplicate request");
            }
        }
        Ok(())
    }

    async fn create(&self, post: &Deployment, artifact: Option<&BuildArtifact>) -> Result<(), QueryError> {
        let request_id = make_request_id(&post.id());
        self.client.post_request(&post.cluster, &request_id, post).await?;
        match artifact {
            Some(artifact) => self.client.deploy(&post.cluster, &request_id, post, artifact).await,
            None if post.num_instances() == 0 => Ok(()),
            None => Err(QueryError::permanent("no artifact resolved for deploy")),
        }
    }

    async fn modify(&self, pair: &DeployablePair, post: &Deployment, artifact: Option<&BuildArtifact>) -> Result<(), QueryError> {
        let diffs = pair.diffs();
        let request_id = make_request_id(pair.id());

        if diffs.iter().any(|d| d.needs_scale()) {
            self.client
                .scale(&post.cluster, &request_id, post.num_instances())
                .await?;
        }
        if diffs.iter().any(|d| d.needs_redeploy()) {
            let Some(artifact) = artifact else {
                if post.num_instances() == 0 {
                    return Ok(());
                }
                return Err(QueryError::permanent("no artifact resolved for redeploy"));
            };
            self.client
                .deploy(&post.cluster, &request_id, post, artifact)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<C: RectificationClient> Deployer for ClusterDeployer<C> {
    async fn running_deployments(&self, clusters: &Clusters) -> Result<DeployStates, QueryError> {
        let states = DeployStates::new();
        for cluster in clusters.values() {
            self.observe_cluster(cluster, &states).await?;
        }
        Ok(states)
    }

    async fn rectify(&self, pair: &DeployablePair) -> DiffResolution {
        let id = pair.id().clone();
        match (pair.kind(), &pair.prior, &pair.post) {
            (PairKind::Added, _, Some(post)) => {
                match self.create(&post.deployment, post.artifact.as_ref()).await {
                    Ok(()) => DiffResolution::ok(id, ResolutionDesc::Created),
                    Err(e) => DiffResolution::failed(id, ResolutionDesc::NotCreated, ResolveError::create(e)),
                }
            }
            (PairKind::Removed, Some(prior), _) => {
                let request_id = make_request_id(&id);
                match self.client.delete_request(&prior.deployment.cluster, &request_id).await {
                    Ok(()) => DiffResolution::ok(id, ResolutionDesc::Removed),
                    Err(e) => DiffResolution::failed(id, ResolutionDesc::NotRemoved, ResolveError::delete(e)),
                }
            }
            (PairKind::Modified, _, Some(post)) => {
                match self.modify(pair, &post.deployment, post.artifact.as_ref()).await {
                    Ok(()) => DiffResolution::ok(id, ResolutionDesc::Updated),
                    Err(e) => DiffResolution::failed(id, ResolutionDesc::NotUpdated, ResolveError::change(e)),
                }
            }
            (_, prior, _) => report_stable(id, prior.as_ref().map(|p| p.status)),
        }
    }

    async fn status(&self, clusters: &Clusters, pair: &DeployablePair) -> Result<DeployState, QueryError> {
        let Some(post) = &pair.post else {
            return Err(QueryError::permanent(format!("{} has no intended side", pair.id())));
        };
        let deployment = &post.deployment;
        let cluster = clusters
            .get(&deployment.cluster_name)
            .unwrap_or(&deployment.cluster);
        let status = self
            .client
            .request_status(cluster, &make_request_id(pair.id()))
            .await?;
        Ok(DeployState {
            deployment: deployment.clone(),
            status,
        })
    }
}

/// Outcome for a pair that needs no change, from its observed status.
pub fn report_stable(id: fleet_state::DeploymentId, observed: Option<DeployStatus>) -> DiffResolution {
    match observed {
        Some(DeployStatus::Pending) => DiffResolution::ok(id, ResolutionDesc::Coming),
        Some(DeployStatus::Failed) => {
            DiffResolution::failed(id, ResolutionDesc::Unchanged, ResolveError::failed_status())
        }
        _ => DiffResolution::ok(id, ResolutionDesc::Unchanged),
    }
}
