//! Out-of-cycle rectification: the handler behind a [`QueueSet`].
//!
//! [`QueueSet`]: fleet_queue::QueueSet

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::RetryPolicy;
use fleet_queue::{QueuedR11n, R11nHandler};
use fleet_state::{
    Clusters, DeployStatus, DeployablePair, Deployer, DiffResolution, PairKind, Registry,
    ResolutionDesc, ResolveError, ResolveObserver,
};
use tracing::debug;

use crate::pipeline::{Outcome, Stage};
use crate::stages::ArtifactStage;

const STAGE: &str = "rectifier";

/// Resolves the artifact for a queued pair, rectifies it, then checks
/// what the cluster reports for it.
pub struct Rectifier {
    artifacts: ArtifactStage,
    deployer: Arc<dyn Deployer>,
    clusters: Clusters,
    observer: Arc<dyn ResolveObserver>,
}

impl Rectifier {
    pub fn new(
        deployer: Arc<dyn Deployer>,
        registry: Arc<dyn Registry>,
        clusters: Clusters,
        policy: RetryPolicy,
        observer: Arc<dyn ResolveObserver>,
    ) -> Self {
        Self {
            artifacts: ArtifactStage::new(registry, policy),
            deployer,
            clusters,
            observer,
        }
    }

    pub async fn rectify(&self, pair: DeployablePair) -> DiffResolution {
        let pair = match self.artifacts.process(pair).await {
            Outcome::Forward(pair) => pair,
            Outcome::Finish(rez) => {
                self.observer.pair_resolved(STAGE, &rez);
                return rez;
            }
        };

        let mut rez = self.deployer.rectify(&pair).await;
        if rez.is_ok() && matches!(pair.kind(), PairKind::Added | PairKind::Modified) {
            match self.deployer.status(&self.clusters, &pair).await {
                Ok(state) => match state.status {
                    DeployStatus::Pending => rez.desc = ResolutionDesc::Coming,
                    DeployStatus::Failed => rez.error = Some(ResolveError::failed_status()),
                    _ => {}
                },
                Err(e) => debug!(deployment_id = %pair.id(), error = %e, "status unavailable after rectify"),
            }
        }
        self.observer.pair_resolved(STAGE, &rez);
        rez
    }
}

#[async_trait]
impl R11nHandler for Rectifier {
    async fn handle(&self, r11n: &QueuedR11n) -> DiffResolution {
        self.rectify(r11n.rectification.pair.clone()).await
    }
}
