//! One resolve cycle: filter, observe, diff, resolve artifacts, rectify.

use std::sync::Arc;

use fleet_core::{retry, FleetConfig, RetryPolicy, Shutdown};
use fleet_state::{
    diff::spawn_diff, Clusters, Deployer, Deployments, QueryError, Registry, ResolveFilter,
    ResolveObserver,
};
use tracing::{info, warn};

use crate::error::ResolveCycleError;
use crate::pipeline::{collect, run_stage, StageOptions, Streams};
use crate::recorder::ResolveRecorder;
use crate::stages::{ArtifactStage, DispatchStage};

pub const FILTERING_CLUSTERS: &str = "filtering clusters";
pub const FILTERING_INTENDED: &str = "filtering intended deployments";
pub const GETTING_RUNNING: &str = "getting running deployments";
pub const FILTERING_RUNNING: &str = "filtering running deployments";
pub const GENERATING_DIFF: &str = "generating diff";
pub const RESOLVING_ARTIFACTS: &str = "resolving deployment artifacts";
pub const RECTIFICATION: &str = "rectification";

/// Phases of a cycle, in the order they are entered.
pub const PHASES: [&str; 7] = [
    FILTERING_CLUSTERS,
    FILTERING_INTENDED,
    GETTING_RUNNING,
    FILTERING_RUNNING,
    GENERATING_DIFF,
    RESOLVING_ARTIFACTS,
    RECTIFICATION,
];

/// Drives intended state onto clusters, one cycle per [`Resolver::begin`].
#[derive(Clone)]
pub struct Resolver {
    deployer: Arc<dyn Deployer>,
    registry: Arc<dyn Registry>,
    filter: ResolveFilter,
    retry: RetryPolicy,
    options: StageOptions,
    observer: Arc<dyn ResolveObserver>,
}

impl Resolver {
    pub fn new(
        deployer: Arc<dyn Deployer>,
        registry: Arc<dyn Registry>,
        config: &FleetConfig,
        observer: Arc<dyn ResolveObserver>,
    ) -> Self {
        Self {
            deployer,
            registry,
            filter: ResolveFilter::default(),
            retry: config.retry.policy(),
            options: StageOptions {
                concurrency: config.resolver.pipeline_concurrency,
                buffer: config.resolver.channel_buffer,
            },
            observer,
        }
    }

    /// Restrict cycles to what `filter` matches.
    pub fn with_filter(mut self, filter: ResolveFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> &ResolveFilter {
        &self.filter
    }

    /// Start a cycle on the current runtime. Cancelling `shutdown` ends it
    /// early with [`ResolveCycleError::Cancelled`].
    pub fn begin(
        &self,
        intended: Deployments,
        clusters: Clusters,
        shutdown: Shutdown,
    ) -> ResolveRecorder {
        let this = self.clone();
        ResolveRecorder::begin(self.observer.clone(), move |log| async move {
            let Resolver {
                deployer,
                registry,
                filter,
                retry: policy,
                options,
                observer,
            } = this;

            log.phase(FILTERING_CLUSTERS);
            let clusters = filter.filtered_clusters(&clusters);

            log.phase(FILTERING_INTENDED);
            let intended = intended.filter(|d| filter.matches_deployment(d));
            log.set_intended(intended.values());

            log.phase(GETTING_RUNNING);
            let running = {
                let deployer: &dyn Deployer = deployer.as_ref();
                let clusters = &clusters;
                retry(
                    policy,
                    "running deployments",
                    |e: &QueryError| e.retryable,
                    move || deployer.running_deployments(clusters),
                )
                .await
                .map_err(|source| ResolveCycleError::Phase {
                    phase: GETTING_RUNNING,
                    source,
                })?
            };

            log.phase(FILTERING_RUNNING);
            let running = running.filter(|s| filter.matches_deploy_state(s));

            log.phase(GENERATING_DIFF);
            let pairs = spawn_diff(
                &intended,
                &running,
                options.buffer,
                shutdown.clone(),
                observer.clone(),
            );

            log.phase(RESOLVING_ARTIFACTS);
            let resolved = run_stage(
                Arc::new(ArtifactStage::new(registry, policy)),
                Streams::source(pairs),
                options,
                shutdown.clone(),
                observer.clone(),
            );

            log.phase(RECTIFICATION);
            let tail = run_stage(
                Arc::new(DispatchStage::new(deployer)),
                resolved,
                options,
                shutdown.clone(),
                observer,
            );
            let mut resolved = 0usize;
            collect(tail, |rez| {
                resolved += 1;
                log.log(rez);
            })
            .await;

            if shutdown.is_cancelled() {
                warn!(resolved, "resolve cycle cancelled");
                return Err(ResolveCycleError::Cancelled);
            }
            info!(
                clusters = clusters.len(),
                intended = intended.len(),
                resolved,
                "resolve cycle complete"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployer::ClusterDeployer;
    use crate::memory::{MemoryClient, MemoryRegistry};
    use fleet_state::RecordingObserver;

    #[tokio::test]
    async fn empty_cycle_walks_every_phase() {
        let observer = RecordingObserver::new();
        let registry = Arc::new(MemoryRegistry::new());
        let deployer = Arc::new(ClusterDeployer::new(MemoryClient::new(), registry.clone()));
        let resolver = Resolver::new(deployer, registry, &FleetConfig::default(), observer.clone());

        let status = resolver
            .begin(Deployments::new(), Clusters::new(), Shutdown::never())
            .wait()
            .await
            .unwrap();
        assert!(status.log.is_empty());
        assert_eq!(status.phase, RECTIFICATION);
        assert_eq!(observer.phases(), PHASES.map(String::from).to_vec());
    }
}
