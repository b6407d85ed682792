//! End-to-end resolve cycles over the in-memory registry and client.

use std::sync::{Arc, Once};
use std::time::Duration;

use fleet_core::{FleetConfig, Shutdown};
use fleet_queue::{QueueSet, Rectification};
use fleet_resolve::{
    make_request_id, AutoResolver, ClientCall, ClusterDeployer, MemoryClient, MemoryRegistry,
    Rectifier, ResolveCycleError, Resolver, PHASES,
};
use fleet_state::{
    BuildArtifact, Cluster, Clusters, DeployConfig, DeployStatus, Deployable, DeployablePair,
    Deployment, Deployments, ManifestKind, QueryError, RecordingObserver, ResolutionDesc,
    ResolveErrorKind, Resources, SourceId, State, StaticStateReader,
};

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn config() -> FleetConfig {
    let mut config = FleetConfig::default();
    config.retry.backoff = "1ms".to_string();
    config
}

fn cluster(name: &str) -> Cluster {
    Cluster {
        name: name.to_string(),
        base_url: format!("http://{name}.example"),
        allowed_advisories: Vec::new(),
    }
}

fn deployment(repo: &str, instances: u32) -> Deployment {
    Deployment {
        source_id: SourceId::new(repo, "", semver::Version::new(1, 0, 0)),
        flavor: String::new(),
        cluster_name: "east".to_string(),
        cluster: cluster("east"),
        deploy_config: DeployConfig {
            num_instances: instances,
            resources: Resources::from([("cpus", "0.1"), ("memory", "100"), ("ports", "1")]),
            ..Default::default()
        },
        owners: Default::default(),
        kind: ManifestKind::Http,
    }
}

fn image(repo: &str) -> BuildArtifact {
    BuildArtifact::docker(&format!("docker.example/{repo}:1.0.0"))
}

struct Fixture {
    registry: Arc<MemoryRegistry>,
    deployer: Arc<ClusterDeployer<MemoryClient>>,
    observer: Arc<RecordingObserver>,
    clusters: Clusters,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let registry = Arc::new(MemoryRegistry::new());
        let deployer = Arc::new(ClusterDeployer::new(MemoryClient::new(), registry.clone()));
        Self {
            registry,
            deployer,
            observer: RecordingObserver::new(),
            clusters: Clusters::from([("east".to_string(), cluster("east"))]),
        }
    }

    fn publish(&self, repo: &str) {
        self.registry
            .insert(SourceId::new(repo, "", semver::Version::new(1, 0, 0)), image(repo));
    }

    /// `repo` already runs on east with `instances` instances.
    fn running(&self, repo: &str, instances: u32) {
        self.publish(repo);
        self.deployer
            .client()
            .seed(deployment(repo, instances), image(repo), DeployStatus::Active);
    }

    fn resolver(&self) -> Resolver {
        Resolver::new(
            self.deployer.clone(),
            self.registry.clone(),
            &config(),
            self.observer.clone(),
        )
    }

    fn calls_for(&self, repo: &str) -> Vec<ClientCall> {
        let rid = make_request_id(&deployment(repo, 1).id());
        self.deployer
            .client()
            .calls()
            .into_iter()
            .filter(|c| c.request_id() == rid)
            .collect()
    }
}

fn intended(deployments: Vec<Deployment>) -> Deployments {
    deployments.into_iter().collect()
}

#[tokio::test]
async fn added_deployment_is_created_and_deployed() {
    let fx = Fixture::new();
    fx.publish("github.com/acme/web");

    let status = fx
        .resolver()
        .begin(
            intended(vec![deployment("github.com/acme/web", 2)]),
            fx.clusters.clone(),
            Shutdown::never(),
        )
        .wait()
        .await
        .unwrap();

    assert_eq!(status.log.len(), 1);
    assert_eq!(status.log[0].desc, ResolutionDesc::Created);
    assert!(status.errors.is_empty());

    let rid = make_request_id(&deployment("github.com/acme/web", 2).id());
    assert_eq!(
        fx.calls_for("github.com/acme/web"),
        vec![
            ClientCall::PostRequest {
                request_id: rid.clone(),
                instances: 2
            },
            ClientCall::Deploy {
                request_id: rid,
                artifact: image("github.com/acme/web").name
            },
        ]
    );
}

#[tokio::test]
async fn removed_deployment_is_deleted_without_artifact_lookup() {
    let fx = Fixture::new();
    fx.running("github.com/acme/old", 1);

    let status = fx
        .resolver()
        .begin(Deployments::new(), fx.clusters.clone(), Shutdown::never())
        .wait()
        .await
        .unwrap();

    assert_eq!(status.log.len(), 1);
    assert_eq!(status.log[0].desc, ResolutionDesc::Removed);
    assert_eq!(fx.registry.lookups(), 0);
    assert!(matches!(
        fx.calls_for("github.com/acme/old").as_slice(),
        [ClientCall::Delete { .. }]
    ));
    assert_eq!(fx.deployer.client().request_count(), 0);
}

#[tokio::test]
async fn instance_change_scales_without_redeploy() {
    let fx = Fixture::new();
    fx.running("github.com/acme/web", 1);

    let status = fx
        .resolver()
        .begin(
            intended(vec![deployment("github.com/acme/web", 3)]),
            fx.clusters.clone(),
            Shutdown::never(),
        )
        .wait()
        .await
        .unwrap();

    assert_eq!(status.log[0].desc, ResolutionDesc::Updated);
    let calls = fx.calls_for("github.com/acme/web");
    assert!(calls.iter().any(|c| matches!(c, ClientCall::Scale { instances: 3, .. })));
    assert!(!calls.iter().any(|c| matches!(c, ClientCall::Deploy { .. })));
}

#[tokio::test]
async fn unchanged_deployment_is_left_alone() {
    let fx = Fixture::new();
    fx.running("github.com/acme/web", 2);

    let status = fx
        .resolver()
        .begin(
            intended(vec![deployment("github.com/acme/web", 2)]),
            fx.clusters.clone(),
            Shutdown::never(),
        )
        .wait()
        .await
        .unwrap();

    assert_eq!(status.log[0].desc, ResolutionDesc::Unchanged);
    assert!(fx.calls_for("github.com/acme/web").is_empty());
}

#[tokio::test]
async fn one_missing_image_does_not_block_the_rest() {
    let fx = Fixture::new();
    fx.publish("github.com/acme/good");

    let status = fx
        .resolver()
        .begin(
            intended(vec![
                deployment("github.com/acme/good", 1),
                deployment("github.com/acme/unbuilt", 1),
            ]),
            fx.clusters.clone(),
            Shutdown::never(),
        )
        .wait()
        .await
        .unwrap();

    assert_eq!(status.log.len(), 2);
    let good = status
        .resolution_for(&deployment("github.com/acme/good", 1).id())
        .unwrap();
    assert_eq!(good.desc, ResolutionDesc::Created);

    let bad = status
        .resolution_for(&deployment("github.com/acme/unbuilt", 1).id())
        .unwrap();
    assert_eq!(bad.desc, ResolutionDesc::NotCreated);
    let err = bad.error.as_ref().unwrap();
    assert_eq!(err.kind, ResolveErrorKind::MissingImage);
    assert!(!err.retryable);
    assert_eq!(status.errors.len(), 1);
}

#[tokio::test]
async fn phases_are_recorded_in_order() {
    let fx = Fixture::new();
    fx.publish("github.com/acme/web");
    fx.resolver()
        .begin(
            intended(vec![deployment("github.com/acme/web", 1)]),
            fx.clusters.clone(),
            Shutdown::never(),
        )
        .wait()
        .await
        .unwrap();
    assert_eq!(fx.observer.phases(), PHASES.map(String::from).to_vec());
}

#[tokio::test]
async fn unreachable_cluster_aborts_the_cycle() {
    let fx = Fixture::new();
    fx.deployer
        .client()
        .fail_next("running", QueryError::permanent("connection refused"));

    let recorder = fx.resolver().begin(
        intended(vec![deployment("github.com/acme/web", 1)]),
        fx.clusters.clone(),
        Shutdown::never(),
    );
    let err = recorder.wait().await.unwrap_err();
    assert!(matches!(err, ResolveCycleError::Phase { .. }));

    let status = recorder.status();
    assert!(status.is_finished());
    assert!(status.log.is_empty());
    assert_eq!(status.errors.len(), 1);
    assert!(fx.deployer.client().calls().is_empty());
}

#[tokio::test]
async fn transient_observation_failure_is_retried() {
    let fx = Fixture::new();
    fx.publish("github.com/acme/web");
    fx.deployer
        .client()
        .fail_next("running", QueryError::transient("timeout"));

    let status = fx
        .resolver()
        .begin(
            intended(vec![deployment("github.com/acme/web", 1)]),
            fx.clusters.clone(),
            Shutdown::never(),
        )
        .wait()
        .await
        .unwrap();
    assert_eq!(status.log[0].desc, ResolutionDesc::Created);
}

#[tokio::test]
async fn auto_resolver_runs_on_trigger_and_stops() {
    let fx = Fixture::new();
    fx.publish("github.com/acme/web");
    fx.publish("github.com/acme/api");

    let state = Arc::new(StaticStateReader::new(State {
        clusters: fx.clusters.clone(),
        intended: intended(vec![deployment("github.com/acme/web", 1)]),
    }));
    let mut config = config();
    config.resolver.update_interval = "1h".to_string();
    let auto = AutoResolver::new(fx.resolver(), state.clone(), &config);
    auto.start();

    let first = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let (Some(stable), _) = auto.statuses() {
                return stable;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(first.log.len(), 1);

    state.replace(State {
        clusters: fx.clusters.clone(),
        intended: intended(vec![
            deployment("github.com/acme/web", 1),
            deployment("github.com/acme/api", 1),
        ]),
    });
    auto.trigger();

    let second = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let (Some(stable), _) = auto.statuses() {
                if stable.intended.len() == 2 {
                    return stable;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    let api = second
        .resolution_for(&deployment("github.com/acme/api", 1).id())
        .unwrap();
    assert_eq!(api.desc, ResolutionDesc::Created);
    assert_eq!(auto.status_data().deployments.len(), 2);

    tokio::time::timeout(Duration::from_secs(2), auto.stop())
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_auto_cycle_is_reported_as_completed() {
    let fx = Fixture::new();
    fx.publish("github.com/acme/web");
    fx.deployer
        .client()
        .fail_next("running", QueryError::permanent("connection refused"));

    let state = Arc::new(StaticStateReader::new(State {
        clusters: fx.clusters.clone(),
        intended: intended(vec![deployment("github.com/acme/web", 1)]),
    }));
    let mut config = config();
    config.resolver.update_interval = "1h".to_string();
    let auto = AutoResolver::new(fx.resolver(), state, &config);
    auto.start();

    let completed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(completed) = auto.status_data().completed {
                return completed;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(completed.is_finished());
    assert!(completed.log.is_empty());
    assert_eq!(completed.errors.len(), 1);
    assert_eq!(completed.errors[0].kind, ResolveErrorKind::Other);
    assert!(!completed.errors[0].retryable);
    assert!(completed.errors[0].message.contains("connection refused"));
    assert_eq!(auto.status_data().deployments.len(), 1);

    tokio::time::timeout(Duration::from_secs(2), auto.stop())
        .await
        .unwrap();
}

#[tokio::test]
async fn queued_rectification_reports_pending_as_coming() {
    let fx = Fixture::new();
    let config = config();
    let rectifier = Arc::new(Rectifier::new(
        fx.deployer.clone(),
        fx.registry.clone(),
        fx.clusters.clone(),
        config.retry.policy(),
        fx.observer.clone(),
    ));
    let set = QueueSet::with_handler(&config.queue, fx.observer.clone(), rectifier, &Shutdown::never())
        .unwrap();

    // Zero instances: the request is posted but nothing is deployed, so
    // the cluster still reports it pending.
    let d = deployment("github.com/acme/idle", 0);
    let queued = set
        .push(Rectification::new(DeployablePair::added(Deployable::new(d.clone()))))
        .unwrap();
    let rez = tokio::time::timeout(Duration::from_secs(2), set.wait(&d.id(), &queued.id))
        .await
        .unwrap()
        .unwrap();

    assert!(rez.is_ok());
    assert_eq!(rez.desc, ResolutionDesc::Coming);
    assert_eq!(fx.registry.lookups(), 0);
}

#[tokio::test]
async fn queued_rectification_reports_missing_image() {
    let fx = Fixture::new();
    let config = config();
    let rectifier = Arc::new(Rectifier::new(
        fx.deployer.clone(),
        fx.registry.clone(),
        fx.clusters.clone(),
        config.retry.policy(),
        fx.observer.clone(),
    ));
    let set = QueueSet::with_handler(&config.queue, fx.observer.clone(), rectifier, &Shutdown::never())
        .unwrap();

    let d = deployment("github.com/acme/unbuilt", 1);
    let queued = set
        .push(Rectification::new(DeployablePair::added(Deployable::new(d.clone()))))
        .unwrap();
    let rez = tokio::time::timeout(Duration::from_secs(2), set.wait(&d.id(), &queued.id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(rez.desc, ResolutionDesc::NotCreated);
    assert_eq!(rez.error.unwrap().kind, ResolveErrorKind::MissingImage);
    assert!(fx.deployer.client().calls().is_empty());
}
