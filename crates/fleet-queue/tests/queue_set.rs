//! QueueSet behaviour with and without workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{QueueConfig, Shutdown};
use fleet_queue::{QueueError, QueueSet, QueuedR11n, R11nHandler, R11nId, Rectification};
use fleet_state::{
    tracing_observer, Cluster, DeployConfig, DeployablePair, Deployable, Deployment, DeploymentId,
    DiffResolution, ManifestKind, ObservedEvent, RecordingObserver, ResolutionDesc, SourceId,
};
use tokio::sync::Semaphore;

fn r11n(repo: &str, cluster: &str, instances: u32) -> Rectification {
    let deployment = Deployment {
        source_id: SourceId::new(repo, "", semver::Version::new(1, 0, 0)),
        flavor: String::new(),
        cluster_name: cluster.into(),
        cluster: Cluster::default(),
        deploy_config: DeployConfig {
            num_instances: instances,
            ..Default::default()
        },
        owners: Default::default(),
        kind: ManifestKind::Http,
    };
    Rectification::new(DeployablePair::added(Deployable::new(deployment)))
}

/// Handler that only proceeds when the test adds permits, and records
/// what ran and how many ran at once per identity.
struct GatedHandler {
    gate: Arc<Semaphore>,
    running: Mutex<HashMap<DeploymentId, usize>>,
    max_concurrent_same_id: AtomicUsize,
    order: Mutex<Vec<u32>>,
}

impl GatedHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Arc::new(Semaphore::new(0)),
            running: Mutex::new(HashMap::new()),
            max_concurrent_same_id: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl R11nHandler for GatedHandler {
    async fn handle(&self, r11n: &QueuedR11n) -> DiffResolution {
        let id = r11n.deployment_id().clone();
        {
            let mut running = self.running.lock().unwrap();
            let n = running.entry(id.clone()).or_default();
            *n += 1;
            self.max_concurrent_same_id.fetch_max(*n, Ordering::SeqCst);
        }

        let permit = self.gate.acquire().await.unwrap();
        permit.forget();

        let instances = r11n
            .rectification
            .pair
            .post
            .as_ref()
            .map(|p| p.deployment.num_instances())
            .unwrap_or_default();
        self.order.lock().unwrap().push(instances);
        *self.running.lock().unwrap().get_mut(&id).unwrap() -= 1;
        DiffResolution::ok(id, ResolutionDesc::Created)
    }
}

fn config(capacity: usize) -> QueueConfig {
    QueueConfig { capacity }
}

#[tokio::test]
async fn wait_returns_only_after_handler_finishes() {
    let handler = GatedHandler::new();
    let set = QueueSet::with_handler(&config(10), tracing_observer(), handler.clone(), &Shutdown::never())
        .unwrap();

    let queued = set.push_if_empty(r11n("hi", "east", 1)).unwrap();
    let id = queued.deployment_id().clone();

    let set = Arc::new(set);
    let waiter = {
        let set = set.clone();
        let r11n_id = queued.id;
        tokio::spawn(async move { set.wait(&id, &r11n_id).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished(), "completed before the handler was released");

    handler.gate.add_permits(1);
    let rez = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("wait did not return after completion")
        .unwrap()
        .expect("rectification unknown to its queue");
    assert_eq!(rez.desc, ResolutionDesc::Created);
}

#[tokio::test]
async fn one_in_flight_per_identity_in_fifo_order() {
    let handler = GatedHandler::new();
    let set = QueueSet::with_handler(&config(10), tracing_observer(), handler.clone(), &Shutdown::never())
        .unwrap();

    let mut last = None;
    for n in 1..=5 {
        last = Some(set.push(r11n("same", "east", n)).unwrap());
    }
    handler.gate.add_permits(5);

    let last = last.unwrap();
    let rez = tokio::time::timeout(
        Duration::from_secs(1),
        set.wait(last.deployment_id(), &last.id),
    )
    .await
    .unwrap();
    assert!(rez.is_some());
    assert_eq!(*handler.order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(handler.max_concurrent_same_id.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn identities_progress_independently() {
    let handler = GatedHandler::new();
    let set = QueueSet::with_handler(&config(10), tracing_observer(), handler.clone(), &Shutdown::never())
        .unwrap();

    let east = set.push(r11n("svc", "east", 1)).unwrap();
    let west = set.push(r11n("svc", "west", 1)).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(east.pos, 0);
    assert_eq!(west.pos, 0);

    handler.gate.add_permits(2);
    let both = async {
        let a = set.wait(east.deployment_id(), &east.id).await;
        let b = set.wait(west.deployment_id(), &west.id).await;
        (a, b)
    };
    let (a, b) = tokio::time::timeout(Duration::from_secs(1), both).await.unwrap();
    assert!(a.is_some() && b.is_some());
}

#[tokio::test]
async fn drops_are_reported_and_leave_queue_unchanged() {
    let observer = RecordingObserver::new();
    let set = QueueSet::new(&config(1), observer.clone());

    set.push(r11n("svc", "east", 1)).unwrap();
    let err = set.push(r11n("svc", "east", 2)).unwrap_err();
    assert!(matches!(err, QueueError::Full { .. }));
    let err = set.push_if_empty(r11n("svc", "east", 3)).unwrap_err();
    assert!(matches!(err, QueueError::NotEmpty { .. }));

    let id = DeploymentId::new("svc", "", "", "east");
    assert_eq!(set.queue(&id).unwrap().len(), 1);
    let dropped: Vec<_> = observer
        .events()
        .into_iter()
        .filter(|e| matches!(e, ObservedEvent::Dropped(..)))
        .collect();
    assert_eq!(dropped.len(), 2);
}

#[tokio::test]
async fn wait_on_unknown_queue_or_id_is_none() {
    let set = QueueSet::new(&config(10), tracing_observer());
    let id = DeploymentId::new("nobody", "", "", "east");
    assert!(set.wait(&id, &R11nId::new()).await.is_none());

    set.push(r11n("nobody", "east", 1)).unwrap();
    assert!(set.wait(&id, &R11nId::new()).await.is_none());
}

#[tokio::test]
async fn snapshot_lists_queued_items() {
    let set = QueueSet::new(&config(10), tracing_observer());
    set.push(r11n("a", "east", 1)).unwrap();
    set.push(r11n("a", "east", 2)).unwrap();
    set.push(r11n("b", "east", 1)).unwrap();

    let snapshot = set.snapshot();
    assert_eq!(snapshot.len(), 2);
    let a = &snapshot[&DeploymentId::new("a", "", "", "east")];
    assert_eq!(a.iter().map(|q| q.pos).collect::<Vec<_>>(), vec![0, 1]);
}

#[tokio::test]
async fn stop_halts_workers() {
    let handler = GatedHandler::new();
    let set = QueueSet::with_handler(&config(10), tracing_observer(), handler.clone(), &Shutdown::never())
        .unwrap();
    set.push(r11n("svc", "east", 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    set.stop();

    // The in-flight item still finishes; nothing after it is taken.
    set.push(r11n("svc", "east", 2)).unwrap();
    handler.gate.add_permits(2);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(*handler.order.lock().unwrap(), vec![1]);
    let id = DeploymentId::new("svc", "", "", "east");
    assert_eq!(set.queue(&id).unwrap().len(), 1);
}

#[test]
fn with_handler_outside_runtime_fails() {
    let err = QueueSet::with_handler(
        &config(10),
        tracing_observer(),
        GatedHandler::new(),
        &Shutdown::never(),
    )
    .err()
    .unwrap();
    assert_eq!(err, QueueError::NoRuntime);
}
