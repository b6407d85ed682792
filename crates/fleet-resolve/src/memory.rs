//! In-memory registry and cluster client.
//!
//! Both keep everything in process and can be told to fail their next
//! calls, which makes them usable for dry runs and for exercising the
//! resolver without a real cluster.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use fleet_state::{
    BuildArtifact, Cluster, DeployStatus, Deployment, QueryError, Registry, SourceId,
};

use crate::deployer::{ObservedRequest, RectificationClient};
use crate::request_id::make_request_id;

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    artifacts: RwLock<HashMap<SourceId, BuildArtifact>>,
    failures: Mutex<VecDeque<QueryError>>,
    lookups: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source: SourceId, artifact: BuildArtifact) {
        self.artifacts
            .write()
            .expect("registry lock")
            .insert(source, artifact);
    }

    /// Make the next artifact lookup fail with `err`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, err: QueryError) {
        self.failures.lock().expect("registry lock").push_back(err);
    }

    /// Number of `get_artifact` calls so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get_artifact(&self, source: &SourceId) -> Result<BuildArtifact, QueryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().expect("registry lock").pop_front() {
            return Err(err);
        }
        self.artifacts
            .read()
            .expect("registry lock")
            .get(source)
            .cloned()
            .ok_or_else(|| QueryError::permanent(format!("no artifact for {source}")))
    }

    async fn get_source_id(&self, artifact: &BuildArtifact) -> Result<SourceId, QueryError> {
        self.artifacts
            .read()
            .expect("registry lock")
            .iter()
            .find(|(_, a)| a.name == artifact.name)
            .map(|(source, _)| source.clone())
            .ok_or_else(|| QueryError::permanent(format!("unknown artifact {}", artifact.name)))
    }
}

/// One operation a [`MemoryClient`] was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    PostRequest { request_id: String, instances: u32 },
    Deploy { request_id: String, artifact: String },
    Scale { request_id: String, instances: u32 },
    Delete { request_id: String },
}

impl ClientCall {
    pub fn request_id(&self) -> &str {
        match self {
            ClientCall::PostRequest { request_id, .. }
            | ClientCall::Deploy { request_id, .. }
            | ClientCall::Scale { request_id, .. }
            | ClientCall::Delete { request_id } => request_id,
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryRequest {
    deployment: Deployment,
    artifact: Option<BuildArtifact>,
    status: DeployStatus,
}

/// Cluster client that keeps requests in a map keyed by cluster and
/// request ID.
#[derive(Debug, Default)]
pub struct MemoryClient {
    requests: Mutex<BTreeMap<(String, String), MemoryRequest>>,
    calls: Mutex<Vec<ClientCall>>,
    failures: Mutex<HashMap<&'static str, QueryError>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `deployment` is already running.
    pub fn seed(&self, deployment: Deployment, artifact: BuildArtifact, status: DeployStatus) {
        let key = (deployment.cluster_name.clone(), make_request_id(&deployment.id()));
        self.requests.lock().expect("client lock").insert(
            key,
            MemoryRequest {
                deployment,
                artifact: Some(artifact),
                status,
            },
        );
    }

    /// Make the next call of `op` ("post_request", "deploy", "scale",
    /// "delete_request", "running", "request_status") fail with `err`.
    pub fn fail_next(&self, op: &'static str, err: QueryError) {
        self.failures.lock().expect("client lock").insert(op, err);
    }

    pub fn set_status(&self, cluster: &str, request_id: &str, status: DeployStatus) {
        if let Some(r) = self
            .requests
            .lock()
            .expect("client lock")
            .get_mut(&(cluster.to_string(), request_id.to_string()))
        {
            r.status = status;
        }
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().expect("client lock").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("client lock").len()
    }

    fn check(&self, op: &'static str) -> Result<(), QueryError> {
        match self.failures.lock().expect("client lock").remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record(&self, call: ClientCall) {
        self.calls.lock().expect("client lock").push(call);
    }

    fn with_request<T>(
        &self,
        cluster: &Cluster,
        request_id: &str,
        f: impl FnOnce(&mut MemoryRequest) -> T,
    ) -> Result<T, QueryError> {
        let mut requests = self.requests.lock().expect("client lock");
        requests
            .get_mut(&(cluster.name.clone(), request_id.to_string()))
            .map(f)
            .ok_or_else(|| QueryError::permanent(format!("no request {request_id} in {}", cluster.name)))
    }
}

#[async_trait]
impl RectificationClient for MemoryClient {
    async fn post_request(&self, cluster: &Cluster, request_id: &str, deployment: &Deployment) -> Result<(), QueryError> {
        self.check("post_request")?;
        self.record(ClientCall::PostRequest {
            request_id: request_id.to_string(),
            instances: deployment.num_instances(),
        });
        let mut requests = self.requests.lock().expect("client lock");
        let entry = requests
            .entry((cluster.name.clone(), request_id.to_string()))
            .or_insert_with(|| MemoryRequest {
                deployment: deployment.clone(),
                artifact: None,
                status: DeployStatus::Pending,
            });
        entry.deployment.deploy_config.num_instances = deployment.num_instances();
        entry.deployment.owners = deployment.owners.clone();
        entry.deployment.kind = deployment.kind;
        Ok(())
    }

    async fn deploy(&self, cluster: &Cluster, request_id: &str, deployment: &Deployment, artifact: &BuildArtifact) -> Result<(), QueryError> {
        self.check("deploy")?;
        self.record(ClientCall::Deploy {
            request_id: request_id.to_string(),
            artifact: artifact.name.clone(),
        });
        self.with_request(cluster, request_id, |r| {
            r.deployment = deployment.clone();
            r.artifact = Some(artifact.clone());
            r.status = DeployStatus::Active;
        })
    }

    async fn scale(&self, cluster: &Cluster, request_id: &str, instances: u32) -> Result<(), QueryError> {
        self.check("scale")?;
        self.record(ClientCall::Scale {
            request_id: request_id.to_string(),
            instances,
        });
        self.with_request(cluster, request_id, |r| {
            r.deployment.deploy_config.num_instances = instances;
        })
    }

    async fn delete_request(&self, cluster: &Cluster, request_id: &str) -> Result<(), QueryError> {
        self.check("delete_request")?;
        self.record(ClientCall::Delete {
            request_id: request_id.to_string(),
        });
        self.requests
            .lock()
            .expect("client lock")
            .remove(&(cluster.name.clone(), request_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| QueryError::permanent(format!("no request {request_id} in {}", cluster.name)))
    }

    async fn running(&self, cluster: &Cluster) -> Result<Vec<ObservedRequest>, QueryError> {
        self.check("running")?;
        let requests = self.requests.lock().expect("client lock");
        Ok(requests
            .iter()
            .filter(|((c, _), _)| c == &cluster.name)
            .filter_map(|((_, request_id), r)| {
                Some(ObservedRequest {
                    request_id: request_id.clone(),
                    artifact: r.artifact.clone()?,
                    deploy_config: r.deployment.deploy_config.clone(),
                    owners: r.deployment.owners.clone(),
                    kind: r.deployment.kind,
                    status: r.status,
                })
            })
            .collect())
    }

    async fn request_status(&self, cluster: &Cluster, request_id: &str) -> Result<DeployStatus, QueryError> {
        self.check("request_status")?;
        self.with_request(cluster, request_id, |r| r.status)
    }
}
