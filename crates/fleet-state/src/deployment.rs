//! Deployment snapshots and their structural diff.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{DeploymentId, ManifestId, SourceId};
use crate::resources::Resources;

/// An execution cluster the fleet deploys into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "BaseURL")]
    pub base_url: String,
    /// Advisory names this cluster accepts on build artifacts.
    #[serde(default)]
    pub allowed_advisories: Vec<String>,
}

impl Cluster {
    pub fn allows_advisory(&self, advisory: &str) -> bool {
        self.allowed_advisories.iter().any(|a| a == advisory)
    }
}

/// Clusters keyed by name.
pub type Clusters = BTreeMap<String, Cluster>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VolumeMode {
    RO,
    RW,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Volume {
    pub host: String,
    pub container: String,
    pub mode: VolumeMode,
}

/// Volume mappings. Equality ignores order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volumes(pub Vec<Volume>);

impl PartialEq for Volumes {
    fn eq(&self, other: &Self) -> bool {
        let ours: BTreeSet<&Volume> = self.0.iter().collect();
        let theirs: BTreeSet<&Volume> = other.0.iter().collect();
        ours == theirs
    }
}

impl Eq for Volumes {}

/// Startup and readiness-check settings. Unset fields defer to the
/// cluster's defaults, so `None` and `Some(default)` are distinct.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Startup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_delay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ready_protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ready_uri_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ready_port_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ready_failure_statuses: Option<Vec<u16>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ready_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_ready_retries: Option<u32>,
}

/// How many instances to run and how to run them, in one cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployConfig {
    pub num_instances: u32,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Volumes,
    #[serde(default)]
    pub startup: Startup,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestKind {
    #[default]
    Http,
    Worker,
    Scheduled,
    OnDemand,
}

/// One manifest, in one cluster, at one version. Snapshots are replaced,
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Deployment {
    #[serde(rename = "SourceID")]
    pub source_id: SourceId,
    #[serde(default)]
    pub flavor: String,
    pub cluster_name: String,
    pub cluster: Cluster,
    pub deploy_config: DeployConfig,
    #[serde(default)]
    pub owners: BTreeSet<String>,
    #[serde(default)]
    pub kind: ManifestKind,
}

impl Deployment {
    pub fn id(&self) -> DeploymentId {
        DeploymentId {
            manifest_id: self.manifest_id(),
            cluster: self.cluster_name.clone(),
        }
    }

    pub fn manifest_id(&self) -> ManifestId {
        ManifestId {
            source: self.source_id.location.clone(),
            flavor: self.flavor.clone(),
        }
    }

    pub fn num_instances(&self) -> u32 {
        self.deploy_config.num_instances
    }

    /// Structural differences from `self` (prior) to `other` (post). Empty
    /// means the two deploy identically.
    pub fn diff(&self, other: &Deployment) -> Vec<Difference> {
        let (a, b) = (&self.deploy_config, &other.deploy_config);
        let mut diffs = Vec::new();
        if a.num_instances != b.num_instances {
            diffs.push(Difference::NumInstances {
                prior: a.num_instances,
                post: b.num_instances,
            });
        }
        if a.env != b.env {
            diffs.push(Difference::Env);
        }
        if a.resources != b.resources {
            diffs.push(Difference::Resources {
                prior: a.resources.to_string(),
                post: b.resources.to_string(),
            });
        }
        if a.volumes != b.volumes {
            diffs.push(Difference::Volumes);
        }
        if a.metadata != b.metadata {
            diffs.push(Difference::Metadata);
        }
        if a.startup != b.startup {
            diffs.push(Difference::Startup);
        }
        if self.source_id.version != other.source_id.version {
            diffs.push(Difference::Version {
                prior: self.source_id.version.clone(),
                post: other.source_id.version.clone(),
            });
        }
        diffs
    }
}

/// One way two deployments of the same identity differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Difference {
    NumInstances { prior: u32, post: u32 },
    Env,
    Resources { prior: String, post: String },
    Volumes,
    Metadata,
    Startup,
    Version { prior: semver::Version, post: semver::Version },
}

impl Difference {
    /// Whether the change needs the cluster request rescaled.
    pub fn needs_scale(&self) -> bool {
        matches!(self, Difference::NumInstances { .. })
    }

    /// Whether the change needs a fresh deploy of the artifact.
    pub fn needs_redeploy(&self) -> bool {
        matches!(
            self,
            Difference::Env
                | Difference::Resources { .. }
                | Difference::Volumes
                | Difference::Startup
                | Difference::Version { .. }
        )
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::NumInstances { prior, post } => {
                write!(f, "number of instances; prior: {prior}; post: {post}")
            }
            Difference::Env => write!(f, "env"),
            Difference::Resources { prior, post } => {
                write!(f, "resources; prior: {prior}; post: {post}")
            }
            Difference::Volumes => write!(f, "volumes"),
            Difference::Metadata => write!(f, "metadata"),
            Difference::Startup => write!(f, "startup"),
            Difference::Version { prior, post } => {
                write!(f, "version; prior: {prior}; post: {post}")
            }
        }
    }
}

/// Status a cluster reports for one of its deployments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeployStatus {
    #[default]
    Unknown,
    Pending,
    Active,
    Failed,
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployStatus::Unknown => "unknown",
            DeployStatus::Pending => "pending",
            DeployStatus::Active => "active",
            DeployStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A deployment as one cluster sees it live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeployState {
    pub deployment: Deployment,
    pub status: DeployStatus,
}

impl DeployState {
    pub fn id(&self) -> DeploymentId {
        self.deployment.id()
    }
}
