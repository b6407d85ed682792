//! Wire types served by the status endpoint and read by the poller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deployment::Deployment;
use crate::ids::DeploymentId;
use crate::resolution::{DiffResolution, ResolveError};

/// Record of one resolve cycle, finished or underway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolveStatus {
    pub started: DateTime<Utc>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    /// Name of the phase currently (or last) executing.
    #[serde(default)]
    pub phase: String,
    /// Deployments the cycle set out to reach.
    #[serde(default)]
    pub intended: Vec<Deployment>,
    /// One entry per rectified pair, in completion order.
    #[serde(default)]
    pub log: Vec<DiffResolution>,
    #[serde(default)]
    pub errors: Vec<ResolveError>,
}

impl ResolveStatus {
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            started,
            finished: None,
            phase: String::new(),
            intended: Vec::new(),
            log: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Latest logged resolution for `id`.
    pub fn resolution_for(&self, id: &DeploymentId) -> Option<&DiffResolution> {
        self.log.iter().rev().find(|r| &r.deployment_id == id)
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusData {
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    #[serde(default)]
    pub completed: Option<ResolveStatus>,
    #[serde(default)]
    pub in_progress: Option<ResolveStatus>,
}

impl StatusData {
    /// Older servers leave `Intended` empty; fall back to the current
    /// deployment snapshot.
    pub fn backfill_intended(&mut self) {
        for status in [self.completed.as_mut(), self.in_progress.as_mut()]
            .into_iter()
            .flatten()
        {
            if status.intended.is_empty() {
                status.intended = self.deployments.clone();
            }
        }
    }
}

/// One entry of `GET /servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerEntry {
    pub cluster_name: String,
    #[serde(rename = "URL")]
    pub url: String,
}

/// Body of `GET /servers`: which status server speaks for which cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerList {
    pub servers: Vec<ServerEntry>,
}
