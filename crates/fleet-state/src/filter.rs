//! Narrowing a resolve to a subset of the fleet.

use std::fmt;

use crate::deployment::{Clusters, DeployState, DeployStatus, Deployment};
use crate::ids::{DeploymentId, ManifestId};

/// Selects deployments by location, version, flavor, and cluster. Every
/// `None` field matches anything; `Some("")` matches only an empty value,
/// which matters for offset and flavor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveFilter {
    pub repo: Option<String>,
    pub offset: Option<String>,
    pub flavor: Option<String>,
    /// Release version, e.g. "1.2.0". Build metadata is ignored.
    pub tag: Option<String>,
    /// Matched against the version's build metadata.
    pub revision: Option<String>,
    pub cluster: Option<String>,
    pub status: Option<DeployStatus>,
}

fn matches(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().is_none_or(|f| f == value)
}

fn matches_tag(tag: &Option<String>, version: &semver::Version) -> bool {
    let Some(tag) = tag else { return true };
    match semver::Version::parse(tag.trim_start_matches('v')) {
        Ok(want) => {
            want.major == version.major
                && want.minor == version.minor
                && want.patch == version.patch
                && want.pre == version.pre
        }
        Err(_) => tag == &version.to_string(),
    }
}

impl ResolveFilter {
    /// Filter for exactly one deployment identity, any version.
    pub fn for_deployment(id: &DeploymentId) -> Self {
        Self {
            repo: Some(id.manifest_id.source.repo.clone()),
            offset: Some(id.manifest_id.source.dir.clone()),
            flavor: Some(id.manifest_id.flavor.clone()),
            cluster: Some(id.cluster.clone()),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: &semver::Version) -> Self {
        self.tag = Some(version.to_string());
        self
    }

    /// True when nothing narrows the selection.
    pub fn is_all(&self) -> bool {
        self.repo.is_none()
            && self.offset.is_none()
            && self.flavor.is_none()
            && self.tag.is_none()
            && self.revision.is_none()
            && self.cluster.is_none()
    }

    pub fn matches_cluster(&self, name: &str) -> bool {
        matches(&self.cluster, name)
    }

    pub fn matches_manifest(&self, id: &ManifestId) -> bool {
        matches(&self.repo, &id.source.repo)
            && matches(&self.offset, &id.source.dir)
            && matches(&self.flavor, &id.flavor)
    }

    pub fn matches_deployment(&self, d: &Deployment) -> bool {
        let version = &d.source_id.version;
        matches(&self.repo, &d.source_id.location.repo)
            && matches(&self.offset, &d.source_id.location.dir)
            && matches_tag(&self.tag, version)
            && matches(&self.revision, version.build.as_str())
            && matches(&self.flavor, &d.flavor)
            && matches(&self.cluster, &d.cluster_name)
    }

    pub fn matches_deploy_state(&self, s: &DeployState) -> bool {
        self.matches_deployment(&s.deployment) && self.status.is_none_or(|st| st == s.status)
    }

    pub fn filtered_clusters(&self, clusters: &Clusters) -> Clusters {
        clusters
            .iter()
            .filter(|(name, _)| self.matches_cluster(name))
            .map(|(name, c)| (name.clone(), c.clone()))
            .collect()
    }

    /// Same manifest location in any cluster, at any version.
    pub fn location_filter(&self) -> Self {
        Self {
            cluster: None,
            tag: None,
            revision: None,
            ..self.clone()
        }
    }

    /// Same manifest and version in any cluster.
    pub fn id_filter(&self) -> Self {
        Self {
            cluster: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for ResolveFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_star = |v: &Option<String>| v.clone().unwrap_or_else(|| "*".to_string());
        write!(
            f,
            "<cluster:{} repo:{} offset:{} flavor:{} tag:{} revision:{}>",
            or_star(&self.cluster),
            or_star(&self.repo),
            or_star(&self.offset),
            or_star(&self.flavor),
            or_star(&self.tag),
            or_star(&self.revision),
        )
    }
}
