//! Identity types: where source lives, which manifest, which deployment.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository plus an optional offset (subdirectory) within it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceLocation {
    pub repo: String,
    #[serde(default)]
    pub dir: String,
}

impl SourceLocation {
    pub fn new(repo: impl Into<String>, dir: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            dir: dir.into(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dir.is_empty() {
            write!(f, "{}", self.repo)
        } else {
            write!(f, "{},{}", self.repo, self.dir)
        }
    }
}

/// A source location and flavor: one manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestId {
    pub source: SourceLocation,
    #[serde(default)]
    pub flavor: String,
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flavor.is_empty() {
            write!(f, "{}", self.source)
        } else {
            write!(f, "{}~{}", self.source, self.flavor)
        }
    }
}

/// Globally unique key for one deployment: a manifest in a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeploymentId {
    #[serde(rename = "ManifestID")]
    pub manifest_id: ManifestId,
    pub cluster: String,
}

impl DeploymentId {
    pub fn new(repo: &str, dir: &str, flavor: &str, cluster: &str) -> Self {
        Self {
            manifest_id: ManifestId {
                source: SourceLocation::new(repo, dir),
                flavor: flavor.to_string(),
            },
            cluster: cluster.to_string(),
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.manifest_id.source
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.manifest_id, self.cluster)
    }
}

/// A source location pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceId {
    pub location: SourceLocation,
    pub version: semver::Version,
}

impl SourceId {
    pub fn new(repo: &str, dir: &str, version: semver::Version) -> Self {
        Self {
            location: SourceLocation::new(repo, dir),
            version,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.location, self.version)
    }
}
