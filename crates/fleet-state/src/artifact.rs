//! Build artifacts and the resolvable unit built around them.

use serde::{Deserialize, Serialize};

use crate::deployment::{DeployStatus, Deployment, Difference};
use crate::ids::DeploymentId;

/// Quality kind whose names a cluster must whitelist.
pub const ADVISORY: &str = "advisory";

/// A tag on a build artifact, e.g. an advisory that the build came from a
/// dirty workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Quality {
    pub name: String,
    pub kind: String,
}

impl Quality {
    pub fn advisory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ADVISORY.to_string(),
        }
    }

    pub fn is_advisory(&self) -> bool {
        self.kind == ADVISORY && !self.name.is_empty()
    }
}

/// An opaque reference to something a cluster can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BuildArtifact {
    /// Address or digest understood by the cluster.
    pub name: String,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub qualities: Vec<Quality>,
}

impl BuildArtifact {
    pub fn docker(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "docker".to_string(),
            qualities: Vec::new(),
        }
    }

    pub fn advisories(&self) -> impl Iterator<Item = &str> {
        self.qualities
            .iter()
            .filter(|q| q.is_advisory())
            .map(|q| q.name.as_str())
    }
}

/// A deployment, the artifact it runs (once resolved), and its live status.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployable {
    pub deployment: Deployment,
    pub artifact: Option<BuildArtifact>,
    pub status: DeployStatus,
}

impl Deployable {
    pub fn new(deployment: Deployment) -> Self {
        Self {
            deployment,
            artifact: None,
            status: DeployStatus::Unknown,
        }
    }

    pub fn with_status(deployment: Deployment, status: DeployStatus) -> Self {
        Self {
            deployment,
            artifact: None,
            status,
        }
    }

    pub fn id(&self) -> DeploymentId {
        self.deployment.id()
    }
}

/// How a pair's two sides relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairKind {
    Same,
    Added,
    Removed,
    Modified,
}

/// Observed (`prior`) and intended (`post`) sides of one deployment
/// identity. The kind is always derived from the current sides, never
/// stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployablePair {
    id: DeploymentId,
    pub prior: Option<Deployable>,
    pub post: Option<Deployable>,
}

impl DeployablePair {
    /// Pair for an intended deployment nothing is running yet.
    pub fn added(post: Deployable) -> Self {
        Self {
            id: post.id(),
            prior: None,
            post: Some(post),
        }
    }

    /// Pair for a running deployment nobody intends any more.
    pub fn removed(prior: Deployable) -> Self {
        Self {
            id: prior.id(),
            prior: Some(prior),
            post: None,
        }
    }

    /// Pair with both sides present. Same or Modified depending on content.
    pub fn both(prior: Deployable, post: Deployable) -> Self {
        Self {
            id: post.id(),
            prior: Some(prior),
            post: Some(post),
        }
    }

    pub fn id(&self) -> &DeploymentId {
        &self.id
    }

    pub fn diffs(&self) -> Vec<Difference> {
        match (&self.prior, &self.post) {
            (Some(prior), Some(post)) => prior.deployment.diff(&post.deployment),
            _ => Vec::new(),
        }
    }

    /// Classify the pair from its current sides.
    ///
    /// # Panics
    ///
    /// When both `prior` and `post` are `None`. The constructors never
    /// build such a pair; clearing both sides by hand is a caller bug.
    pub fn kind(&self) -> PairKind {
        match (&self.prior, &self.post) {
            (None, Some(_)) => PairKind::Added,
            (Some(_), None) => PairKind::Removed,
            (Some(_), Some(_)) if self.diffs().is_empty() => PairKind::Same,
            (Some(_), Some(_)) => PairKind::Modified,
            (None, None) => unreachable!("pair {} has neither side", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::tests::test_deployment;

    #[test]
    fn kind_follows_sides() {
        let d = test_deployment("r", "c", 1);
        assert_eq!(DeployablePair::added(Deployable::new(d.clone())).kind(), PairKind::Added);
        assert_eq!(DeployablePair::removed(Deployable::new(d.clone())).kind(), PairKind::Removed);
        assert_eq!(
            DeployablePair::both(Deployable::new(d.clone()), Deployable::new(d.clone())).kind(),
            PairKind::Same
        );
    }

    #[test]
    fn kind_recomputed_after_edit() {
        let d = test_deployment("r", "c", 1);
        let mut pair = DeployablePair::both(Deployable::new(d.clone()), Deployable::new(d));
        assert_eq!(pair.kind(), PairKind::Same);
        if let Some(post) = pair.post.as_mut() {
            post.deployment.deploy_config.num_instances = 4;
        }
        assert_eq!(pair.kind(), PairKind::Modified);
    }

    #[test]
    #[should_panic(expected = "has neither side")]
    fn kind_of_emptied_pair_panics() {
        let mut pair = DeployablePair::added(Deployable::new(test_deployment("r", "c", 1)));
        pair.post = None;
        pair.kind();
    }

    #[test]
    fn only_named_advisories_count() {
        let mut artifact = BuildArtifact::docker("registry/acme/web:1.0.0");
        artifact.qualities = vec![
            Quality::advisory("dirty_workspace"),
            Quality { name: String::new(), kind: ADVISORY.into() },
            Quality { name: "fast".into(), kind: "perf".into() },
        ];
        let names: Vec<&str> = artifact.advisories().collect();
        assert_eq!(names, vec!["dirty_workspace"]);
    }
}
