//! Read-mostly keyed collections of deployments.
//!
//! Readers copy out a point-in-time map with [`Snapshot::snapshot`];
//! writers take the exclusive lock only for the insert. Values handed out
//! are copies, so mutating them never feeds back into the collection.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::deployment::{DeployState, Deployment};
use crate::error::{StateError, StateResult};
use crate::ids::DeploymentId;

/// Anything keyed by a [`DeploymentId`].
pub trait Keyed: Clone {
    fn key(&self) -> DeploymentId;
}

impl Keyed for Deployment {
    fn key(&self) -> DeploymentId {
        self.id()
    }
}

impl Keyed for DeployState {
    fn key(&self) -> DeploymentId {
        self.id()
    }
}

/// Unique-keyed collection guarded by a read/write lock.
#[derive(Debug)]
pub struct Snapshot<T> {
    inner: RwLock<BTreeMap<DeploymentId, T>>,
}

/// Intended or observed deployments.
pub type Deployments = Snapshot<Deployment>;

/// Observed deployments with their live status.
pub type DeployStates = Snapshot<DeployState>;

impl<T: Keyed> Snapshot<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert a value, rejecting a key that is already present.
    pub fn add(&self, value: T) -> StateResult<()> {
        let key = value.key();
        let mut inner = self.inner.write().expect("snapshot lock");
        if inner.contains_key(&key) {
            return Err(StateError::DuplicateDeployment(key));
        }
        inner.insert(key, value);
        Ok(())
    }

    /// Insert a value whose key the caller guarantees is unique.
    ///
    /// # Panics
    ///
    /// On a duplicate key: that is a bug in whoever assembled the snapshot.
    pub fn must_add(&self, value: T) {
        if let Err(e) = self.add(value) {
            panic!("{e}");
        }
    }

    pub fn get(&self, id: &DeploymentId) -> Option<T> {
        self.inner.read().expect("snapshot lock").get(id).cloned()
    }

    pub fn contains(&self, id: &DeploymentId) -> bool {
        self.inner.read().expect("snapshot lock").contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("snapshot lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of the whole collection.
    pub fn snapshot(&self) -> BTreeMap<DeploymentId, T> {
        self.inner.read().expect("snapshot lock").clone()
    }

    pub fn values(&self) -> Vec<T> {
        self.inner
            .read()
            .expect("snapshot lock")
            .values()
            .cloned()
            .collect()
    }

    /// New collection holding the values `pred` accepts.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Self {
        let inner = self.inner.read().expect("snapshot lock");
        let kept = inner
            .iter()
            .filter(|(_, v)| pred(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            inner: RwLock::new(kept),
        }
    }

    /// The one value `pred` accepts, or `None` when zero or several match.
    pub fn single(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        let inner = self.inner.read().expect("snapshot lock");
        let mut matches = inner.values().filter(|v| pred(v));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first.clone())
    }
}

impl<T: Keyed> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: RwLock::new(self.snapshot()),
        }
    }
}

impl<T: Keyed> FromIterator<T> for Snapshot<T> {
    /// Panics on duplicate keys, like [`Snapshot::must_add`].
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let snapshot = Self::new();
        for value in iter {
            snapshot.must_add(value);
        }
        snapshot
    }
}

impl DeployStates {
    /// Drop the live status, leaving just the deployments.
    pub fn ignoring_status(&self) -> Deployments {
        let inner = self.inner.read().expect("snapshot lock");
        let deployments = inner
            .iter()
            .map(|(k, s)| (k.clone(), s.deployment.clone()))
            .collect();
        Snapshot {
            inner: RwLock::new(deployments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::tests::test_deployment;
    use crate::deployment::DeployStatus;

    #[test]
    fn add_rejects_duplicates() {
        let deployments = Deployments::new();
        deployments.add(test_deployment("r", "c", 1)).unwrap();
        let err = deployments.add(test_deployment("r", "c", 2)).unwrap_err();
        assert!(matches!(err, StateError::DuplicateDeployment(_)));
        assert_eq!(deployments.len(), 1);
    }

    #[test]
    #[should_panic(expected = "duplicate deployment")]
    fn must_add_panics_on_duplicate() {
        let deployments = Deployments::new();
        deployments.must_add(test_deployment("r", "c", 1));
        deployments.must_add(test_deployment("r", "c", 1));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let deployments = Deployments::new();
        deployments.must_add(test_deployment("r", "c", 1));
        let mut copy = deployments.snapshot();
        for d in copy.values_mut() {
            d.deploy_config.num_instances = 9;
        }
        let id = test_deployment("r", "c", 1).id();
        assert_eq!(deployments.get(&id).unwrap().num_instances(), 1);
    }

    #[test]
    fn filter_and_single() {
        let deployments: Deployments = [
            test_deployment("a", "east", 1),
            test_deployment("a", "west", 1),
            test_deployment("b", "east", 1),
        ]
        .into_iter()
        .collect();

        let east = deployments.filter(|d| d.cluster_name == "east");
        assert_eq!(east.len(), 2);

        assert!(deployments.single(|d| d.source_id.location.repo == "a").is_none());
        let b = deployments.single(|d| d.source_id.location.repo == "b").unwrap();
        assert_eq!(b.cluster_name, "east");
        assert!(deployments.single(|d| d.cluster_name == "north").is_none());
    }

    #[test]
    fn ignoring_status_keeps_keys() {
        let states = DeployStates::new();
        states.must_add(DeployState {
            deployment: test_deployment("r", "c", 2),
            status: DeployStatus::Active,
        });
        let deployments = states.ignoring_status();
        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments.values()[0].num_instances(), 2);
    }
}
