//! Diff engine: classify every deployment identity across the intended and
//! observed snapshots.
//!
//! ```text
//! observed ──┐
//!            ├─► for each observed key: Removed | Same | Modified
//! intended ──┘   then every unclaimed intended key: Added
//! ```
//!
//! Each key of the union appears in the output exactly once. No order is
//! promised across keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet_core::Shutdown;
use tokio::sync::mpsc;
use tracing::debug;

use crate::artifact::{DeployablePair, Deployable};
use crate::deployment::{DeployState, Deployment};
use crate::ids::DeploymentId;
use crate::observer::ResolveObserver;
use crate::snapshot::{DeployStates, Deployments};

/// Pair up two point-in-time snapshots.
pub fn diff_pairs(
    intended: BTreeMap<DeploymentId, Deployment>,
    existing: BTreeMap<DeploymentId, DeployState>,
) -> Vec<DeployablePair> {
    let mut remaining = intended;
    let mut pairs = Vec::with_capacity(existing.len() + remaining.len());

    for (id, observed) in existing {
        let prior = Deployable::with_status(observed.deployment, observed.status);
        match remaining.remove(&id) {
            None => pairs.push(DeployablePair::removed(prior)),
            Some(want) => pairs.push(DeployablePair::both(prior, Deployable::new(want))),
        }
    }

    pairs.extend(
        remaining
            .into_values()
            .map(|want| DeployablePair::added(Deployable::new(want))),
    );
    pairs
}

/// Snapshot both collections and diff them.
pub fn diff(intended: &Deployments, existing: &DeployStates) -> Vec<DeployablePair> {
    diff_pairs(intended.snapshot(), existing.snapshot())
}

/// Produce the diff on a bounded channel from a background task.
///
/// The channel closes once every pair is sent, or early if `shutdown`
/// fires or the receiver goes away.
pub fn spawn_diff(
    intended: &Deployments,
    existing: &DeployStates,
    buffer: usize,
    shutdown: Shutdown,
    observer: Arc<dyn ResolveObserver>,
) -> mpsc::Receiver<DeployablePair> {
    let pairs = diff(intended, existing);
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::spawn(async move {
        let total = pairs.len();
        for pair in pairs {
            observer.pair_diffed(&pair);
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("diff producer cancelled");
                    return;
                }
                sent = tx.send(pair) => {
                    if sent.is_err() {
                        debug!("diff consumer went away");
                        return;
                    }
                }
            }
        }
        debug!(pairs = total, "diff complete");
    });

    rx
}
