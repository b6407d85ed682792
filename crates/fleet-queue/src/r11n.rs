//! A rectification and the handle it is queued under.

use std::fmt;
use std::sync::Arc;

use fleet_state::{DeployablePair, DeploymentId, DiffResolution};
use tokio::sync::watch;
use uuid::Uuid;

/// Unique ID handed out when a rectification is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct R11nId(Uuid);

impl R11nId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for R11nId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for R11nId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One pair waiting to be applied, plus a signal for whoever wants its
/// outcome.
#[derive(Debug)]
pub struct Rectification {
    pub pair: DeployablePair,
    done: watch::Sender<Option<DiffResolution>>,
}

impl Rectification {
    pub fn new(pair: DeployablePair) -> Self {
        let (done, _) = watch::channel(None);
        Self { pair, done }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        self.pair.id()
    }

    /// Record the outcome and wake every waiter. Later calls overwrite.
    pub fn complete(&self, resolution: DiffResolution) {
        self.done.send_replace(Some(resolution));
    }

    pub fn resolution(&self) -> Option<DiffResolution> {
        self.done.borrow().clone()
    }

    /// Block until [`Rectification::complete`] is called.
    pub async fn wait(&self) -> Option<DiffResolution> {
        let mut rx = self.done.subscribe();
        let resolution = rx.wait_for(Option::is_some).await.ok()?;
        resolution.clone()
    }
}

/// A rectification as seen in its queue: its ID and how many items are
/// ahead of it (0 means it runs next).
#[derive(Debug, Clone)]
pub struct QueuedR11n {
    pub id: R11nId,
    pub pos: usize,
    pub rectification: Arc<Rectification>,
}

impl QueuedR11n {
    pub fn deployment_id(&self) -> &DeploymentId {
        self.rectification.deployment_id()
    }
}
