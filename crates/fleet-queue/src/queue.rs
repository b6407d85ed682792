//! Bounded FIFO of rectifications for a single deployment identity.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use fleet_state::{DeploymentId, DiffResolution, ResolveObserver};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::r11n::{QueuedR11n, R11nId, Rectification};

pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Default)]
struct QueueInner {
    queued: VecDeque<(R11nId, Arc<Rectification>)>,
    /// Popped but not yet completed.
    in_flight: HashMap<R11nId, Arc<Rectification>>,
}

/// FIFO of pending rectifications for one deployment.
///
/// The lock is only held for the list operations themselves; whoever pops
/// an item applies it outside the lock and then calls
/// [`R11nQueue::complete`].
pub struct R11nQueue {
    deployment_id: DeploymentId,
    capacity: usize,
    inner: Mutex<QueueInner>,
    available: Notify,
    observer: Arc<dyn ResolveObserver>,
}

impl R11nQueue {
    pub fn new(deployment_id: DeploymentId, capacity: usize, observer: Arc<dyn ResolveObserver>) -> Self {
        Self {
            deployment_id,
            capacity: capacity.max(1),
            inner: Mutex::new(QueueInner::default()),
            available: Notify::new(),
            observer,
        }
    }

    pub fn deployment_id(&self) -> &DeploymentId {
        &self.deployment_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue at the tail. Fails without side effects when full.
    pub fn push(&self, r11n: Rectification) -> QueueResult<QueuedR11n> {
        self.push_when(r11n, |queued| {
            (queued.len() >= self.capacity).then(|| QueueError::Full {
                deployment_id: self.deployment_id.clone(),
                capacity: self.capacity,
            })
        })
    }

    /// Enqueue only when nothing is waiting. An item already popped and in
    /// flight does not count.
    pub fn push_if_empty(&self, r11n: Rectification) -> QueueResult<QueuedR11n> {
        self.push_when(r11n, |queued| {
            (!queued.is_empty()).then(|| QueueError::NotEmpty {
                deployment_id: self.deployment_id.clone(),
            })
        })
    }

    fn push_when(
        &self,
        r11n: Rectification,
        reject: impl Fn(&VecDeque<(R11nId, Arc<Rectification>)>) -> Option<QueueError>,
    ) -> QueueResult<QueuedR11n> {
        let id = R11nId::new();
        let rectification = Arc::new(r11n);
        let pos = {
            let mut inner = self.inner.lock().expect("queue lock");
            if let Some(err) = reject(&inner.queued) {
                drop(inner);
                self.observer.r11n_dropped(&self.deployment_id, err.reason());
                return Err(err);
            }
            inner.queued.push_back((id, rectification.clone()));
            inner.queued.len() - 1
        };
        self.available.notify_one();
        self.observer
            .r11n_queued(&self.deployment_id, &id.to_string(), pos);
        Ok(QueuedR11n {
            id,
            pos,
            rectification,
        })
    }

    /// Remove the head item, if any. The item stays findable by
    /// [`R11nQueue::wait`] until completed.
    pub fn pop(&self) -> Option<QueuedR11n> {
        let mut inner = self.inner.lock().expect("queue lock");
        let (id, rectification) = inner.queued.pop_front()?;
        inner.in_flight.insert(id, rectification.clone());
        Some(QueuedR11n {
            id,
            pos: 0,
            rectification,
        })
    }

    /// Wait for an item and remove it.
    pub async fn next(&self) -> QueuedR11n {
        loop {
            let available = self.available.notified();
            if let Some(r11n) = self.pop() {
                return r11n;
            }
            available.await;
        }
    }

    /// Record the outcome of a popped item and wake its waiters.
    pub fn complete(&self, id: &R11nId, resolution: DiffResolution) {
        let rectification = self.inner.lock().expect("queue lock").in_flight.remove(id);
        match rectification {
            Some(r) => {
                self.observer
                    .r11n_completed(&self.deployment_id, &id.to_string(), &resolution);
                r.complete(resolution);
            }
            None => debug!(r11n_id = %id, deployment_id = %self.deployment_id, "completed unknown rectification"),
        }
    }

    /// A still-queued item and its current position.
    pub fn by_id(&self, id: &R11nId) -> Option<QueuedR11n> {
        let inner = self.inner.lock().expect("queue lock");
        inner
            .queued
            .iter()
            .position(|(qid, _)| qid == id)
            .map(|pos| QueuedR11n {
                id: *id,
                pos,
                rectification: inner.queued[pos].1.clone(),
            })
    }

    /// Block until the identified item is completed. `None` when the ID is
    /// unknown here: never queued, or already completed and forgotten.
    pub async fn wait(&self, id: &R11nId) -> Option<DiffResolution> {
        let rectification = {
            let inner = self.inner.lock().expect("queue lock");
            inner
                .queued
                .iter()
                .find(|(qid, _)| qid == id)
                .map(|(_, r)| r.clone())
                .or_else(|| inner.in_flight.get(id).cloned())
        }?;
        rectification.wait().await
    }

    /// Queued items in run order.
    pub fn snapshot(&self) -> Vec<QueuedR11n> {
        let inner = self.inner.lock().expect("queue lock");
        inner
            .queued
            .iter()
            .enumerate()
            .map(|(pos, (id, r))| QueuedR11n {
                id: *id,
                pos,
                rectification: r.clone(),
            })
            .collect()
    }

    /// Number of items waiting, excluding any in flight.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock").queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
