//! Queues keyed by deployment identity, optionally drained by workers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fleet_core::{QueueConfig, Shutdown, ShutdownTrigger};
use fleet_state::{DeploymentId, DiffResolution, ResolveObserver};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};
use crate::queue::{R11nQueue, DEFAULT_CAPACITY};
use crate::r11n::{QueuedR11n, R11nId, Rectification};

/// Applies one dequeued rectification.
#[async_trait]
pub trait R11nHandler: Send + Sync {
    async fn handle(&self, r11n: &QueuedR11n) -> DiffResolution;
}

struct Workers {
    handler: Arc<dyn R11nHandler>,
    runtime: Handle,
    trigger: ShutdownTrigger,
}

/// One [`R11nQueue`] per deployment identity, created on first use and
/// kept for the life of the set.
///
/// With a handler, each queue gets a worker task that takes items one at a
/// time, so at most one rectification per identity is ever in flight.
pub struct QueueSet {
    queues: Mutex<HashMap<DeploymentId, Arc<R11nQueue>>>,
    capacity: usize,
    observer: Arc<dyn ResolveObserver>,
    workers: Option<Workers>,
}

impl QueueSet {
    /// A set without workers: callers pop and complete items themselves.
    pub fn new(config: &QueueConfig, observer: Arc<dyn ResolveObserver>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            capacity: config.capacity,
            observer,
            workers: None,
        }
    }

    /// A set whose queues are drained by `handler`. Workers run on the
    /// current tokio runtime and stop when `shutdown` fires or the set is
    /// dropped.
    pub fn with_handler(
        config: &QueueConfig,
        observer: Arc<dyn ResolveObserver>,
        handler: Arc<dyn R11nHandler>,
        shutdown: &Shutdown,
    ) -> QueueResult<Self> {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;
        let (trigger, _) = shutdown.child();
        Ok(Self {
            queues: Mutex::new(HashMap::new()),
            capacity: config.capacity,
            observer,
            workers: Some(Workers {
                handler,
                runtime,
                trigger,
            }),
        })
    }

    fn queue_for(&self, id: &DeploymentId) -> Arc<R11nQueue> {
        let mut queues = self.queues.lock().expect("queue set lock");
        if let Some(q) = queues.get(id) {
            return q.clone();
        }

        let capacity = if self.capacity == 0 { DEFAULT_CAPACITY } else { self.capacity };
        let queue = Arc::new(R11nQueue::new(id.clone(), capacity, self.observer.clone()));
        if let Some(workers) = &self.workers {
            let shutdown = workers.trigger.shutdown();
            workers.runtime.spawn(run_worker(
                queue.clone(),
                workers.handler.clone(),
                shutdown,
            ));
        }
        debug!(deployment_id = %id, capacity, "created rectification queue");
        queues.insert(id.clone(), queue.clone());
        queue
    }

    pub fn push(&self, r11n: Rectification) -> QueueResult<QueuedR11n> {
        let queue = self.queue_for(r11n.deployment_id());
        queue.push(r11n)
    }

    pub fn push_if_empty(&self, r11n: Rectification) -> QueueResult<QueuedR11n> {
        let queue = self.queue_for(r11n.deployment_id());
        queue.push_if_empty(r11n)
    }

    /// Queue for `id`, if one was ever created.
    pub fn queue(&self, id: &DeploymentId) -> Option<Arc<R11nQueue>> {
        self.queues.lock().expect("queue set lock").get(id).cloned()
    }

    /// Block until the identified rectification is completed. `None` when
    /// neither the deployment's queue nor the ID is known.
    pub async fn wait(&self, id: &DeploymentId, r11n_id: &R11nId) -> Option<DiffResolution> {
        let queue = self.queue(id)?;
        queue.wait(r11n_id).await
    }

    /// Queued items per deployment, in run order.
    pub fn snapshot(&self) -> HashMap<DeploymentId, Vec<QueuedR11n>> {
        let queues: Vec<Arc<R11nQueue>> = self
            .queues
            .lock()
            .expect("queue set lock")
            .values()
            .cloned()
            .collect();
        queues
            .into_iter()
            .map(|q| (q.deployment_id().clone(), q.snapshot()))
            .collect()
    }

    /// Number of identity queues created so far.
    pub fn len(&self) -> usize {
        self.queues.lock().expect("queue set lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop all workers. Items already queued stay queued.
    pub fn stop(&self) {
        if let Some(workers) = &self.workers {
            workers.trigger.cancel();
        }
    }
}

impl Drop for QueueSet {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_worker(queue: Arc<R11nQueue>, handler: Arc<dyn R11nHandler>, shutdown: Shutdown) {
    let deployment_id = queue.deployment_id().clone();
    debug!(%deployment_id, "rectification worker started");
    loop {
        let r11n = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(%deployment_id, "rectification worker stopping");
                return;
            }
            r11n = queue.next() => r11n,
        };

        let resolution = handler.handle(&r11n).await;
        queue.complete(&r11n.id, resolution);
    }
}
