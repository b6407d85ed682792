//! Live record of one resolve cycle.

use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use fleet_state::{
    Deployment, DiffResolution, ResolveError, ResolveErrorKind, ResolveObserver, ResolveStatus,
};
use tokio::task::JoinHandle;

use crate::error::{ResolveCycleError, ResolveCycleResult};

struct Shared {
    status: RwLock<ResolveStatus>,
    observer: Arc<dyn ResolveObserver>,
}

impl Shared {
    fn finish(&self, result: &ResolveCycleResult<()>) {
        let mut status = self.status.write().expect("recorder lock");
        if let Err(e) = result {
            status.errors.push(ResolveError::new(
                ResolveErrorKind::Other,
                e.to_string(),
                e.is_retryable(),
            ));
        }
        status.finished = Some(Utc::now());
    }
}

/// Write side handed to the body of a cycle.
#[derive(Clone)]
pub struct PhaseLog {
    shared: Arc<Shared>,
}

impl PhaseLog {
    pub fn phase(&self, name: &str) {
        self.shared.status.write().expect("recorder lock").phase = name.to_string();
        self.shared.observer.phase_entered(name);
    }

    pub fn set_intended(&self, intended: Vec<Deployment>) {
        self.shared.status.write().expect("recorder lock").intended = intended;
    }

    /// Append a pair's outcome; its error, if any, also lands in the error
    /// list. Successes are never dropped in favour of failures.
    pub fn log(&self, resolution: DiffResolution) {
        let mut status = self.shared.status.write().expect("recorder lock");
        if let Some(e) = &resolution.error {
            status.errors.push(e.clone());
        }
        status.log.push(resolution);
    }
}

/// Handle on a running resolve cycle: poll [`ResolveRecorder::status`]
/// while it runs, [`ResolveRecorder::wait`] for the final record.
pub struct ResolveRecorder {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<ResolveCycleResult<()>>>>,
}

impl ResolveRecorder {
    /// Spawn `body` as a new cycle. Must be called inside a tokio runtime.
    pub fn begin<F, Fut>(observer: Arc<dyn ResolveObserver>, body: F) -> Self
    where
        F: FnOnce(PhaseLog) -> Fut,
        Fut: Future<Output = ResolveCycleResult<()>> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            status: RwLock::new(ResolveStatus::new(Utc::now())),
            observer,
        });
        let body = body(PhaseLog {
            shared: shared.clone(),
        });
        let finisher = shared.clone();
        let task = tokio::spawn(async move {
            let result = body.await;
            finisher.finish(&result);
            result
        });
        Self {
            shared,
            task: Mutex::new(Some(task)),
        }
    }

    /// Point-in-time copy of the cycle's record.
    pub fn status(&self) -> ResolveStatus {
        self.shared.status.read().expect("recorder lock").clone()
    }

    pub fn done(&self) -> bool {
        self.shared.status.read().expect("recorder lock").is_finished()
    }

    /// Wait for the cycle to end and return its final record.
    ///
    /// # Panics
    ///
    /// If called more than once: the result can only be taken once.
    pub async fn wait(&self) -> ResolveCycleResult<ResolveStatus> {
        let task = self.task.lock().expect("recorder lock").take();
        let Some(task) = task else {
            panic!("ResolveRecorder::wait called after the result was taken");
        };
        match task.await {
            Ok(Ok(())) => Ok(self.status()),
            Ok(Err(e)) => Err(e),
            Err(join) => {
                let err = ResolveCycleError::Aborted(join.to_string());
                self.shared.finish(&Err(err.clone()));
                Err(err)
            }
        }
    }
}
