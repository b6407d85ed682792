//! The auto-resolver: resolve cycles on a timer or on demand.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleet_core::{FleetConfig, Shutdown, ShutdownTrigger};
use fleet_state::{ResolveStatus, StateReader, StatusData};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::recorder::ResolveRecorder;
use crate::resolver::Resolver;

#[derive(Default)]
struct Statuses {
    stable: Option<ResolveStatus>,
    live: Option<Arc<ResolveRecorder>>,
}

/// Runs a [`Resolver`] cycle every update interval, or sooner when
/// [`AutoResolver::trigger`] is called. At most one cycle runs at a time.
pub struct AutoResolver {
    resolver: Resolver,
    state: Arc<dyn StateReader>,
    interval: Duration,
    statuses: Arc<Mutex<Statuses>>,
    wake: Arc<Notify>,
    trigger: ShutdownTrigger,
    shutdown: Shutdown,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AutoResolver {
    pub fn new(resolver: Resolver, state: Arc<dyn StateReader>, config: &FleetConfig) -> Self {
        let (trigger, shutdown) = fleet_core::scope();
        Self {
            resolver,
            state,
            interval: config.resolver.update_interval(),
            statuses: Arc::new(Mutex::new(Statuses::default())),
            wake: Arc::new(Notify::new()),
            trigger,
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Spawn the resolve loop on the current runtime. A second call while
    /// the loop is running does nothing.
    pub fn start(&self) {
        let mut task = self.task.lock().expect("auto-resolver lock");
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        *task = Some(tokio::spawn(resolve_loop(
            self.resolver.clone(),
            self.state.clone(),
            self.interval,
            self.statuses.clone(),
            self.wake.clone(),
            self.shutdown.clone(),
        )));
    }

    /// Start the next cycle now instead of at the end of the interval.
    /// Triggers during a cycle coalesce into one follow-up cycle.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Last finished cycle and the one in progress, if any.
    pub fn statuses(&self) -> (Option<ResolveStatus>, Option<ResolveStatus>) {
        let statuses = self.statuses.lock().expect("auto-resolver lock");
        (
            statuses.stable.clone(),
            statuses.live.as_ref().map(|r| r.status()),
        )
    }

    /// The `/status` view of this resolver.
    pub fn status_data(&self) -> StatusData {
        let (completed, in_progress) = self.statuses();
        let deployments = in_progress
            .as_ref()
            .or(completed.as_ref())
            .map(|s| s.intended.clone())
            .unwrap_or_default();
        StatusData {
            deployments,
            completed,
            in_progress,
        }
    }

    /// Cancel the running cycle, if any, and wait for the loop to exit.
    pub async fn stop(&self) {
        self.trigger.cancel();
        let task = self.task.lock().expect("auto-resolver lock").take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "auto-resolver loop failed");
            }
        }
    }
}

impl Drop for AutoResolver {
    fn drop(&mut self) {
        self.trigger.cancel();
    }
}

async fn resolve_loop(
    resolver: Resolver,
    state: Arc<dyn StateReader>,
    interval: Duration,
    statuses: Arc<Mutex<Statuses>>,
    wake: Arc<Notify>,
    shutdown: Shutdown,
) {
    info!(interval_ms = interval.as_millis() as u64, "auto-resolver started");
    while !shutdown.is_cancelled() {
        match state.read_state().await {
            Ok(current) => {
                let recorder = Arc::new(resolver.begin(
                    current.intended,
                    current.clusters,
                    shutdown.clone(),
                ));
                statuses.lock().expect("auto-resolver lock").live = Some(recorder.clone());

                let result = recorder.wait().await;
                let finished = recorder.status();
                let mut guard = statuses.lock().expect("auto-resolver lock");
                guard.live = None;
                match result {
                    Ok(_) => debug!(resolved = finished.log.len(), "cycle stored as stable"),
                    Err(e) => warn!(error = %e, errors = finished.errors.len(), "resolve cycle failed"),
                }
                // A failed cycle still replaces the stable status, so its
                // errors are what `/status` reports.
                guard.stable = Some(finished);
            }
            Err(e) => warn!(error = %e, "reading intended state failed"),
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = wake.notified() => debug!("resolve triggered"),
            _ = tokio::time::sleep(interval) => {}
        }
    }
    info!("auto-resolver stopped");
}
