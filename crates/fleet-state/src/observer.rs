//! Injected observer for reconciler lifecycle events.
//!
//! Components never log through globals: each one holds an
//! `Arc<dyn ResolveObserver>` and reports what it did. The default method
//! bodies emit `tracing` events, so [`TracingObserver`] is just the trait
//! with nothing overridden.

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::artifact::{DeployablePair, PairKind};
use crate::ids::DeploymentId;
use crate::resolution::DiffResolution;
use crate::resolve_state::ResolveState;

pub trait ResolveObserver: Send + Sync {
    fn pair_diffed(&self, pair: &DeployablePair) {
        debug!(deployment_id = %pair.id(), kind = ?pair.kind(), "pair diffed");
    }

    fn pair_resolved(&self, stage: &str, resolution: &DiffResolution) {
        match &resolution.error {
            None => info!(
                stage,
                deployment_id = %resolution.deployment_id,
                desc = %resolution.desc,
                "pair resolved"
            ),
            Some(e) => warn!(
                stage,
                deployment_id = %resolution.deployment_id,
                desc = %resolution.desc,
                error = %e,
                retryable = e.retryable,
                "pair failed"
            ),
        }
    }

    fn phase_entered(&self, phase: &str) {
        debug!(phase, "resolve phase");
    }

    fn r11n_queued(&self, deployment_id: &DeploymentId, r11n_id: &str, position: usize) {
        debug!(%deployment_id, r11n_id, position, "rectification queued");
    }

    fn r11n_dropped(&self, deployment_id: &DeploymentId, reason: &str) {
        warn!(%deployment_id, reason, "rectification dropped");
    }

    fn r11n_completed(&self, deployment_id: &DeploymentId, r11n_id: &str, resolution: &DiffResolution) {
        info!(%deployment_id, r11n_id, desc = %resolution.desc, ok = resolution.is_ok(), "rectification completed");
    }

    fn poll_state_changed(&self, cluster: &str, from: ResolveState, to: ResolveState) {
        info!(cluster, %from, %to, "resolve state changed");
    }
}

/// Observer that only emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ResolveObserver for TracingObserver {}

pub fn tracing_observer() -> Arc<dyn ResolveObserver> {
    Arc::new(TracingObserver)
}

/// An event captured by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    Diffed(DeploymentId, PairKind),
    Resolved(String, DiffResolution),
    Phase(String),
    Queued(DeploymentId, usize),
    Dropped(DeploymentId, String),
    Completed(DeploymentId, DiffResolution),
    PollState(String, ResolveState, ResolveState),
}

/// Observer that keeps every event in memory, for assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().expect("observer lock").clone()
    }

    pub fn phases(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ObservedEvent::Phase(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ObservedEvent) {
        self.events.lock().expect("observer lock").push(event);
    }
}

impl ResolveObserver for RecordingObserver {
    fn pair_diffed(&self, pair: &DeployablePair) {
        self.push(ObservedEvent::Diffed(pair.id().clone(), pair.kind()));
    }

    fn pair_resolved(&self, stage: &str, resolution: &DiffResolution) {
        self.push(ObservedEvent::Resolved(stage.to_string(), resolution.clone()));
    }

    fn phase_entered(&self, phase: &str) {
        self.push(ObservedEvent::Phase(phase.to_string()));
    }

    fn r11n_queued(&self, deployment_id: &DeploymentId, _r11n_id: &str, position: usize) {
        self.push(ObservedEvent::Queued(deployment_id.clone(), position));
    }

    fn r11n_dropped(&self, deployment_id: &DeploymentId, reason: &str) {
        self.push(ObservedEvent::Dropped(deployment_id.clone(), reason.to_string()));
    }

    fn r11n_completed(&self, deployment_id: &DeploymentId, _r11n_id: &str, resolution: &DiffResolution) {
        self.push(ObservedEvent::Completed(deployment_id.clone(), resolution.clone()));
    }

    fn poll_state_changed(&self, cluster: &str, from: ResolveState, to: ResolveState) {
        self.push(ObservedEvent::PollState(cluster.to_string(), from, to));
    }
}
