//! Per-cluster polling and the resolve-state decision table.

use std::time::Duration;

use fleet_core::Shutdown;
use fleet_state::{
    Deployment, DiffResolution, ResolutionDesc, ResolveFilter, ResolveState, ResolveStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::HttpStatusClient;

/// One observation of one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub cluster: String,
    pub state: ResolveState,
    /// Start time of the cycle the server had in progress, if any.
    pub resolve_id: Option<String>,
    pub error: Option<String>,
}

/// Decide how far a cluster has got with the target, given what its
/// status server intends and the resolution it logged.
pub fn compute_state(
    id_filter: &ResolveFilter,
    intent: Option<&Deployment>,
    current: Option<&DiffResolution>,
) -> ResolveState {
    let Some(intent) = intent else {
        return ResolveState::NotStarted;
    };
    if !id_filter.matches_deployment(intent) {
        return ResolveState::NotVersion;
    }
    let Some(current) = current else {
        return ResolveState::PendingRequest;
    };
    if let Some(err) = &current.error {
        return if err.is_transient() {
            ResolveState::ErredRez
        } else {
            ResolveState::Failed
        };
    }
    match current.desc {
        ResolutionDesc::Unchanged => ResolveState::Complete,
        ResolutionDesc::Coming => ResolveState::TasksStarting,
        _ => ResolveState::InProgress,
    }
}

/// The one intended deployment matching `filter`; `None` if there are zero
/// or several.
fn server_intent<'a>(status: &'a ResolveStatus, filter: &ResolveFilter) -> Option<&'a Deployment> {
    let mut matching = status.intended.iter().filter(|d| filter.matches_deployment(d));
    let first = matching.next()?;
    if matching.next().is_some() {
        debug!(%filter, "more than one intended deployment matches");
        return None;
    }
    Some(first)
}

fn resolution_for<'a>(status: &'a ResolveStatus, filter: &ResolveFilter) -> Option<&'a DiffResolution> {
    status
        .log
        .iter()
        .find(|r| filter.matches_manifest(&r.deployment_id.manifest_id))
}

/// Polls one cluster's status server until the target settles there.
pub struct SubPoller {
    cluster: String,
    client: HttpStatusClient,
    location_filter: ResolveFilter,
    id_filter: ResolveFilter,
    http_failures: u32,
    failure_limit: u32,
}

impl SubPoller {
    pub fn new(
        cluster: impl Into<String>,
        client: HttpStatusClient,
        filter: &ResolveFilter,
        failure_limit: u32,
    ) -> Self {
        Self {
            cluster: cluster.into(),
            client,
            location_filter: filter.location_filter(),
            id_filter: filter.id_filter(),
            http_failures: 0,
            failure_limit: failure_limit.max(1),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    fn report(&self, state: ResolveState, resolve_id: Option<String>, error: Option<String>) -> PollReport {
        PollReport {
            cluster: self.cluster.clone(),
            state,
            resolve_id,
            error,
        }
    }

    fn state_for(&self, status: Option<&ResolveStatus>) -> (ResolveState, Option<String>) {
        let intent = status.and_then(|s| server_intent(s, &self.location_filter));
        let current = status.and_then(|s| resolution_for(s, &self.location_filter));
        let state = compute_state(&self.id_filter, intent, current);
        let error = current.and_then(|r| r.error.as_ref()).map(|e| e.to_string());
        if state == ResolveState::Failed {
            warn!(cluster = %self.cluster, filter = %self.location_filter, error = error.as_deref().unwrap_or(""), "deployment failed");
        }
        (state, error)
    }

    /// Fetch status once. Prefers the cycle in progress and falls back to
    /// the last completed one while the in-progress cycle has not reached
    /// the target yet.
    pub async fn poll_once(&mut self) -> PollReport {
        let mut data = match self.client.status().await {
            Ok(data) => data,
            Err(e) => {
                self.http_failures += 1;
                debug!(cluster = %self.cluster, failures = self.http_failures, error = %e, "status fetch failed");
                if self.http_failures > self.failure_limit {
                    let msg = format!("more than {} consecutive HTTP errors, giving up; latest: {e}", self.failure_limit);
                    return self.report(ResolveState::HttpFailed, None, Some(msg));
                }
                return self.report(ResolveState::ErredHttp, None, Some(e.to_string()));
            }
        };
        self.http_failures = 0;
        data.backfill_intended();

        let resolve_id = data.in_progress.as_ref().map(|s| s.started.to_rfc3339());
        let (mut state, mut error) = self.state_for(data.in_progress.as_ref());
        if matches!(
            state,
            ResolveState::NotStarted | ResolveState::NotVersion | ResolveState::PendingRequest
        ) {
            (state, error) = self.state_for(data.completed.as_ref());
        }
        self.report(state, resolve_id, error)
    }

    /// Report `NotPolled`, then poll every `interval` until a terminal
    /// state, cancellation, or the receiver going away.
    pub async fn run(mut self, tx: mpsc::Sender<PollReport>, interval: Duration, shutdown: Shutdown) {
        if tx.send(self.report(ResolveState::NotPolled, None, None)).await.is_err() {
            return;
        }
        loop {
            let report = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                report = self.poll_once() => report,
            };
            let terminal = report.state.is_terminal();
            if tx.send(report).await.is_err() || terminal {
                return;
            }
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}
