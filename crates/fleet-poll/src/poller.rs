//! Fan-out over clusters and aggregation of their resolve states.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{PollerConfig, Shutdown};
use fleet_state::{ResolveFilter, ResolveObserver, ResolveState, StateReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::client::HttpStatusClient;
use crate::error::PollResult;
use crate::subpoller::SubPoller;

/// Watches a deployment target converge across every cluster that intends
/// it. Progress is the minimum state over those clusters.
pub struct StatusPoller {
    client: HttpStatusClient,
    state: Arc<dyn StateReader>,
    filter: ResolveFilter,
    interval: Duration,
    request_timeout: Duration,
    failure_limit: u32,
    observer: Arc<dyn ResolveObserver>,
    progress: watch::Sender<ResolveState>,
}

impl StatusPoller {
    /// `client` points at the server that lists the status servers.
    pub fn new(
        client: HttpStatusClient,
        state: Arc<dyn StateReader>,
        filter: ResolveFilter,
        config: &PollerConfig,
        observer: Arc<dyn ResolveObserver>,
    ) -> Self {
        let (progress, _) = watch::channel(ResolveState::NotPolled);
        Self {
            client,
            state,
            filter,
            interval: config.interval(),
            request_timeout: config.request_timeout(),
            failure_limit: config.http_failure_limit,
            observer,
            progress,
        }
    }

    /// Aggregate progress as it changes.
    pub fn watch(&self) -> watch::Receiver<ResolveState> {
        self.progress.subscribe()
    }

    fn publish(&self, state: ResolveState) {
        self.progress.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Poll until every cluster reaches a terminal state and return the
    /// aggregate. Cancelling `shutdown` stops every sub-poller and returns
    /// the aggregate reached so far.
    pub async fn wait(&self, shutdown: Shutdown) -> PollResult<ResolveState> {
        let servers = self.client.servers().await?;
        let state = self.state.read_state().await?;

        let intended = state.intended.filter(|d| self.filter.matches_deployment(d));
        if intended.is_empty() {
            info!(filter = %self.filter, "no intended deployment matches");
            self.publish(ResolveState::NotIntended);
            return Ok(ResolveState::NotIntended);
        }

        let mut subs = Vec::new();
        for server in servers.servers {
            if !self.filter.matches_cluster(&server.cluster_name) {
                debug!(cluster = %server.cluster_name, "cluster not requested for polling");
                continue;
            }
            if intended.single(|d| d.cluster_name == server.cluster_name).is_none() {
                debug!(cluster = %server.cluster_name, filter = %self.filter, "cluster does not intend target");
                continue;
            }
            let client = HttpStatusClient::new(&server.url, self.request_timeout)?;
            subs.push(SubPoller::new(
                server.cluster_name,
                client,
                &self.filter,
                self.failure_limit,
            ));
        }
        if subs.is_empty() {
            info!(filter = %self.filter, "no status server for any intending cluster");
            self.publish(ResolveState::NotIntended);
            return Ok(ResolveState::NotIntended);
        }

        Ok(self.poll(subs, shutdown).await)
    }

    async fn poll(&self, subs: Vec<SubPoller>, shutdown: Shutdown) -> ResolveState {
        let (sub_trigger, sub_shutdown) = shutdown.child();
        let (tx, mut rx) = mpsc::channel(subs.len() * 2);

        let mut states: BTreeMap<String, ResolveState> = BTreeMap::new();
        for sub in subs {
            states.insert(sub.cluster().to_string(), ResolveState::NotPolled);
            info!(cluster = %sub.cluster(), "starting sub-poller");
            tokio::spawn(sub.run(tx.clone(), self.interval, sub_shutdown.clone()));
        }
        drop(tx);

        let mut total = ResolveState::NotPolled;
        self.publish(total);
        loop {
            let report = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                report = rx.recv() => match report {
                    Some(report) => report,
                    None => break,
                },
            };

            let prior = states
                .insert(report.cluster.clone(), report.state)
                .unwrap_or_default();
            if prior != report.state {
                self.observer
                    .poll_state_changed(&report.cluster, prior, report.state);
            }
            if let Some(error) = &report.error {
                debug!(cluster = %report.cluster, state = %report.state, error, "poll report");
            }

            total = states.values().copied().min().unwrap_or_default();
            self.publish(total);
            if total.is_terminal() {
                break;
            }
        }
        sub_trigger.cancel();
        info!(state = %total, "polling finished");
        total
    }
}
