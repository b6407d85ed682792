//! Stage composition for the resolution pipeline.
//!
//! ```text
//!            pairs ──►┌────────┐── pairs ──►┌────────┐── pairs ──► …
//!                     │ stage  │            │ stage  │
//!      resolutions ──►└────────┘── resolutions (upstream + own) ──► …
//! ```
//!
//! A stage either forwards a pair downstream or finishes it with a
//! [`DiffResolution`]. Upstream resolutions pass through untouched. Both
//! downstream channels close once upstream is exhausted and in-flight
//! work has drained, or when the cycle's shutdown fires.

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::Shutdown;
use fleet_state::{DeployablePair, DiffResolution, ResolveObserver};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// What a stage decided for one pair.
#[derive(Debug)]
pub enum Outcome {
    /// Hand the (possibly enriched) pair to the next stage.
    Forward(DeployablePair),
    /// Stop here; this is the pair's final outcome.
    Finish(DiffResolution),
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, pair: DeployablePair) -> Outcome;
}

/// The two channels connecting adjacent stages.
pub struct Streams {
    pub pairs: mpsc::Receiver<DeployablePair>,
    pub resolutions: mpsc::Receiver<DiffResolution>,
}

impl Streams {
    /// Head of a pipeline: pairs from `pairs`, no resolutions yet.
    pub fn source(pairs: mpsc::Receiver<DeployablePair>) -> Self {
        let (_tx, resolutions) = mpsc::channel(1);
        Self { pairs, resolutions }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    /// Pairs processed at once by this stage.
    pub concurrency: usize,
    /// Buffer of each downstream channel.
    pub buffer: usize,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            buffer: 10,
        }
    }
}

async fn send_or_cancel<T>(tx: &mpsc::Sender<T>, item: T, shutdown: &Shutdown) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}

/// Spawn `stage` between `upstream` and a fresh pair of downstream
/// channels.
pub fn run_stage(
    stage: Arc<dyn Stage>,
    upstream: Streams,
    options: StageOptions,
    shutdown: Shutdown,
    observer: Arc<dyn ResolveObserver>,
) -> Streams {
    let (pair_tx, pair_rx) = mpsc::channel(options.buffer.max(1));
    let (rez_tx, rez_rx) = mpsc::channel(options.buffer.max(1));
    let Streams {
        mut pairs,
        mut resolutions,
    } = upstream;

    {
        let rez_tx = rez_tx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let rez = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return,
                    rez = resolutions.recv() => match rez {
                        Some(rez) => rez,
                        None => return,
                    },
                };
                if !send_or_cancel(&rez_tx, rez, &shutdown).await {
                    return;
                }
            }
        });
    }

    tokio::spawn(async move {
        let name = stage.name();
        let limit = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        loop {
            let pair = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                pair = pairs.recv() => match pair {
                    Some(pair) => pair,
                    None => break,
                },
            };
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let stage = stage.clone();
            let pair_tx = pair_tx.clone();
            let rez_tx = rez_tx.clone();
            let shutdown = shutdown.clone();
            let observer = observer.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let id = pair.id().clone();
                let delivered = match stage.process(pair).await {
                    Outcome::Forward(pair) => send_or_cancel(&pair_tx, pair, &shutdown).await,
                    Outcome::Finish(rez) => {
                        observer.pair_resolved(stage.name(), &rez);
                        send_or_cancel(&rez_tx, rez, &shutdown).await
                    }
                };
                if !delivered {
                    debug!(stage = stage.name(), deployment_id = %id, "downstream closed, dropping outcome");
                }
            });

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!(stage = name, error = %e, "stage task failed");
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(stage = name, error = %e, "stage task failed");
            }
        }
        if shutdown.is_cancelled() {
            warn!(stage = name, "stage stopped by cancellation");
        } else {
            debug!(stage = name, "stage drained");
        }
    });

    Streams {
        pairs: pair_rx,
        resolutions: rez_rx,
    }
}

/// Drain the tail of a pipeline. Pairs still arriving here were never
/// finished by any stage; they are reported and dropped.
pub async fn collect(mut tail: Streams, mut on_resolution: impl FnMut(DiffResolution)) {
    let mut pairs_open = true;
    let mut resolutions_open = true;
    while pairs_open || resolutions_open {
        tokio::select! {
            pair = tail.pairs.recv(), if pairs_open => match pair {
                Some(pair) => warn!(deployment_id = %pair.id(), "pair left the pipeline unresolved"),
                None => pairs_open = false,
            },
            rez = tail.resolutions.recv(), if resolutions_open => match rez {
                Some(rez) => on_resolution(rez),
                None => resolutions_open = false,
            },
        }
    }
}
