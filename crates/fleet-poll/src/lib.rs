//! fleet-poll — waits for a deployment to converge on every cluster.
//!
//! # Architecture
//!
//! ```text
//! StatusPoller ──GET /servers──► ServerList { cluster → status URL }
//!      │        StateReader ───► intended deployments (filtered)
//!      │
//!      ├── SubPoller(east) ──GET /status every interval──┐
//!      ├── SubPoller(west) ──GET /status every interval──┤ PollReport
//!      ▼                                                 ▼
//!  min(ResolveState) over clusters ──► watch::Receiver<ResolveState>
//! ```
//!
//! A sub-poller stops once its cluster reaches a terminal state; the
//! status poller stops once the minimum is terminal.

pub mod client;
pub mod error;
pub mod poller;
pub mod subpoller;

pub use client::HttpStatusClient;
pub use error::{PollError, PollResult};
pub use poller::StatusPoller;
pub use subpoller::{compute_state, PollReport, SubPoller};
