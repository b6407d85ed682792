//! Convergence progress of one deployment target.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Totally ordered: a later variant is further along. Everything from
/// [`ResolveState::NotIntended`] on is terminal; `ErredHttp` and `ErredRez`
/// sort just below and keep being polled.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ResolveState {
    #[default]
    NotPolled,
    NotStarted,
    NotVersion,
    PendingRequest,
    InProgress,
    TasksStarting,
    ErredHttp,
    ErredRez,
    NotIntended,
    Complete,
    Failed,
    HttpFailed,
}

impl ResolveState {
    /// First terminal state.
    pub const TERMINALS: ResolveState = ResolveState::NotIntended;

    pub fn is_terminal(self) -> bool {
        self >= Self::TERMINALS
    }

    pub fn is_success(self) -> bool {
        self == ResolveState::Complete
    }

    /// Human-readable explanation for progress displays.
    pub fn prose(self) -> &'static str {
        match self {
            ResolveState::NotPolled => "No data from server yet",
            ResolveState::NotStarted => "Waiting for server to begin resolution",
            ResolveState::NotVersion => "Waiting for server to acknowledge new version",
            ResolveState::PendingRequest => "Waiting for request to be made to cluster",
            ResolveState::InProgress => "Waiting for cluster to acknowledge deploy request",
            ResolveState::TasksStarting => {
                "Cluster has accepted deploy request, awaiting service boot"
            }
            ResolveState::ErredHttp => "HTTP request to status server errored",
            ResolveState::ErredRez => "Transient error on server, retrying",
            ResolveState::NotIntended => {
                "Server does not intend to deploy this version, probably superseded by another request"
            }
            ResolveState::Complete => "Deployment resolution is complete",
            ResolveState::Failed => "The attempt to resolve this deployment failed",
            ResolveState::HttpFailed => "HTTP connection to the status server has failed",
        }
    }
}

impl fmt::Display for ResolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolveState::NotPolled => "ResolveNotPolled",
            ResolveState::NotStarted => "ResolveNotStarted",
            ResolveState::NotVersion => "ResolveNotVersion",
            ResolveState::PendingRequest => "ResolvePendingRequest",
            ResolveState::InProgress => "ResolveInProgress",
            ResolveState::TasksStarting => "ResolveTasksStarting",
            ResolveState::ErredHttp => "ResolveErredHTTP",
            ResolveState::ErredRez => "ResolveErredRez",
            ResolveState::NotIntended => "ResolveNotIntended",
            ResolveState::Complete => "ResolveComplete",
            ResolveState::Failed => "ResolveFailed",
            ResolveState::HttpFailed => "ResolveHTTPFailed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_tracks_progress() {
        assert!(ResolveState::NotPolled < ResolveState::NotStarted);
        assert!(ResolveState::NotStarted < ResolveState::NotVersion);
        assert!(ResolveState::NotVersion < ResolveState::PendingRequest);
        assert!(ResolveState::PendingRequest < ResolveState::InProgress);
        assert!(ResolveState::InProgress < ResolveState::TasksStarting);
        assert!(ResolveState::TasksStarting < ResolveState::NotIntended);
    }

    #[test]
    fn terminal_threshold() {
        assert!(!ResolveState::TasksStarting.is_terminal());
        assert!(!ResolveState::ErredHttp.is_terminal());
        assert!(!ResolveState::ErredRez.is_terminal());
        for s in [
            ResolveState::NotIntended,
            ResolveState::Complete,
            ResolveState::Failed,
            ResolveState::HttpFailed,
        ] {
            assert!(s.is_terminal(), "{s} should be terminal");
        }
    }

    #[test]
    fn min_is_slowest() {
        let states = [ResolveState::Complete, ResolveState::InProgress, ResolveState::Failed];
        assert_eq!(states.iter().min(), Some(&ResolveState::InProgress));
    }
}
