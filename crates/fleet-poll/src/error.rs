//! Poller error types.

use std::time::Duration;

use fleet_state::QueryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("invalid status server URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error on {uri}: {source}")]
    Http {
        uri: String,
        #[source]
        source: hyper::Error,
    },

    #[error("building request: {0}")]
    Request(#[from] http::Error),

    #[error("GET {uri} returned {status}")]
    Status { uri: String, status: http::StatusCode },

    #[error("decoding response from {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("GET {uri} timed out after {timeout:?}")]
    Timeout { uri: String, timeout: Duration },

    #[error("reading intended state: {0}")]
    State(#[from] QueryError),
}

pub type PollResult<T> = Result<T, PollError>;
