//! fleet-core — shared plumbing for the fleet reconciler crates.
//!
//! Nothing in here knows about deployments. It provides:
//!
//! - [`FleetConfig`], the `fleet.toml` configuration tree with humane
//!   duration strings (`"60s"`, `"500ms"`).
//! - [`Shutdown`] / [`ShutdownTrigger`], a watch-channel cancellation
//!   scope. One scope governs one resolve cycle; child scopes fire when
//!   their parent fires.
//! - [`retry`], a fixed-backoff retry loop for retry-eligible failures.

pub mod config;
pub mod error;
pub mod retry;
pub mod shutdown;

pub use config::{parse_duration, FleetConfig, PollerConfig, QueueConfig, ResolverConfig, RetryConfig};
pub use error::{ConfigError, ConfigResult};
pub use retry::{retry, RetryPolicy};
pub use shutdown::{scope, Shutdown, ShutdownTrigger};
