//! fleet-state — the deployment model shared by every reconciler crate.
//!
//! # Architecture
//!
//! ```text
//! StateReader ──► State { clusters, intended: Deployments }
//! Deployer    ──► DeployStates (observed)
//!                      │
//!                      ▼
//!              diff::diff / spawn_diff ──► DeployablePair stream
//!                                               │
//!                     Registry + Deployer ◄─────┘  (fleet-resolve)
//!                                               │
//!                                               ▼
//!                                        DiffResolution
//! ```
//!
//! Identity is a [`DeploymentId`]: manifest (repo, offset, flavor) plus
//! cluster. Snapshots hold each identity at most once. Per-pair failures
//! are [`ResolveError`] values carrying an explicit `retryable` flag.

pub mod artifact;
pub mod collab;
pub mod deployment;
pub mod diff;
pub mod error;
pub mod filter;
pub mod ids;
pub mod observer;
pub mod resolution;
pub mod resolve_state;
pub mod resources;
pub mod snapshot;
pub mod status;

pub use artifact::{BuildArtifact, DeployablePair, Deployable, PairKind, Quality, ADVISORY};
pub use collab::{Deployer, Registry, State, StateReader, StaticStateReader};
pub use deployment::{
    Cluster, Clusters, DeployConfig, DeployState, DeployStatus, Deployment, Difference,
    ManifestKind, Startup, Volume, VolumeMode, Volumes,
};
pub use error::{QueryError, StateError, StateResult};
pub use filter::ResolveFilter;
pub use ids::{DeploymentId, ManifestId, SourceId, SourceLocation};
pub use observer::{
    tracing_observer, ObservedEvent, RecordingObserver, ResolveObserver, TracingObserver,
};
pub use resolution::{DiffResolution, ResolutionDesc, ResolveError, ResolveErrorKind};
pub use resolve_state::ResolveState;
pub use resources::Resources;
pub use snapshot::{DeployStates, Deployments, Keyed, Snapshot};
pub use status::{ResolveStatus, ServerEntry, ServerList, StatusData};
