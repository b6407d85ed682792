//! fleet-resolve — drives intended deployments onto clusters.
//!
//! # Architecture
//!
//! ```text
//!  AutoResolver (timer | trigger)
//!        │ StateReader::read_state
//!        ▼
//!  Resolver::begin ──► ResolveRecorder (phase, log, errors)
//!        │
//!        │  filter ─► running_deployments ─► spawn_diff
//!        ▼
//!  ┌───────────────┐   ┌──────────────┐
//!  │ ArtifactStage │──►│ DispatchStage│──► DiffResolution log
//!  │ guard_image   │   │ Deployer     │
//!  └───────────────┘   └──────────────┘
//!
//!  QueueSet ──► Rectifier (guard + rectify + status)
//! ```
//!
//! [`ClusterDeployer`] implements `Deployer` over any
//! [`RectificationClient`]; [`memory`] has in-process implementations of
//! the client and the registry.

pub mod auto;
pub mod deployer;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod recorder;
pub mod rectifier;
pub mod request_id;
pub mod resolver;
pub mod stages;

pub use auto::AutoResolver;
pub use deployer::{report_stable, ClusterDeployer, ObservedRequest, RectificationClient};
pub use error::{ResolveCycleError, ResolveCycleResult};
pub use memory::{ClientCall, MemoryClient, MemoryRegistry};
pub use pipeline::{collect, run_stage, Outcome, Stage, StageOptions, Streams};
pub use recorder::{PhaseLog, ResolveRecorder};
pub use rectifier::Rectifier;
pub use request_id::{make_request_id, parse_request_id};
pub use resolver::{Resolver, PHASES};
pub use stages::{guard_image, ArtifactStage, DispatchStage};
