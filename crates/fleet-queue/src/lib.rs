//! fleet-queue — serialized rectification per deployment identity.
//!
//! # Architecture
//!
//! ```text
//! QueueSet
//!   ├── DeploymentId → R11nQueue (bounded FIFO, default capacity 10)
//!   │     ├── push / push_if_empty → QueuedR11n { id, pos }
//!   │     ├── pop / next            (head has pos 0)
//!   │     └── wait(id)              → DiffResolution once completed
//!   └── Optional worker per queue
//!         └── next() → R11nHandler::handle() → complete()
//! ```
//!
//! Queue mutation happens under a per-queue lock; the map of queues has
//! its own lock. Neither is held while a rectification runs. FIFO order
//! holds within one identity; different identities are independent.

pub mod error;
pub mod queue;
pub mod r11n;
pub mod set;

pub use error::{QueueError, QueueResult};
pub use queue::{R11nQueue, DEFAULT_CAPACITY};
pub use r11n::{QueuedR11n, R11nId, Rectification};
pub use set::{QueueSet, R11nHandler};
