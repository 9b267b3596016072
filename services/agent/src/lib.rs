//! imgsweep Agent Library
//!
//! Watches a container runtime for container creations and removes images
//! that have gone unused for longer than a retention window.
//!
//! ## Architecture
//!
//! - **Orchestrator**: consumes creation events one at a time, records when
//!   each image was last used, then runs the sweeps
//! - **Sweep Scheduler**: age sweep, dangling prune, and the enforcing-only
//!   grandfather sweep for images never seen in an event
//! - **Deletion Engine**: exclusion rules and container usage probes decide
//!   whether one image may go
//! - **Runtime**: abstracts the container engine (Docker in production,
//!   mock in tests)

pub mod clock;
pub mod config;
pub mod docker;
pub mod error;
pub mod history;
pub mod logging;
pub mod orchestrator;
pub mod policy;
pub mod runtime;
pub mod sweep;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AgentError;
pub use history::ImageHistory;
pub use orchestrator::{LoopState, Orchestrator, StopReason};
pub use policy::{DeletionEngine, DeletionOutcome, PolicyConfig};
pub use runtime::{ImageRuntime, MockRuntime, RuntimeError};
pub use sweep::{SweepReport, SweepScheduler, SweepSummary};
