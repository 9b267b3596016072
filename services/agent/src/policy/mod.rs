//! Image deletion policy.
//!
//! This module decides which images may be removed:
//! - Exclusion rules that protect images by name, tag, or label
//! - Usage probes against running and stopped containers
//! - The deletion engine that combines both and reconciles history
//!
//! Decision order for a single image is fixed: exclusion, running
//! containers, stopped containers (unless enforcing), then removal.

mod engine;
mod exclusion;
mod usage;

pub use engine::{DeletionEngine, DeletionOutcome};
pub use exclusion::{ExclusionMatch, ExclusionRules, EXCLUDE_LABEL};
pub use usage::UsageProber;

/// Process-wide deletion policy, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Seconds an image may go unseen before it is eligible for deletion.
    pub retention_secs: u64,

    /// Allow deleting images that only stopped containers use, and images
    /// never seen in an event.
    pub enforcing: bool,

    /// Prune dangling images after every event.
    pub prune_dangling: bool,

    pub exclusions: ExclusionRules,
}

impl PolicyConfig {
    /// One week.
    pub const DEFAULT_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

    /// Retention window as a signed offset for timestamp arithmetic.
    pub fn retention(&self) -> i64 {
        i64::try_from(self.retention_secs).unwrap_or(i64::MAX)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            retention_secs: Self::DEFAULT_RETENTION_SECS,
            enforcing: false,
            prune_dangling: true,
            exclusions: ExclusionRules::default(),
        }
    }
}
