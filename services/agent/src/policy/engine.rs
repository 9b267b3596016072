//! Deletion decision and history reconciliation for a single image.

use std::sync::Arc;

use imgsweep_id::ImageId;
use tracing::{debug, info, warn};

use super::{PolicyConfig, UsageProber};
use crate::history::ImageHistory;
use crate::runtime::{ImageRuntime, RemovedImage};

/// What `try_delete` did with an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// An exclusion rule protects the image.
    Excluded,
    /// A running container uses the image.
    Running,
    /// Only stopped containers use the image and enforcing is off.
    StoppedOnly,
    /// The image could not be inspected; left alone for this round.
    ProbeFailed,
    /// The runtime no longer knows the image after removal.
    Deleted,
    /// The image was already gone before anything was attempted.
    AlreadyGone,
    /// Removal was attempted but the image still resolves.
    StillPresent,
}

impl DeletionOutcome {
    /// True if the image is gone and its history entry was dropped.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Deleted | Self::AlreadyGone)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excluded => "excluded",
            Self::Running => "running",
            Self::StoppedOnly => "stopped_only",
            Self::ProbeFailed => "probe_failed",
            Self::Deleted => "deleted",
            Self::AlreadyGone => "already_gone",
            Self::StillPresent => "still_present",
        }
    }
}

impl std::fmt::Display for DeletionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies the deletion policy to individual images.
pub struct DeletionEngine {
    runtime: Arc<dyn ImageRuntime>,
    policy: Arc<PolicyConfig>,
}

impl DeletionEngine {
    pub fn new(runtime: Arc<dyn ImageRuntime>, policy: Arc<PolicyConfig>) -> Self {
        Self { runtime, policy }
    }

    /// Delete `id` if the policy allows it, then reconcile its history entry.
    ///
    /// The history entry is dropped only once the runtime reports the image
    /// as not found. Removal errors are logged and never propagate.
    pub async fn try_delete(&self, history: &mut ImageHistory, id: &ImageId) -> DeletionOutcome {
        let references = match self.runtime.image_references(id).await {
            Ok(references) => references,
            Err(e) if e.is_not_found() => {
                debug!(image_id = %id, "Image already removed");
                history.remove(id);
                return DeletionOutcome::AlreadyGone;
            }
            Err(e) => {
                warn!(image_id = %id, error = %e, "Failed to inspect image, skipping");
                return DeletionOutcome::ProbeFailed;
            }
        };

        if let Some(rule) = self.policy.exclusions.matching_rule(&references) {
            info!(image_id = %id, rule = %rule, "Image is excluded from deletion, skipping");
            return DeletionOutcome::Excluded;
        }

        let usage = UsageProber::new(self.runtime.as_ref());

        if usage.has_running(id).await {
            info!(image_id = %id, "Image has running containers, skipping");
            return DeletionOutcome::Running;
        }

        if usage.has_stopped_only(id).await && !self.policy.enforcing {
            info!(image_id = %id, "Image has stopped containers, skipping");
            return DeletionOutcome::StoppedOnly;
        }

        match self.runtime.remove_image(id, true).await {
            Ok(removed) => {
                for item in removed {
                    match item {
                        RemovedImage::Deleted(deleted) => {
                            info!(image_id = %id, deleted = %deleted, "Deleted image")
                        }
                        RemovedImage::Untagged(reference) => {
                            info!(image_id = %id, untagged = %reference, "Untagged image")
                        }
                    }
                }
            }
            Err(e) => {
                warn!(image_id = %id, error = %e, "Image removal failed");
            }
        }

        // The runtime may have untagged without deleting; only a miss on
        // re-inspection proves the image is gone.
        match self.runtime.resolve_image(id.as_str()).await {
            Ok(None) => {
                info!(image_id = %id, "Image removed, dropping history entry");
                history.remove(id);
                DeletionOutcome::Deleted
            }
            Ok(Some(_)) => {
                debug!(image_id = %id, "Image still present after removal");
                DeletionOutcome::StillPresent
            }
            Err(e) => {
                warn!(image_id = %id, error = %e, "Failed to verify image removal");
                DeletionOutcome::StillPresent
            }
        }
    }
}
