//! Container usage probes.
//!
//! Both probes fail safe: a runtime error counts as "containers exist", so a
//! query failure can never make an image look unused.

use imgsweep_id::ImageId;
use tracing::warn;

use crate::runtime::ImageRuntime;

/// Answers whether containers still reference an image.
pub struct UsageProber<'a> {
    runtime: &'a dyn ImageRuntime,
}

impl<'a> UsageProber<'a> {
    pub fn new(runtime: &'a dyn ImageRuntime) -> Self {
        Self { runtime }
    }

    /// True if at least one running container uses the image, or the probe failed.
    pub async fn has_running(&self, id: &ImageId) -> bool {
        self.probe(id, false).await
    }

    /// True if no container is running from the image but a stopped one still
    /// references it.
    ///
    /// Each probe maps an error to "containers exist": a failed running probe
    /// therefore yields `false` here, and a failed all-containers probe after
    /// a clean "none running" yields `true`.
    pub async fn has_stopped_only(&self, id: &ImageId) -> bool {
        !self.probe(id, false).await && self.probe(id, true).await
    }

    async fn probe(&self, id: &ImageId, include_stopped: bool) -> bool {
        match self.runtime.count_containers(id, include_stopped).await {
            Ok(count) => count > 0,
            Err(e) => {
                warn!(
                    image_id = %id,
                    include_stopped,
                    error = %e,
                    "Container probe failed, treating image as in use"
                );
                true
            }
        }
    }
}
