//! Container runtime interface and mock implementation.
//!
//! The runtime interface abstracts everything the sweeper asks of the host's
//! container engine:
//! - Resolving references and listing/inspecting images
//! - Counting containers created from an image
//! - Removing and pruning images
//! - Subscribing to container creation events
//!
//! The Docker Engine adapter lives in [`crate::docker`]; a mock
//! implementation is provided for testing.

mod mock;

use std::collections::BTreeMap;

use async_trait::async_trait;
use imgsweep_events::CreationEvent;
use imgsweep_id::{ImageId, ImageRef};
use thiserror::Error;
use tokio::sync::mpsc;

pub use mock::{MockContainer, MockFailure, MockImage, MockRuntime};

/// Errors from runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("request error: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("runtime API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected runtime response: {0}")]
    InvalidResponse(String),

    #[error("runtime call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("runtime socket not found: {0}")]
    SocketNotFound(String),

    #[error("event stream error: {0}")]
    Stream(String),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

impl RuntimeError {
    /// Returns true if the runtime reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// Human-readable references and labels of one image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReferences {
    pub repo_tags: Vec<ImageRef>,
    pub labels: BTreeMap<String, String>,
}

/// One entry of a removal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovedImage {
    /// The image record and its layers were deleted.
    Deleted(ImageId),
    /// A reference was removed from the image.
    Untagged(ImageRef),
}

/// Result of a dangling-image prune.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub images_deleted: usize,
    pub space_reclaimed: u64,
}

/// Item produced by an [`EventStream`].
pub type EventItem = Result<CreationEvent, RuntimeError>;

/// Producer half of an [`EventStream`], held by the transport adapter.
pub type EventSender = mpsc::Sender<EventItem>;

/// Finite-until-closed sequence of container creation events.
///
/// The adapter yields `Ok` items while the subscription is healthy, at most
/// one `Err` when the transport breaks, and then closes. A stream that
/// closes without an error ended cleanly.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<EventItem>,
}

impl EventStream {
    /// Default number of decoded events buffered ahead of the consumer.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Creates a connected sender/stream pair.
    pub fn channel(capacity: usize) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    /// Waits for the next event. `None` means the stream closed cleanly.
    pub async fn next(&mut self) -> Option<EventItem> {
        self.rx.recv().await
    }
}

/// Container runtime interface.
#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// Check that the runtime answers requests.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Resolve a reference or ID to the canonical image ID.
    ///
    /// Returns `Ok(None)` when the runtime does not know the image.
    async fn resolve_image(&self, reference: &str) -> Result<Option<ImageId>, RuntimeError>;

    /// List the IDs of every image the runtime holds.
    async fn list_images(&self) -> Result<Vec<ImageId>, RuntimeError>;

    /// Read an image's references and labels.
    async fn image_references(&self, id: &ImageId) -> Result<ImageReferences, RuntimeError>;

    /// Count containers created from `id`; stopped ones only if `include_stopped`.
    async fn count_containers(
        &self,
        id: &ImageId,
        include_stopped: bool,
    ) -> Result<usize, RuntimeError>;

    /// Remove an image, untagging and deleting as the runtime decides.
    async fn remove_image(
        &self,
        id: &ImageId,
        force: bool,
    ) -> Result<Vec<RemovedImage>, RuntimeError>;

    /// Remove all dangling images.
    async fn prune_dangling(&self) -> Result<PruneReport, RuntimeError>;

    /// Subscribe to container creation events.
    async fn subscribe_creation_events(&self) -> Result<EventStream, RuntimeError>;
}
