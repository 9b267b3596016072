//! In-memory runtime for tests and local development.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use imgsweep_events::CreationEvent;
use imgsweep_id::{ImageId, ImageRef};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    EventSender, EventStream, ImageReferences, ImageRuntime, PruneReport, RemovedImage,
    RuntimeError,
};

/// An image held by the mock runtime.
#[derive(Debug, Clone)]
pub struct MockImage {
    pub id: ImageId,
    pub repo_tags: Vec<ImageRef>,
    pub labels: BTreeMap<String, String>,
    pub size_bytes: u64,
}

impl MockImage {
    /// Creates an untagged image. Panics on an invalid ID; test helper only.
    pub fn new(id: &str) -> Self {
        Self {
            id: ImageId::parse(id).expect("valid mock image id"),
            repo_tags: Vec::new(),
            labels: BTreeMap::new(),
            size_bytes: 0,
        }
    }

    /// Adds a `repo:tag` reference.
    pub fn tagged(mut self, reference: &str) -> Self {
        self.repo_tags
            .push(ImageRef::parse(reference).expect("valid mock reference"));
        self
    }

    /// Adds a label.
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the size reported when the image is pruned.
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

/// A container known to the mock runtime.
#[derive(Debug, Clone)]
pub struct MockContainer {
    pub image: ImageId,
    pub running: bool,
}

/// Operations the mock can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MockFailure {
    Ping,
    Resolve,
    List,
    Inspect,
    RunningProbe,
    AllProbe,
    Remove,
    Prune,
}

#[derive(Debug, Default)]
struct MockState {
    images: BTreeMap<ImageId, MockImage>,
    containers: Vec<MockContainer>,
    untag_only: BTreeSet<ImageId>,
    failures: BTreeSet<MockFailure>,
    removal_attempts: Vec<ImageId>,
    prune_calls: usize,
    events: Option<EventSender>,
}

impl MockState {
    fn fail(&self, failure: MockFailure) -> Result<(), RuntimeError> {
        if self.failures.contains(&failure) {
            return Err(RuntimeError::Unavailable(format!(
                "mock configured to fail {:?}",
                failure
            )));
        }
        Ok(())
    }

    fn lookup(&self, reference: &str) -> Option<ImageId> {
        let latest = format!("{}:latest", reference);
        self.images
            .values()
            .find(|image| {
                image.id.as_str() == reference
                    || image.id.hex() == reference
                    || image
                        .repo_tags
                        .iter()
                        .any(|t| t.as_str() == reference || t.as_str() == latest)
            })
            .map(|image| image.id.clone())
    }

    fn containers_of(&self, id: &ImageId, include_stopped: bool) -> usize {
        self.containers
            .iter()
            .filter(|c| &c.image == id && (c.running || include_stopped))
            .count()
    }
}

/// Mock runtime backed by in-memory images and containers.
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    /// Create an empty mock runtime.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add or replace an image.
    pub async fn add_image(&self, image: MockImage) {
        let mut state = self.state.lock().await;
        state.images.insert(image.id.clone(), image);
    }

    /// Add a container created from `image`.
    pub async fn add_container(&self, image: &ImageId, running: bool) {
        let mut state = self.state.lock().await;
        state.containers.push(MockContainer {
            image: image.clone(),
            running,
        });
    }

    /// Remove every container created from `image`.
    pub async fn remove_containers(&self, image: &ImageId) {
        let mut state = self.state.lock().await;
        state.containers.retain(|c| &c.image != image);
    }

    /// Make removals of `image` strip its tags but keep the image itself.
    pub async fn untag_only(&self, image: &ImageId) {
        let mut state = self.state.lock().await;
        state.untag_only.insert(image.clone());
    }

    /// Enable or disable a failure mode.
    pub async fn set_failure(&self, failure: MockFailure, enabled: bool) {
        let mut state = self.state.lock().await;
        if enabled {
            state.failures.insert(failure);
        } else {
            state.failures.remove(&failure);
        }
    }

    /// Whether the runtime still holds `image`.
    pub async fn has_image(&self, image: &ImageId) -> bool {
        self.state.lock().await.images.contains_key(image)
    }

    /// Every image passed to `remove_image`, in call order.
    pub async fn removal_attempts(&self) -> Vec<ImageId> {
        self.state.lock().await.removal_attempts.clone()
    }

    /// Number of `prune_dangling` calls.
    pub async fn prune_calls(&self) -> usize {
        self.state.lock().await.prune_calls
    }

    /// Publish a creation event for `reference` on the current subscription.
    ///
    /// Returns false if nobody is subscribed or the consumer has gone away.
    pub async fn emit(&self, reference: &str) -> bool {
        let Ok(image) = ImageRef::parse(reference) else {
            return false;
        };
        let tx = self.state.lock().await.events.clone();
        match tx {
            Some(tx) => tx.send(Ok(CreationEvent::for_image(image))).await.is_ok(),
            None => false,
        }
    }

    /// Break the current subscription with a transport error.
    pub async fn fail_stream(&self, message: &str) {
        let tx = self.state.lock().await.events.take();
        if let Some(tx) = tx {
            let _ = tx.send(Err(RuntimeError::Stream(message.to_string()))).await;
        }
    }

    /// Close the current subscription cleanly.
    pub async fn close_stream(&self) {
        self.state.lock().await.events.take();
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageRuntime for MockRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.state.lock().await.fail(MockFailure::Ping)
    }

    async fn resolve_image(&self, reference: &str) -> Result<Option<ImageId>, RuntimeError> {
        let state = self.state.lock().await;
        state.fail(MockFailure::Resolve)?;
        Ok(state.lookup(reference))
    }

    async fn list_images(&self) -> Result<Vec<ImageId>, RuntimeError> {
        let state = self.state.lock().await;
        state.fail(MockFailure::List)?;
        Ok(state.images.keys().cloned().collect())
    }

    async fn image_references(&self, id: &ImageId) -> Result<ImageReferences, RuntimeError> {
        let state = self.state.lock().await;
        state.fail(MockFailure::Inspect)?;
        let image = state
            .images
            .get(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))?;
        Ok(ImageReferences {
            repo_tags: image.repo_tags.clone(),
            labels: image.labels.clone(),
        })
    }

    async fn count_containers(
        &self,
        id: &ImageId,
        include_stopped: bool,
    ) -> Result<usize, RuntimeError> {
        let state = self.state.lock().await;
        if include_stopped {
            state.fail(MockFailure::AllProbe)?;
        } else {
            state.fail(MockFailure::RunningProbe)?;
        }
        Ok(state.containers_of(id, include_stopped))
    }

    async fn remove_image(
        &self,
        id: &ImageId,
        force: bool,
    ) -> Result<Vec<RemovedImage>, RuntimeError> {
        let mut state = self.state.lock().await;
        state.removal_attempts.push(id.clone());
        state.fail(MockFailure::Remove)?;

        if !state.images.contains_key(id) {
            return Err(RuntimeError::NotFound(id.to_string()));
        }

        if state.containers_of(id, false) > 0 {
            return Err(RuntimeError::Api {
                status: 409,
                message: format!("image {} is being used by a running container", id.short()),
            });
        }

        if !force && state.containers_of(id, true) > 0 {
            return Err(RuntimeError::Api {
                status: 409,
                message: format!("image {} is being used by a stopped container", id.short()),
            });
        }

        let untag_only = state.untag_only.contains(id);
        let Some(image) = state.images.get_mut(id) else {
            return Err(RuntimeError::NotFound(id.to_string()));
        };
        let mut removed: Vec<RemovedImage> = image
            .repo_tags
            .drain(..)
            .map(RemovedImage::Untagged)
            .collect();

        if !untag_only {
            state.images.remove(id);
            removed.push(RemovedImage::Deleted(id.clone()));
        }

        debug!(image_id = %id, items = removed.len(), "[MOCK] Removed image");
        Ok(removed)
    }

    async fn prune_dangling(&self) -> Result<PruneReport, RuntimeError> {
        let mut state = self.state.lock().await;
        state.prune_calls += 1;
        state.fail(MockFailure::Prune)?;

        let dangling: Vec<ImageId> = state
            .images
            .values()
            .filter(|image| image.repo_tags.is_empty())
            .filter(|image| state.containers_of(&image.id, true) == 0)
            .map(|image| image.id.clone())
            .collect();

        let mut report = PruneReport::default();
        for id in dangling {
            if let Some(image) = state.images.remove(&id) {
                report.images_deleted += 1;
                report.space_reclaimed += image.size_bytes;
            }
        }

        Ok(report)
    }

    async fn subscribe_creation_events(&self) -> Result<EventStream, RuntimeError> {
        let mut state = self.state.lock().await;
        state.fail(MockFailure::Ping)?;
        let (tx, stream) = EventStream::channel(EventStream::DEFAULT_CAPACITY);
        state.events = Some(tx);
        Ok(stream)
    }
}
