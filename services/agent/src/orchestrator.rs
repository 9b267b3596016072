//! Event loop tying the runtime's creation events to the sweeps.
//!
//! The orchestrator owns the image history and processes one event at a
//! time, fully, in arrival order: resolve the image, refresh its history
//! entry, then run the sweeps. No two events overlap, so the history needs
//! no locking.

use std::sync::Arc;

use imgsweep_events::CreationEvent;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::AgentError;
use crate::history::ImageHistory;
use crate::policy::PolicyConfig;
use crate::runtime::{EventStream, ImageRuntime};
use crate::sweep::{SweepScheduler, SweepSummary};

/// Lifecycle state of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Why the event loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The runtime closed the event stream.
    StreamClosed,
    /// A shutdown was requested.
    Shutdown,
}

/// Consumes creation events and drives the sweeps.
pub struct Orchestrator {
    runtime: Arc<dyn ImageRuntime>,
    scheduler: SweepScheduler,
    history: ImageHistory,
    clock: Arc<dyn Clock>,
    state: LoopState,
}

impl Orchestrator {
    /// Validate that the runtime is reachable and enter the running state.
    ///
    /// The current time becomes the process start used to gate the
    /// grandfather sweep.
    pub async fn start(
        runtime: Arc<dyn ImageRuntime>,
        policy: PolicyConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AgentError> {
        runtime.ping().await?;

        let started_at = clock.now();
        let scheduler = SweepScheduler::new(Arc::clone(&runtime), Arc::new(policy), started_at);

        info!(started_at, "Runtime reachable, image sweeper running");

        Ok(Self {
            runtime,
            scheduler,
            history: ImageHistory::new(),
            clock,
            state: LoopState::Running,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn history(&self) -> &ImageHistory {
        &self.history
    }

    pub fn scheduler(&self) -> &SweepScheduler {
        &self.scheduler
    }

    /// Process one creation event.
    ///
    /// Returns `None` if the event's image could not be resolved; the event
    /// is dropped and history is untouched.
    pub async fn handle_event(&mut self, event: &CreationEvent) -> Option<SweepSummary> {
        info!(
            image = %event.image,
            container = event.container.as_ref().map(|c| c.short()),
            event_time = event.time,
            "Handling container creation event"
        );

        let id = match self.runtime.resolve_image(event.image.as_str()).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(image = %event.image, "Could not find image id, dropping event");
                return None;
            }
            Err(e) => {
                warn!(image = %event.image, error = %e, "Failed to resolve image, dropping event");
                return None;
            }
        };

        debug!(image = %event.image, image_id = %id, "Image reference resolved");

        let now = self.clock.now();
        self.history.touch(id, now);

        Some(self.scheduler.run(&mut self.history, now).await)
    }

    /// Subscribe to creation events and run until the stream ends.
    pub async fn subscribe_and_run(
        &mut self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<StopReason, AgentError> {
        let events = self.runtime.subscribe_creation_events().await?;
        self.run(events, shutdown).await
    }

    /// Consume `events` until the stream closes, fails, or shutdown is signalled.
    ///
    /// A clean close or shutdown returns `Ok`; a transport error returns
    /// [`AgentError::Stream`]. Either way the loop ends in `Stopped`.
    pub async fn run(
        &mut self,
        mut events: EventStream,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<StopReason, AgentError> {
        info!("Listening for container creation events");

        let result = loop {
            tokio::select! {
                item = events.next() => match item {
                    Some(Ok(event)) => {
                        if let Some(summary) = self.handle_event(&event).await {
                            debug!(
                                tracked = self.history.len(),
                                age_deleted = summary.age.deleted,
                                grandfather_ran = summary.grandfather.is_some(),
                                "Event processed"
                            );
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Event stream failed");
                        break Err(AgentError::Stream(e));
                    }
                    None => {
                        info!("Event stream closed");
                        break Ok(StopReason::StreamClosed);
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Event loop shutting down");
                        break Ok(StopReason::Shutdown);
                    }
                }
            }
        };

        self.state = LoopState::Stopped;
        result
    }
}
