//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when decoding runtime events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// The event line is not valid JSON for a runtime event.
    #[error("malformed event: {0}")]
    Malformed(String),

    /// A creation event carries no image reference.
    #[error("creation event for container {container} has no image reference")]
    MissingImage { container: String },

    /// The image reference in the event is not a valid reference.
    #[error("invalid image reference in event: {0}")]
    InvalidImage(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Malformed(err.to_string())
    }
}
