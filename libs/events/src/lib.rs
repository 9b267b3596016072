//! # imgsweep-events
//!
//! Container runtime event types and stream decoding.
//!
//! ## Event Stream
//!
//! The runtime publishes lifecycle events as newline-delimited JSON objects
//! on a long-lived HTTP response. [`LineDecoder`] reassembles objects that
//! arrive split across transport chunks, and [`RuntimeEvent`] is the decoded
//! record.
//!
//! ## Creation Events
//!
//! Only container `create` events drive image bookkeeping.
//! [`RuntimeEvent::creation`] narrows a raw event to a [`CreationEvent`]
//! carrying the image reference the new container was created from.

mod decoder;
mod error;
mod types;

pub use decoder::LineDecoder;
pub use error::EventError;
pub use types::*;
