//! Docker Engine runtime adapter.
//!
//! Implements [`ImageRuntime`](crate::runtime::ImageRuntime) against the
//! engine's HTTP API on its local Unix socket:
//! - `api`: request plumbing and the trait implementation
//! - `events`: decoding of the streamed `/events` response
//! - `types`: wire types

mod api;
mod events;
pub mod types;

pub use api::{encode_query_value, DockerClient};
