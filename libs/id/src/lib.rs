//! # imgsweep-id
//!
//! Identifier types for container runtime objects.
//!
//! ## Design Principles
//!
//! - IDs are stable and runtime-assigned; references are mutable labels
//! - An image ID and a `repo:tag` reference are different types and never
//!   compare equal, even when their text happens to match
//! - All types have a canonical string form with strict parsing
//!
//! ## ID Format
//!
//! Runtime IDs are content-addressed digests as the runtime reports them:
//!
//! - `sha256:4f1e9c0a7b3d...` (image)
//! - `9b2c51d0a4e7...` (container)
//!
//! References are human-readable names such as `nginx:1.27` or
//! `registry.local:5000/team/app:v3`.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
