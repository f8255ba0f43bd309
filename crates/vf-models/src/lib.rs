//! Shared data model for the render pipeline.
//!
//! This crate provides the Serde-serializable core entities (`Project`,
//! `Segment`, `RenderJob`), their status sum types, and the adapter error
//! taxonomy — the vocabulary every other crate in the workspace builds on.

pub mod error_code;
pub mod ids;
pub mod project;
pub mod render_job;
pub mod segment;

pub use error_code::AdapterErrorCode;
pub use ids::{OwnerId, ProjectId, RenderJobId, SegmentId};
pub use project::Project;
pub use render_job::{RenderJob, RenderJobStatus};
pub use segment::{Segment, SegmentStatus};
