//! Relational state store for projects, segments, and render jobs.
//!
//! Backed by PostgreSQL via `sqlx`. Every conditional mutation is expressed
//! as an `UPDATE ... WHERE <current-state>` and checked by affected-row
//! count, so replayed broker messages are idempotent without a prior read.

pub mod error;
pub mod pool;
pub mod store;

pub use error::{StateError, StateResult};
pub use pool::StateConfig;
pub use store::{ProgressOutcome, StateStore};
