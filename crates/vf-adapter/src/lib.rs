//! Model adapter layer: the uniform contract every external video generator
//! implements, plus the reference ffmpeg-backed mock, the factory, the error
//! taxonomy, and a shared retry helper.

pub mod error;
pub mod factory;
pub mod mock;
pub mod retry;
pub mod traits;
pub mod types;

pub use error::{AdapterError, AdapterResult};
pub use factory::AdapterFactory;
pub use mock::{MockAdapter, MockAdapterConfig};
pub use traits::ModelAdapter;
pub use types::{GenerationResult, GenerationStatus};
