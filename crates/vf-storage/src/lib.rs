//! S3-compatible object store client.
//!
//! This crate provides the durable blob store (component C2): file
//! upload/download, presigned URL generation, existence checks, and
//! deletion, backed by any S3-compatible provider.

pub mod client;
pub mod error;

pub use client::{ObjectStoreClient, ObjectStoreConfig};
pub use error::{StorageError, StorageResult};
