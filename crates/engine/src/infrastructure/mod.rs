//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies, plus the
//! persistence and polling primitives the use cases build on.

pub mod blob_store;
pub mod clock;
pub mod config;
pub mod image_provider;
pub mod image_sync;
pub mod persisted_store;
pub mod polling;
pub mod ports;
