//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Image generation (could swap the HTTP provider for another backend)
//! - Database sync of saved images (optional remote durability)
//! - Blob storage for persisted panels (could swap SQLite -> anything key/value)
//! - Clock (for testing)

mod error;
mod external;
mod storage;
mod testing;

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    DeleteOutcome, GenerationCheck, ImageGenPort, ImageSyncPort, ProviderStatus,
    StartGeneration, SyncedImage,
};

#[cfg(test)]
pub use external::{MockImageGenPort, MockImageSyncPort};

// =============================================================================
// Storage Ports
// =============================================================================
pub use storage::BlobStorePort;

#[cfg(test)]
pub use storage::MockBlobStorePort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::ClockPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::{ImageGenError, RepoError, SyncError};
