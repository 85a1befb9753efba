//! Studio domain: generation requests, panel slots and character consistency.
//!
//! No I/O lives here. The engine crate owns ports, adapters and use cases.

extern crate self as studio_domain;

pub mod entities;
pub mod error;
pub mod ids;
pub mod value_objects;

pub use entities::{
    GenerationRequest, GenerationStatus, PanelSide, PanelSlots, SavedImage, SlotPosition,
    DEFAULT_PANEL_CAPACITY,
};
pub use error::{DomainError, DomainResult};
pub use ids::{BatchId, GenerationId, ProjectId, PromptId, ProviderGenerationId, SavedImageId};
pub use value_objects::{
    score_consistency, CharacterDna, ConsistencyReport, ConsistencyVerdict, DnaEmbedding,
    TraitObservation, TraitWeight,
};
