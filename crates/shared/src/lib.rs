//! Studio Shared - Wire types for the Studio HTTP API
//!
//! This crate contains the JSON request/response bodies exchanged with the
//! browser client.
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, uuid and the domain vocabulary
//! 2. **No business logic** - Pure data types and serialization
//! 3. **camelCase on the wire** - Matches the browser client

pub mod requests;
pub mod responses;

pub use requests::{
    ActivateProjectRequest, ConsistencyRequest, HydratePanelsRequest, PromptInput,
    SaveToPanelRequest, SubmitBatchRequest,
};
pub use responses::{
    BatchSubmitted, ErrorCode, ErrorResponse, GenerationView, PanelsView, SaveToPanelResponse,
    SavedImageView,
};
