//! Request bodies accepted by the HTTP API.

mod consistency;
mod generation;
mod panel;

pub use consistency::ConsistencyRequest;
pub use generation::{PromptInput, SubmitBatchRequest};
pub use panel::{ActivateProjectRequest, HydratePanelsRequest, SaveToPanelRequest};
