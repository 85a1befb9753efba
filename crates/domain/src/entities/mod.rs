//! Domain entities - Core business objects with identity

mod generation;
mod panel;

pub use generation::{GenerationRequest, GenerationStatus};
pub use panel::{PanelSide, PanelSlots, SavedImage, SlotPosition, DEFAULT_PANEL_CAPACITY};
