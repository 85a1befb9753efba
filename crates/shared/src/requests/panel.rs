use serde::{Deserialize, Serialize};
use studio_domain::PanelSlots;

/// Save the finished image of `prompt_id` into the first free slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveToPanelRequest {
    pub prompt_id: String,
    #[serde(default)]
    pub prompt_text: Option<String>,
}

/// Replace the panels wholesale from an external source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratePanelsRequest {
    pub panels: PanelSlots,
}

/// Switch the active project.
///
/// With `carry_over`, the given panels become the new project's data instead
/// of whatever is stored for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateProjectRequest {
    #[serde(default)]
    pub carry_over: Option<PanelSlots>,
}
