use serde::{Deserialize, Serialize};

/// One prompt in a batch. `id` is the caller's correlation token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInput {
    pub id: String,
    pub text: String,
}

/// Start a new batch, replacing whatever the registry was tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBatchRequest {
    pub prompts: Vec<PromptInput>,
}
