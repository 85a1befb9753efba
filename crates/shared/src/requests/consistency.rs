use serde::{Deserialize, Serialize};
use studio_domain::{DnaEmbedding, TraitObservation, TraitWeight};

/// Score a candidate render against reference embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyRequest {
    pub character_name: String,
    pub references: Vec<DnaEmbedding>,
    #[serde(default)]
    pub trait_weights: Vec<TraitWeight>,
    pub candidate: DnaEmbedding,
    #[serde(default)]
    pub observations: Vec<TraitObservation>,
}
