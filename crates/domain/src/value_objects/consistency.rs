//! Character DNA and consistency scoring.
//!
//! A character's "DNA" is the centroid of the embeddings extracted from its
//! reference images. New renders are scored against it:
//!
//! - **identity**: cosine similarity between the candidate embedding and the
//!   centroid, mapped to 0-100
//! - **traits**: weighted average of per-trait similarities reported by the
//!   analyzer (hair, outfit, ...), mapped to 0-100
//! - **overall**: `0.6 * identity + 0.4 * traits`, or identity alone when no
//!   weighted trait was observed

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const IDENTITY_WEIGHT: f32 = 0.6;
const TRAIT_WEIGHT: f32 = 0.4;

/// A feature vector extracted from one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DnaEmbedding(pub Vec<f32>);

impl DnaEmbedding {
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Cosine similarity in `[-1, 1]`; zero vectors score 0.
    ///
    /// Embeddings whose magnitude does not fit in an `f32` (or that contain
    /// NaN) are rejected.
    pub fn cosine_similarity(&self, other: &DnaEmbedding) -> DomainResult<f32> {
        if self.dimensions() != other.dimensions() {
            return Err(DomainError::validation(format!(
                "embedding dimensions differ: {} vs {}",
                self.dimensions(),
                other.dimensions()
            )));
        }
        let (left, right) = (self.norm(), other.norm());
        if !left.is_finite() || !right.is_finite() {
            return Err(DomainError::validation(
                "embedding values are too large or not numbers",
            ));
        }
        let denominator = left * right;
        if denominator == 0.0 {
            return Ok(0.0);
        }
        let dot: f32 = self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum();
        let similarity = dot / denominator;
        if !similarity.is_finite() {
            return Err(DomainError::validation(
                "embedding values are too large or not numbers",
            ));
        }
        Ok(similarity.clamp(-1.0, 1.0))
    }
}

/// How much a named trait counts towards the trait score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitWeight {
    pub name: String,
    pub weight: f32,
}

/// Analyzer output for one trait on one candidate image, `similarity` in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitObservation {
    pub name: String,
    pub similarity: f32,
}

/// Reusable identity derived from reference images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDna {
    pub name: String,
    pub centroid: DnaEmbedding,
    pub reference_count: usize,
    #[serde(default)]
    pub traits: Vec<TraitWeight>,
}

impl CharacterDna {
    /// Average the reference embeddings into a centroid.
    pub fn derive(
        name: impl Into<String>,
        references: &[DnaEmbedding],
        traits: Vec<TraitWeight>,
    ) -> DomainResult<Self> {
        let first = references
            .first()
            .ok_or_else(|| DomainError::validation("at least one reference embedding is required"))?;
        let dimensions = first.dimensions();
        if dimensions == 0 {
            return Err(DomainError::validation("reference embeddings are empty"));
        }
        if let Some(bad) = references.iter().find(|e| e.dimensions() != dimensions) {
            return Err(DomainError::validation(format!(
                "embedding dimensions differ: {} vs {}",
                dimensions,
                bad.dimensions()
            )));
        }
        if let Some(bad) = traits.iter().find(|t| !(t.weight >= 0.0)) {
            return Err(DomainError::validation(format!(
                "trait '{}' has a negative weight",
                bad.name
            )));
        }

        let mut centroid = vec![0.0_f32; dimensions];
        for embedding in references {
            for (acc, value) in centroid.iter_mut().zip(&embedding.0) {
                *acc += value;
            }
        }
        let count = references.len() as f32;
        centroid.iter_mut().for_each(|v| *v /= count);

        Ok(Self {
            name: name.into(),
            centroid: DnaEmbedding(centroid),
            reference_count: references.len(),
            traits,
        })
    }

    fn weight_of(&self, trait_name: &str) -> f32 {
        self.traits
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(trait_name))
            .map_or(0.0, |t| t.weight)
    }
}

/// Coarse bucket for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsistencyVerdict {
    Consistent,
    Drifting,
    Inconsistent,
}

impl ConsistencyVerdict {
    fn from_score(score: f32) -> Self {
        if score >= 80.0 {
            Self::Consistent
        } else if score >= 60.0 {
            Self::Drifting
        } else {
            Self::Inconsistent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub identity: f32,
    /// `None` when no observed trait carries weight
    pub traits: Option<f32>,
    pub overall: f32,
    pub verdict: ConsistencyVerdict,
}

/// Score a candidate render against a character's DNA.
pub fn score_consistency(
    dna: &CharacterDna,
    candidate: &DnaEmbedding,
    observations: &[TraitObservation],
) -> DomainResult<ConsistencyReport> {
    let similarity = dna.centroid.cosine_similarity(candidate)?;
    // Negative similarity is as bad as orthogonal for identity purposes.
    let identity = similarity.max(0.0) * 100.0;

    let (weighted, total_weight) = observations.iter().fold((0.0_f32, 0.0_f32), |acc, obs| {
        let weight = dna.weight_of(&obs.name);
        (
            acc.0 + obs.similarity.clamp(0.0, 1.0) * weight,
            acc.1 + weight,
        )
    });
    let traits = (total_weight > 0.0).then(|| weighted / total_weight * 100.0);

    let overall = match traits {
        Some(traits) => IDENTITY_WEIGHT * identity + TRAIT_WEIGHT * traits,
        None => identity,
    };

    Ok(ConsistencyReport {
        identity,
        traits,
        overall,
        verdict: ConsistencyVerdict::from_score(overall),
    })
}
