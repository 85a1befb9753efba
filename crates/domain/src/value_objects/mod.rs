//! Value objects - immutable types compared by value

mod consistency;

pub use consistency::{
    score_consistency, CharacterDna, ConsistencyReport, ConsistencyVerdict, DnaEmbedding,
    TraitObservation, TraitWeight,
};
