//! Pending slot claims.
//!
//! A claim reserves a slot between the moment the allocator picks it and the
//! moment the persisted write shows up in an observed snapshot.

use std::collections::BTreeMap;

use studio_domain::{PanelSlots, PromptId, SlotPosition};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Claim {
    url: String,
    prompt_id: PromptId,
}

/// In-flight reservations, keyed by position.
#[derive(Debug, Default)]
pub struct PendingClaims {
    claims: BTreeMap<SlotPosition, Claim>,
}

impl PendingClaims {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, position: SlotPosition) -> bool {
        self.claims.contains_key(&position)
    }

    /// Reserve `position`. Returns false if it is already reserved.
    pub fn claim(&mut self, position: SlotPosition, url: String, prompt_id: PromptId) -> bool {
        if self.is_claimed(position) {
            return false;
        }
        self.claims.insert(position, Claim { url, prompt_id });
        true
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.position_of_url(url).is_some()
    }

    pub fn position_of_url(&self, url: &str) -> Option<SlotPosition> {
        self.claims
            .iter()
            .find(|(_, claim)| claim.url == url)
            .map(|(position, _)| *position)
    }

    /// Release every claim whose slot is occupied in `observed`.
    ///
    /// Returns the released positions.
    pub fn reconcile(&mut self, observed: &PanelSlots) -> Vec<SlotPosition> {
        let released: Vec<SlotPosition> = self
            .claims
            .keys()
            .copied()
            .filter(|position| observed.get(*position).is_some())
            .collect();
        for position in &released {
            if let Some(claim) = self.claims.remove(position) {
                tracing::debug!(
                    position = %position,
                    prompt_id = %claim.prompt_id,
                    "Released slot claim after observing write"
                );
            }
        }
        released
    }

    /// Drop the claim on `position`, if any.
    pub fn release(&mut self, position: SlotPosition) -> bool {
        self.claims.remove(&position).is_some()
    }

    pub fn positions(&self) -> Vec<SlotPosition> {
        self.claims.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.claims.clear();
    }
}
