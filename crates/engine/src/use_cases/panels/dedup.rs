//! Save deduplication.
//!
//! Identity is the image URL. Prompt ids are reused across iterations, so a
//! prompt id only counts as "saved" while the URL recorded for it is still on
//! a panel (or claimed for one). Two distinct results that share a URL are
//! indistinguishable here; the second one is treated as a duplicate.

use std::collections::HashMap;

use studio_domain::{PanelSlots, PromptId, SlotPosition};

use super::claims::PendingClaims;

#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: HashMap<PromptId, String>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where `url` already lives, either persisted or claimed.
    pub fn is_duplicate(
        &self,
        url: &str,
        observed: &PanelSlots,
        claims: &PendingClaims,
    ) -> Option<SlotPosition> {
        observed
            .position_of_url(url)
            .or_else(|| claims.position_of_url(url))
    }

    pub fn record(&mut self, prompt_id: PromptId, url: String) {
        self.seen.insert(prompt_id, url);
    }

    /// Drop prompt ids whose URL is on no slot and in no claim.
    pub fn forget_stale(&mut self, observed: &PanelSlots, claims: &PendingClaims) {
        self.seen.retain(|prompt_id, url| {
            let live = observed.contains_url(url) || claims.contains_url(url);
            if !live {
                tracing::trace!(prompt_id = %prompt_id, "Forgetting stale saved prompt");
            }
            live
        });
    }

    /// True when `prompt_id` was saved with exactly `url`.
    pub fn is_saved(&self, prompt_id: &PromptId, url: &str) -> bool {
        self.seen.get(prompt_id).is_some_and(|seen| seen == url)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
