//! Panel slots - Fixed left/right display grid for saved images

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::{PromptId, SavedImageId};

/// Which panel a slot belongs to. Left is always filled first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelSide {
    Left,
    Right,
}

impl PanelSide {
    /// Scan order used by the allocator.
    pub const ORDER: [PanelSide; 2] = [PanelSide::Left, PanelSide::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for PanelSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PanelSide {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(DomainError::validation(format!(
                "unknown panel side '{other}'"
            ))),
        }
    }
}

/// A `(side, index)` pair. Orders left before right, then by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPosition {
    pub side: PanelSide,
    pub index: usize,
}

impl SlotPosition {
    pub fn new(side: PanelSide, index: usize) -> Self {
        Self { side, index }
    }

    pub fn left(index: usize) -> Self {
        Self::new(PanelSide::Left, index)
    }

    pub fn right(index: usize) -> Self {
        Self::new(PanelSide::Right, index)
    }
}

impl fmt::Display for SlotPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.side, self.index)
    }
}

/// An image saved into exactly one panel slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedImage {
    pub id: SavedImageId,
    /// Image location; dedup compares this byte for byte
    pub url: String,
    /// Backlink to the originating prompt (may have been reused since)
    #[serde(default)]
    pub prompt_id: Option<PromptId>,
    /// Prompt text at save time
    #[serde(default)]
    pub prompt: Option<String>,
    /// Denormalized position, rewritten by [`PanelSlots::place`]
    pub side: PanelSide,
    pub slot_index: usize,
    pub saved_at: DateTime<Utc>,
}

impl SavedImage {
    pub fn new(
        url: impl Into<String>,
        prompt_id: Option<PromptId>,
        prompt: Option<String>,
        position: SlotPosition,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SavedImageId::new(),
            url: url.into(),
            prompt_id,
            prompt,
            side: position.side,
            slot_index: position.index,
            saved_at: now,
        }
    }

    pub fn position(&self) -> SlotPosition {
        SlotPosition::new(self.side, self.slot_index)
    }
}

/// The persisted panel grid: `capacity` slots on each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelSlots {
    capacity: usize,
    left: Vec<Option<SavedImage>>,
    right: Vec<Option<SavedImage>>,
}

impl PanelSlots {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            left: vec![None; capacity],
            right: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn side(&self, side: PanelSide) -> &Vec<Option<SavedImage>> {
        match side {
            PanelSide::Left => &self.left,
            PanelSide::Right => &self.right,
        }
    }

    fn side_mut(&mut self, side: PanelSide) -> &mut Vec<Option<SavedImage>> {
        match side {
            PanelSide::Left => &mut self.left,
            PanelSide::Right => &mut self.right,
        }
    }

    /// Slots of one panel in index order.
    pub fn slots(&self, side: PanelSide) -> &[Option<SavedImage>] {
        self.side(side)
    }

    pub fn get(&self, position: SlotPosition) -> Option<&SavedImage> {
        self.side(position.side)
            .get(position.index)
            .and_then(Option::as_ref)
    }

    /// True when the slot exists and holds nothing.
    pub fn is_empty_at(&self, position: SlotPosition) -> bool {
        matches!(self.side(position.side).get(position.index), Some(None))
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.occupied().any(|image| image.url == url)
    }

    pub fn position_of_url(&self, url: &str) -> Option<SlotPosition> {
        self.occupied()
            .find(|image| image.url == url)
            .map(SavedImage::position)
    }

    /// All saved images, left panel first.
    pub fn occupied(&self) -> impl Iterator<Item = &SavedImage> {
        self.left.iter().chain(self.right.iter()).flatten()
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    /// Put an image into an empty slot.
    ///
    /// The image's denormalized position is overwritten with `position`.
    pub fn place(&mut self, position: SlotPosition, mut image: SavedImage) -> DomainResult<()> {
        self.check_range(position)?;
        if !self.is_empty_at(position) {
            return Err(DomainError::SlotOccupied {
                side: position.side,
                index: position.index,
            });
        }
        image.side = position.side;
        image.slot_index = position.index;
        if let Some(slot) = self.side_mut(position.side).get_mut(position.index) {
            *slot = Some(image);
        }
        Ok(())
    }

    /// Clear a slot, returning what it held.
    pub fn remove(&mut self, position: SlotPosition) -> DomainResult<Option<SavedImage>> {
        self.check_range(position)?;
        Ok(self
            .side_mut(position.side)
            .get_mut(position.index)
            .and_then(Option::take))
    }

    /// Resize to `capacity`, dropping overflow and fixing denormalized positions.
    ///
    /// Used when hydrating from a source that may have been written with a
    /// different slot count.
    pub fn normalized(mut self, capacity: usize) -> Self {
        for side in PanelSide::ORDER {
            let slots = self.side_mut(side);
            slots.resize(capacity, None);
            for (index, slot) in slots.iter_mut().enumerate() {
                if let Some(image) = slot {
                    image.side = side;
                    image.slot_index = index;
                }
            }
        }
        self.capacity = capacity;
        self
    }

    fn check_range(&self, position: SlotPosition) -> DomainResult<()> {
        if position.index >= self.capacity {
            return Err(DomainError::SlotOutOfRange {
                side: position.side,
                index: position.index,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl Default for PanelSlots {
    fn default() -> Self {
        Self::new(DEFAULT_PANEL_CAPACITY)
    }
}

/// Slots per side when nothing else is configured.
pub const DEFAULT_PANEL_CAPACITY: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> SavedImage {
        SavedImage::new(url, None, None, SlotPosition::left(0), Utc::now())
    }

    #[test]
    fn place_rejects_occupied_slot() {
        let mut slots = PanelSlots::new(2);
        slots.place(SlotPosition::left(0), image("a")).expect("place");

        let err = slots
            .place(SlotPosition::left(0), image("b"))
            .expect_err("occupied");
        assert_eq!(
            err,
            DomainError::SlotOccupied {
                side: PanelSide::Left,
                index: 0
            }
        );
        assert_eq!(slots.get(SlotPosition::left(0)).map(|i| i.url.as_str()), Some("a"));
    }

    #[test]
    fn place_rejects_out_of_range() {
        let mut slots = PanelSlots::new(2);
        assert!(matches!(
            slots.place(SlotPosition::right(2), image("a")),
            Err(DomainError::SlotOutOfRange { .. })
        ));
        assert!(!slots.is_empty_at(SlotPosition::right(2)));
    }

    #[test]
    fn place_rewrites_denormalized_position() {
        let mut slots = PanelSlots::new(2);
        slots
            .place(SlotPosition::right(1), image("a"))
            .expect("place");

        let saved = slots.get(SlotPosition::right(1)).expect("saved");
        assert_eq!(saved.position(), SlotPosition::right(1));
    }

    #[test]
    fn remove_frees_slot_and_url() {
        let mut slots = PanelSlots::new(2);
        slots.place(SlotPosition::left(1), image("a")).expect("place");
        assert!(slots.contains_url("a"));

        let removed = slots.remove(SlotPosition::left(1)).expect("remove");
        assert_eq!(removed.map(|i| i.url), Some("a".to_string()));
        assert!(!slots.contains_url("a"));
        assert!(slots.is_empty_at(SlotPosition::left(1)));
    }

    #[test]
    fn full_panels_count_every_image() {
        let mut slots = PanelSlots::new(1);
        slots.place(SlotPosition::left(0), image("a")).expect("place");
        slots.place(SlotPosition::right(0), image("b")).expect("place");
        assert!(!slots.is_empty_at(SlotPosition::left(0)));
        assert!(!slots.is_empty_at(SlotPosition::right(0)));
        assert_eq!(slots.occupied_count(), 2);
    }

    #[test]
    fn normalized_pads_truncates_and_fixes_positions() {
        let mut slots = PanelSlots::new(3);
        slots.place(SlotPosition::left(0), image("a")).expect("place");
        slots.place(SlotPosition::left(2), image("b")).expect("place");

        let shrunk = slots.clone().normalized(2);
        assert_eq!(shrunk.capacity(), 2);
        assert!(shrunk.contains_url("a"));
        assert!(!shrunk.contains_url("b"));

        let grown = slots.normalized(5);
        assert!(grown.is_empty_at(SlotPosition::right(4)));
        assert_eq!(grown.position_of_url("b"), Some(SlotPosition::left(2)));
    }

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!("LEFT".parse::<PanelSide>(), Ok(PanelSide::Left));
        assert!("middle".parse::<PanelSide>().is_err());
    }
}
