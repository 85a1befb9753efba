//! Use cases - User story orchestration.
//!
//! Each module contains use cases for a specific domain area.

pub mod generation;
pub mod panels;

pub use generation::GenerationUseCases;
pub use panels::PanelUseCases;
