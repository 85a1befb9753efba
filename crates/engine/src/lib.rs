//! Studio Engine library.
//!
//! Server-side half of the studio: tracks remote image generations, places
//! finished images into panel slots, and serves both over HTTP.
//!
//! ## Structure
//!
//! - `use_cases/` - Generation registry and panel slot allocation
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
