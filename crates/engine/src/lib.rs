//! Play-by-mail engine library.
//!
//! This crate contains all server-side code for the play-by-mail engine.
//!
//! ## Structure
//!
//! - `use_cases/` - Turn processing, intake, rendering and the job workers
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

/// Test fixtures shared by the unit tests.
#[cfg(test)]
pub mod test_fixtures;

pub use app::App;
