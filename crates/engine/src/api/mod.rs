//! API layer - HTTP entry points.

pub mod caller;
pub mod error;
pub mod http;

pub use error::ApiError;
