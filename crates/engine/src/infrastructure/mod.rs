//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod account_directory;
pub mod cache;
pub mod clock;
pub mod config;
pub mod correlation;
pub mod job_queue;
pub mod memory;
pub mod ports;
pub mod postgres;
pub mod renderer_client;
pub mod vision_client;
