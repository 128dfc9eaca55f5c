//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Persistence (Postgres or in-memory)
//! - Vision/OCR and PDF rendering (HTTP services)
//! - The job queue (SQLite)
//! - The account directory
//! - Clock/Random (for testing)

mod error;
mod external;
mod repos;
mod testing;

// =============================================================================
// Store Ports
// =============================================================================
pub use repos::{AccessScope, Store, StoreTx};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    AccountDirectoryPort, BackgroundImage, FieldReading, Job, JobCounts, JobKind, JobQueuePort,
    JobStatus, RenderRequest, RendererPort, VisionPort,
};

#[cfg(test)]
pub use external::{
    MockAccountDirectoryPort, MockJobQueuePort, MockRendererPort, MockVisionPort,
};

#[cfg(test)]
pub use testing::MockClockPort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, RandomPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::{DirectoryError, QueueError, RenderError, RepoError, ScanError};
