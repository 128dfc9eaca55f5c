//! Use cases - user story orchestration.
//!
//! Each module owns one area of the engine. Use cases take a
//! [`RequestContext`], open store transactions with the caller's scope and
//! talk to external services only through the ports.

pub mod advance;
pub mod authoring;
pub mod context;
pub mod error;
pub mod images;
pub mod instances;
pub mod jobs;
pub mod join;
pub mod render;
pub mod scanners;
pub mod scheduler;
pub mod sheets;
pub mod templates;
pub mod upload;

pub use advance::{AdvanceError, AdvanceOutcome, TurnAdvancer};
pub use authoring::{AuthoringError, CreatedGame, GameAuthoring, ImportSummary, NewGame};
pub use context::{AccessError, RequestContext};
pub use error::ErrorKind;
pub use images::{ImageError, ImageUpload, SheetImages};
pub use instances::{Instances, TransitionError};
pub use join::{EnrollError, EnrollOutcome, PlayerEnrollment};
pub use render::{RenderOutcome, RenderSheetError, SheetRenderer};
pub use scanners::ScannerRegistry;
pub use scheduler::{DeadlineSweeper, JobOutcome, JobReport, JobRunner, SweepReport};
pub use sheets::{SheetQueryError, TurnSheetQueries};
pub use templates::{SheetTemplates, TemplateError};
pub use upload::{TurnSheetUploads, UploadError, UploadOutcome};
