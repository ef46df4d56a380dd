//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! EdgeRequest
//!     → viewer-request handler   (may rewrite or answer)
//!     → origin-request handler   (may rewrite or answer)
//!     → origin fetch             (baseline response)
//!     → origin-response handler  (may rewrite or answer)
//!     → viewer-response handler  (may rewrite or answer)
//!     → PipelineOutcome | PipelineError
//! ```
//!
//! # Design Decisions
//! - Each request owns its state; pipelines never share mutable data
//! - Any failure aborts the request; no stage is retried

pub mod engine;
pub mod error;

pub use engine::{Behavior, Pipeline, PipelineOutcome, PipelineSettings};
pub use error::PipelineError;
