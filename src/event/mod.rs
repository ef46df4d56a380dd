//! Edge event model.
//!
//! # Data Flow
//! ```text
//! Inbound HTTP request
//!     → headers.rs (case-insensitive multi-value header map)
//!     → envelope.rs (EdgeRequest / EdgeResponse / Envelope)
//!     → serialized payload handed to a stage handler
//!
//! Handler reply
//!     → callback.rs (CallbackResult)
//!     → merged back into EdgeRequest / EdgeResponse
//! ```
//!
//! # Design Decisions
//! - Wire shapes follow the platform's documented event schema
//! - Header lookups always go through the lowercase name
//! - The envelope borrows pipeline state; serializing never clones it

pub mod callback;
pub mod envelope;
pub mod headers;
pub mod stage;

pub use callback::CallbackResult;
pub use envelope::{
    CustomOrigin, EdgeRequest, EdgeResponse, Envelope, EventConfig, OriginDescriptor, S3Origin,
};
pub use headers::{eq_ignore_case, HeaderEntry, Headers};
pub use stage::Stage;
