//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, route table generations)
//!     → request.rs (request id, body limit, capture as pipeline state)
//!     → routing + pipeline
//!     → response.rs (outcome or 502 page)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, REQUEST_ID_HEADER};
pub use server::{HttpServer, ServerError};
