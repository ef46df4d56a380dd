//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Startup
//!     → listener.rs (resolve and bind once)
//!     → tls.rs (optional: PEM files or generated certificate)
//!     → handed to the HTTP server, reused across reloads
//!
//! Per request
//!     → connection.rs (in-flight guard held for the whole pipeline)
//! ```
//!
//! # Design Decisions
//! - One bound socket for the life of the process
//! - TLS is optional and handled transparently by axum-server

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{InFlightGuard, InFlightTracker};
pub use listener::{bind, ListenerError};
pub use tls::TlsError;
