//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate path patterns)
//!     → Return: matched Route (with its Pipeline) or NoMatch
//!
//! Route Compilation (startup and every reload):
//!     EmulatorConfig.behaviors[]
//!     → Resolve origin by name
//!     → Compile path patterns
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Tables are compiled once per configuration snapshot, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route
//! - First match wins (configuration order)

pub mod matcher;
pub mod router;

pub use matcher::PathPattern;
pub use router::{Route, RouteTable};
