//! Local emulator for an edge CDN request pipeline.
//!
//! A request entering the emulator is matched against configured behaviors
//! and driven through four stages (viewer-request, origin-request,
//! origin-response, viewer-response). Each stage may hand the request or
//! response to an external handler process, which can rewrite it or answer
//! it directly.

pub mod config;
pub mod event;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod origin;
pub mod pipeline;
pub mod routing;
pub mod security;

pub use config::EmulatorConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
