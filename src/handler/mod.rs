//! Stage handler invocation.
//!
//! # Data Flow
//! ```text
//! Pipeline stage
//!     → HandlerInvoker::invoke(Invocation)
//!         → callback.rs (per-invocation loopback listener + completion gate)
//!         → node.rs (spawn the handler runtime with the envelope on stdin)
//!         → handler POSTs its result to the callback URL exactly once
//!     → raw callback bytes back to the pipeline
//! ```
//!
//! # Design Decisions
//! - Handlers run outside the emulator's address space
//! - Every invocation owns its listener and gate; nothing is shared across
//!   requests or stages
//! - The first callback wins; later deliveries are acknowledged and dropped

pub mod callback;
pub mod node;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Stage;

pub use callback::CallbackListener;
pub use node::NodeInvoker;

/// Locates a handler: a directory under the working directory plus a
/// `file.export` entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerRef {
    pub path: String,
    pub handler: String,
}

impl HandlerRef {
    pub fn new(path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            handler: handler.into(),
        }
    }

    /// Split `handler` into module file stem and exported function name.
    pub fn entry_point(&self) -> Option<(&str, &str)> {
        let (file, export) = self.handler.rsplit_once('.')?;
        (!file.is_empty() && !export.is_empty()).then_some((file, export))
    }
}

impl std::fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.path.trim_end_matches('/'), self.handler)
    }
}

/// One stage's call into external handler code.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub stage: Stage,
    pub payload: &'a [u8],
    pub handler: &'a HandlerRef,
    pub working_directory: &'a Path,
    pub timeout: Duration,
}

/// Errors that fail a handler invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("malformed handler reference {0:?}; expected <file>.<export>")]
    InvalidHandler(String),

    #[error("failed to open callback listener: {0}")]
    Listener(#[source] std::io::Error),

    #[error("failed to launch handler runtime {runtime:?}: {source}")]
    Spawn {
        runtime: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handler exited with {status}")]
    Failed { status: String, output: String },

    #[error("handler did not complete within {0:?}")]
    Timeout(Duration),

    #[error("handler exited without invoking its callback")]
    MissingCallback { output: String },
}

impl InvocationError {
    /// Captured process output, when there is any.
    pub fn output(&self) -> Option<&str> {
        match self {
            InvocationError::Failed { output, .. } | InvocationError::MissingCallback { output } => {
                Some(output)
            }
            _ => None,
        }
    }
}

/// Executes a stage handler and returns the raw callback body.
#[async_trait]
pub trait HandlerInvoker: Send + Sync {
    async fn invoke(&self, invocation: Invocation<'_>) -> Result<Bytes, InvocationError>;
}
