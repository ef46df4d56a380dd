//! Per-request pipeline failures.

use thiserror::Error;

use crate::event::Stage;
use crate::handler::InvocationError;
use crate::origin::FetchError;
use crate::security::PolicyError;

/// Anything that aborts a request. All variants end up as a 502 page.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Origin(#[from] FetchError),

    #[error("{stage} handler failed: {source}")]
    HandlerExecution {
        stage: Stage,
        #[source]
        source: InvocationError,
    },

    #[error("{stage} handler modified a read-only header: {source}")]
    HeaderPolicy {
        stage: Stage,
        #[source]
        source: PolicyError,
    },

    #[error("{stage} handler returned an unreadable result: {source}")]
    InvalidCallback {
        stage: Stage,
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid status code {0:?}")]
    InvalidStatusCode(String),

    #[error("failed to serialize {stage} payload: {source}")]
    EnvelopeSerialization {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// Short heading for the error page.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::Origin(FetchError::BodyRead { .. }) => "failed to read the origin response",
            PipelineError::Origin(_) => "failed to make origin request",
            PipelineError::HandlerExecution { .. } => "failed to execute the handler",
            PipelineError::HeaderPolicy { .. } => "read-only headers were modified",
            PipelineError::InvalidCallback { .. } => "failed to parse the handler result",
            PipelineError::InvalidStatusCode(_) => "invalid status code",
            PipelineError::EnvelopeSerialization { .. } => "failed to build the event payload",
        }
    }

    /// Raw diagnostic payload: the error chain plus anything the handler printed.
    pub fn diagnostic(&self) -> String {
        let mut text = self.to_string();
        match self {
            PipelineError::HandlerExecution { source, .. } => {
                if let Some(output) = source.output().filter(|output| !output.trim().is_empty()) {
                    text.push_str("\n\n");
                    text.push_str(output);
                }
            }
            PipelineError::InvalidCallback { raw, .. } => {
                text.push_str("\n\n");
                text.push_str(raw);
            }
            _ => {}
        }
        text
    }

    /// Metric label for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Origin(FetchError::BodyRead { .. }) => "origin_body_read",
            PipelineError::Origin(_) => "origin_unreachable",
            PipelineError::HandlerExecution { .. } => "handler_execution",
            PipelineError::HeaderPolicy { .. } => "header_policy",
            PipelineError::InvalidCallback { .. } => "invalid_callback",
            PipelineError::InvalidStatusCode(_) => "invalid_status",
            PipelineError::EnvelopeSerialization { .. } => "envelope_serialization",
        }
    }
}
