//! The four-stage request pipeline.
//!
//! # Responsibilities
//! - Drive one request through viewer-request, origin-request,
//!   origin-response and viewer-response, in that order
//! - Build each stage's envelope, invoke its handler, validate and merge
//! - Fetch the origin right before origin-response
//! - Stop early when a handler answers with a status
//!
//! # Design Decisions
//! - A stage without a handler passes state through untouched
//! - Request and response state are owned by the executing task
//! - Header validation runs against the request headers as they were before
//!   the handler ran, on both sides of the origin

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::StatusCode;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::StageHandlers;
use crate::event::{
    CallbackResult, EdgeRequest, EdgeResponse, Envelope, EventConfig, Headers, OriginDescriptor,
    Stage,
};
use crate::handler::{HandlerInvoker, Invocation};
use crate::observability::metrics;
use crate::origin::{OriginClient, ProtocolHint};
use crate::pipeline::error::PipelineError;
use crate::security::HeaderPolicy;

/// A behavior resolved against its origin.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub path: String,
    pub origin_name: String,
    pub origin: OriginDescriptor,
    pub handlers: StageHandlers,
}

/// Settings shared by every pipeline built from one configuration snapshot.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub distribution_id: String,
    pub distribution_name: String,
    pub working_directory: PathBuf,
    pub handler_timeout: Duration,
    pub protocol: ProtocolHint,
}

/// What the client receives when the pipeline completes.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub status: StatusCode,
    pub status_description: String,
    pub headers: Headers,
    pub body: Bytes,
    /// The stage that ended the pipeline early, if any.
    pub short_circuited: Option<Stage>,
}

fn parse_status(status: &str) -> Result<StatusCode, PipelineError> {
    StatusCode::from_bytes(status.trim().as_bytes())
        .map_err(|_| PipelineError::InvalidStatusCode(status.to_string()))
}

impl PipelineOutcome {
    /// Answer straight from a request-side handler's reply.
    fn from_callback(stage: Stage, status: &str, callback: CallbackResult) -> Result<Self, PipelineError> {
        Ok(Self {
            status: parse_status(status)?,
            status_description: callback.status_description.unwrap_or_default(),
            headers: callback.headers.unwrap_or_default(),
            body: callback.body.map(Bytes::from).unwrap_or_default(),
            short_circuited: Some(stage),
        })
    }

    fn from_response(response: EdgeResponse, short_circuited: Option<Stage>) -> Result<Self, PipelineError> {
        Ok(Self {
            status: parse_status(&response.status)?,
            status_description: response.status_description,
            headers: response.headers,
            body: response.body,
            short_circuited,
        })
    }
}

/// Executes the stage pipeline for one behavior.
pub struct Pipeline {
    behavior: Behavior,
    settings: Arc<PipelineSettings>,
    origin_client: OriginClient,
    invoker: Arc<dyn HandlerInvoker>,
    policy: HeaderPolicy,
}

impl Pipeline {
    pub fn new(
        behavior: Behavior,
        settings: Arc<PipelineSettings>,
        origin_client: OriginClient,
        invoker: Arc<dyn HandlerInvoker>,
    ) -> Self {
        Self {
            behavior,
            settings,
            origin_client,
            invoker,
            policy: HeaderPolicy::STANDARD,
        }
    }

    /// The behavior this pipeline serves.
    pub fn behavior(&self) -> &Behavior {
        &self.behavior
    }

    /// Run all stages for `request`.
    pub async fn execute(
        &self,
        request_id: Uuid,
        mut request: EdgeRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        request.origin = Some(self.behavior.origin.clone());
        let mut config = EventConfig::new(
            &self.settings.distribution_id,
            &self.settings.distribution_name,
            request_id,
        );

        for stage in Stage::REQUEST_SIDE {
            config.event_type = stage;
            let started = Instant::now();
            let step = self
                .request_stage(stage, &config, &mut request)
                .instrument(self.stage_span(request_id, stage))
                .await;
            metrics::record_stage(stage, &step, started);
            if let Some(outcome) = step? {
                return Ok(outcome);
            }
        }

        let fetched = self
            .origin_client
            .fetch(&request, &self.behavior.origin, self.settings.protocol)
            .await;
        metrics::record_origin_fetch(&self.behavior.origin_name, fetched.is_ok());
        let mut response = fetched?;

        for stage in Stage::RESPONSE_SIDE {
            config.event_type = stage;
            let started = Instant::now();
            let step = self
                .response_stage(stage, &config, &request, &mut response)
                .instrument(self.stage_span(request_id, stage))
                .await;
            metrics::record_stage(stage, &step, started);
            if let Some(outcome) = step? {
                return Ok(outcome);
            }
        }

        PipelineOutcome::from_response(response, None)
    }

    fn stage_span(&self, request_id: Uuid, stage: Stage) -> tracing::Span {
        tracing::info_span!(
            "stage",
            request_id = %request_id,
            stage = %stage,
            behavior = %self.behavior.path,
        )
    }

    /// Invoke the handler for `stage`, if one is configured, and parse its reply.
    async fn call_handler(
        &self,
        stage: Stage,
        envelope: Envelope<'_>,
    ) -> Result<Option<CallbackResult>, PipelineError> {
        let Some(handler) = self.behavior.handlers.get(stage) else {
            tracing::trace!("No handler configured, passing through");
            return Ok(None);
        };

        let payload = envelope
            .to_bytes()
            .map_err(|source| PipelineError::EnvelopeSerialization { stage, source })?;

        let raw = self
            .invoker
            .invoke(Invocation {
                stage,
                payload: &payload,
                handler,
                working_directory: &self.settings.working_directory,
                timeout: self.settings.handler_timeout,
            })
            .await;
        metrics::record_handler_invocation(stage, raw.is_ok());
        let raw = raw.map_err(|source| PipelineError::HandlerExecution { stage, source })?;

        let callback = CallbackResult::parse(&raw).map_err(|source| PipelineError::InvalidCallback {
            stage,
            raw: String::from_utf8_lossy(&raw).into_owned(),
            source,
        })?;
        tracing::debug!(handler = %handler, status = ?callback.status, "Handler completed");
        Ok(Some(callback))
    }

    async fn request_stage(
        &self,
        stage: Stage,
        config: &EventConfig,
        request: &mut EdgeRequest,
    ) -> Result<Option<PipelineOutcome>, PipelineError> {
        let envelope = Envelope::new(config, request, None);
        let Some(callback) = self.call_handler(stage, envelope).await? else {
            return Ok(None);
        };

        self.policy
            .check(stage, &request.headers, callback.headers.as_ref())
            .map_err(|source| PipelineError::HeaderPolicy { stage, source })?;
        request.apply(&callback);

        match callback.short_circuit_status().map(str::to_string) {
            Some(status) => {
                tracing::info!(status = %status, "Handler answered the request");
                PipelineOutcome::from_callback(stage, &status, callback).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn response_stage(
        &self,
        stage: Stage,
        config: &EventConfig,
        request: &EdgeRequest,
        response: &mut EdgeResponse,
    ) -> Result<Option<PipelineOutcome>, PipelineError> {
        let envelope = Envelope::new(config, request, Some(&*response));
        let Some(callback) = self.call_handler(stage, envelope).await? else {
            return Ok(None);
        };

        // Every stage measures protected headers against the request.
        self.policy
            .check(stage, &request.headers, callback.headers.as_ref())
            .map_err(|source| PipelineError::HeaderPolicy { stage, source })?;
        response.apply(&callback);

        if callback.short_circuit_status().is_some() {
            tracing::info!(status = %response.status, "Handler answered the request");
            return PipelineOutcome::from_response(std::mem::take(response), Some(stage)).map(Some);
        }
        Ok(None)
    }
}
