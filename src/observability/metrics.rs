//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define emulator metrics (requests, stage latency, handler and origin outcomes)
//! - Expose a Prometheus-compatible metrics endpoint when enabled
//!
//! # Metrics
//! - `edge_requests_total` (counter): requests by method, status, behavior
//! - `edge_request_duration_seconds` (histogram): end-to-end latency
//! - `edge_stage_duration_seconds` (histogram): per-stage latency by outcome
//! - `edge_handler_invocations_total` (counter): by stage and result
//! - `edge_origin_fetches_total` (counter): by origin and result
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Histogram buckets tuned for handler process latencies

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use thiserror::Error;

use crate::event::Stage;
use crate::pipeline::{PipelineError, PipelineOutcome};

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to build metrics exporter: {0}")]
    Build(String),
    #[error("failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    describe();

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

fn describe() {
    describe_counter!("edge_requests_total", "Requests answered by the emulator");
    describe_histogram!(
        "edge_request_duration_seconds",
        "Time from request receipt to response"
    );
    describe_histogram!("edge_stage_duration_seconds", "Time spent in one pipeline stage");
    describe_counter!(
        "edge_handler_invocations_total",
        "Stage handler invocations by result"
    );
    describe_counter!("edge_origin_fetches_total", "Origin fetches by result");
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "success"
    } else {
        "failure"
    }
}

pub fn record_request(method: &str, status: u16, behavior: &str, started: Instant) {
    counter!(
        "edge_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "behavior" => behavior.to_string()
    )
    .increment(1);
    histogram!(
        "edge_request_duration_seconds",
        "method" => method.to_string(),
        "behavior" => behavior.to_string()
    )
    .record(started.elapsed().as_secs_f64());
}

/// Record one stage; `step` is what the stage produced.
pub fn record_stage(
    stage: Stage,
    step: &Result<Option<PipelineOutcome>, PipelineError>,
    started: Instant,
) {
    let outcome = match step {
        Ok(None) => "continued",
        Ok(Some(_)) => "answered",
        Err(e) => e.kind(),
    };
    histogram!(
        "edge_stage_duration_seconds",
        "stage" => stage.as_str(),
        "outcome" => outcome
    )
    .record(started.elapsed().as_secs_f64());
}

pub fn record_handler_invocation(stage: Stage, ok: bool) {
    counter!(
        "edge_handler_invocations_total",
        "stage" => stage.as_str(),
        "result" => result_label(ok)
    )
    .increment(1);
}

pub fn record_origin_fetch(origin: &str, ok: bool) {
    counter!(
        "edge_origin_fetches_total",
        "origin" => origin.to_string(),
        "result" => result_label(ok)
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        let started = Instant::now();
        record_request("GET", 200, "/bar", started);
        record_stage(Stage::ViewerRequest, &Ok(None), started);
        record_handler_invocation(Stage::OriginResponse, false);
        record_origin_fetch("site", true);
    }
}
