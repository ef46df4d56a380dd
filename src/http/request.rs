//! Inbound request capture.
//!
//! # Responsibilities
//! - Generate the per-request identifier
//! - Buffer the body within the configured limit
//! - Turn the wire request into pipeline request state
//!
//! # Design Decisions
//! - The identifier is generated before routing so every answer carries it,
//!   including 404 and 413

use std::net::SocketAddr;

use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, Request};
use uuid::Uuid;

use crate::event::EdgeRequest;

/// Diagnostic header carrying the generated request id.
pub const REQUEST_ID_HEADER: &str = "x-edge-emulator-request-id";

/// Identifier shared by the envelope config and the diagnostic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a new random request id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The id as placed in the envelope's `requestId`.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// The id rendered for [`REQUEST_ID_HEADER`].
    pub fn header_value(&self) -> HeaderValue {
        let mut buf = Uuid::encode_buffer();
        // A hyphenated uuid is always a valid header value.
        HeaderValue::from_str(self.0.hyphenated().encode_lower(&mut buf))
            .unwrap_or_else(|_| HeaderValue::from_static("invalid"))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The body exceeded the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyTooLarge;

/// Buffer `request` and capture it as pipeline state.
pub async fn capture(
    request: Request<Body>,
    peer: SocketAddr,
    max_body_size: usize,
) -> Result<EdgeRequest, BodyTooLarge> {
    let (parts, body) = request.into_parts();
    let body: Bytes = axum::body::to_bytes(body, max_body_size)
        .await
        .map_err(|_| BodyTooLarge)?;
    Ok(EdgeRequest::from_parts(&parts, peer, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "203.0.113.7:51000".parse().unwrap()
    }

    #[tokio::test]
    async fn captures_method_path_query_and_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/bar?x=1")
            .header("Host", "localhost")
            .body(Body::from("hello"))
            .unwrap();

        let captured = capture(request, peer(), 1024).await.unwrap();
        assert_eq!(captured.method, "POST");
        assert_eq!(captured.uri, "/bar");
        assert_eq!(captured.querystring, "x=1");
        assert_eq!(captured.client_ip, "203.0.113.7");
        assert_eq!(captured.body.as_deref(), Some("hello"));
        assert_eq!(captured.headers.first_value("host"), Some("localhost"));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let request = Request::builder()
            .uri("/")
            .body(Body::from(vec![b'a'; 64]))
            .unwrap();
        assert_eq!(capture(request, peer(), 16).await.unwrap_err(), BodyTooLarge);
    }

    #[test]
    fn request_id_renders_as_hyphenated_uuid() {
        let id = RequestId::new();
        let value = id.header_value();
        assert_eq!(value.to_str().unwrap(), id.to_string());
        assert_eq!(value.len(), 36);
    }
}
