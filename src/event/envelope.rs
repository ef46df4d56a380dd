//! Request/response state and the payload envelope sent to stage handlers.
//!
//! The serialized form is
//! `{"Records":[{"cf":{"config":{..},"request":{..},"response":{..}}}]}`.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::callback::CallbackResult;
use crate::event::headers::Headers;
use crate::event::stage::Stage;

/// Distribution metadata attached to every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConfig {
    pub distribution_id: String,
    pub distribution_name: String,
    pub event_type: Stage,
    pub request_id: Uuid,
}

impl EventConfig {
    pub fn new(
        distribution_id: impl Into<String>,
        distribution_name: impl Into<String>,
        request_id: Uuid,
    ) -> Self {
        Self {
            distribution_id: distribution_id.into(),
            distribution_name: distribution_name.into(),
            event_type: Stage::ViewerRequest,
            request_id,
        }
    }
}

/// Where the origin fetch goes, in the platform's event shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginDescriptor {
    Custom(CustomOrigin),
    S3(S3Origin),
}

impl OriginDescriptor {
    pub fn domain_name(&self) -> &str {
        match self {
            OriginDescriptor::Custom(origin) => &origin.domain_name,
            OriginDescriptor::S3(origin) => &origin.domain_name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            OriginDescriptor::Custom(origin) => &origin.path,
            OriginDescriptor::S3(origin) => &origin.path,
        }
    }

    pub fn custom_headers(&self) -> &Headers {
        match self {
            OriginDescriptor::Custom(origin) => &origin.custom_headers,
            OriginDescriptor::S3(origin) => &origin.custom_headers,
        }
    }

    /// Explicit protocol, if the origin pins one.
    pub fn protocol(&self) -> Option<&str> {
        match self {
            OriginDescriptor::Custom(origin) if !origin.protocol.is_empty() => {
                Some(&origin.protocol)
            }
            OriginDescriptor::Custom(_) => None,
            OriginDescriptor::S3(_) => Some("https"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOrigin {
    pub custom_headers: Headers,
    pub domain_name: String,
    pub keepalive_timeout: u64,
    pub path: String,
    pub port: u16,
    pub protocol: String,
    pub read_timeout: u64,
    pub ssl_protocols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Origin {
    pub auth_method: String,
    pub custom_headers: Headers,
    pub domain_name: String,
    pub path: String,
    pub region: String,
}

/// Request state owned by one in-flight pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRequest {
    pub client_ip: String,
    pub method: String,
    pub querystring: String,
    pub uri: String,
    pub headers: Headers,
    pub body: Option<String>,
    pub origin: Option<OriginDescriptor>,
}

impl EdgeRequest {
    /// Capture an inbound request. The body is kept as text when non-empty.
    pub fn from_parts(parts: &Parts, peer: SocketAddr, body: &Bytes) -> Self {
        Self {
            client_ip: peer.ip().to_string(),
            method: parts.method.to_string(),
            querystring: parts.uri.query().unwrap_or_default().to_string(),
            uri: parts.uri.path().to_string(),
            headers: Headers::from_http(&parts.headers),
            body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
            origin: None,
        }
    }

    /// Merge a request-side callback into this request.
    pub fn apply(&mut self, callback: &CallbackResult) {
        if let Some(uri) = callback.uri.as_deref().filter(|uri| !uri.is_empty()) {
            self.uri = uri.to_string();
        }
        if let Some(querystring) = &callback.querystring {
            self.querystring = querystring.clone();
        }
        if let Some(body) = &callback.body {
            self.body = Some(body.clone());
        }
        self.headers.merge(callback.headers.as_ref());
    }
}

/// Response state; the origin fetch produces the first one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeResponse {
    pub status: String,
    pub status_description: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl EdgeResponse {
    /// Merge a response-side callback into this response.
    pub fn apply(&mut self, callback: &CallbackResult) {
        if let Some(status) = callback.short_circuit_status() {
            self.status = status.to_string();
        }
        if let Some(description) = &callback.status_description {
            self.status_description = description.clone();
        }
        if let Some(body) = &callback.body {
            self.body = Bytes::from(body.clone());
        }
        self.headers.merge(callback.headers.as_ref());
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestView<'a> {
    client_ip: &'a str,
    headers: &'a Headers,
    method: &'a str,
    querystring: &'a str,
    uri: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<&'a OriginDescriptor>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseView<'a> {
    status: &'a str,
    status_description: &'a str,
    headers: &'a Headers,
}

#[derive(Serialize)]
struct CfRecord<'a> {
    config: &'a EventConfig,
    request: RequestView<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<ResponseView<'a>>,
}

#[derive(Serialize)]
struct Record<'a> {
    cf: CfRecord<'a>,
}

/// Payload for one stage invocation, borrowing the pipeline's state.
#[derive(Serialize)]
pub struct Envelope<'a> {
    #[serde(rename = "Records")]
    records: [Record<'a>; 1],
}

impl<'a> Envelope<'a> {
    /// Build the envelope for `config.event_type`. Viewer-facing stages do not
    /// see the origin; request-side stages do not see a response.
    pub fn new(
        config: &'a EventConfig,
        request: &'a EdgeRequest,
        response: Option<&'a EdgeResponse>,
    ) -> Self {
        let stage = config.event_type;
        let request = RequestView {
            client_ip: &request.client_ip,
            headers: &request.headers,
            method: &request.method,
            querystring: &request.querystring,
            uri: &request.uri,
            body: request.body.as_deref(),
            origin: request.origin.as_ref().filter(|_| stage.is_origin_facing()),
        };
        let response = response
            .filter(|_| !stage.is_request_side())
            .map(|response| ResponseView {
                status: &response.status,
                status_description: &response.status_description,
                headers: &response.headers,
            });

        Self {
            records: [Record {
                cf: CfRecord {
                    config,
                    request,
                    response,
                },
            }],
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
