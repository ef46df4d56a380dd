//! Origin fetch.
//!
//! # Responsibilities
//! - Build the upstream URL from origin domain, origin path and request URI
//! - Forward the request's headers (plus origin custom headers)
//! - Issue the request with a bounded timeout
//! - Convert the upstream answer into an `EdgeResponse`
//!
//! # Design Decisions
//! - Runs exactly once per request, right before origin-response
//! - Redirects are returned to the pipeline, never followed
//! - Framing headers are recomputed by the client, not forwarded

use std::time::Duration;

use axum::http::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::event::{EdgeRequest, EdgeResponse, Headers, OriginDescriptor};

/// Default upper bound for one origin round trip.
pub const DEFAULT_ORIGIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Request headers the client derives itself.
const NOT_FORWARDED: &[&str] = &["host", "content-length", "transfer-encoding", "connection"];

/// Errors that abort an origin fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid origin url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid request method {0:?}")]
    InvalidMethod(String),

    #[error("origin unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read origin response body from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Scheme used when the origin does not pin one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolHint {
    #[default]
    Http,
    Https,
}

impl ProtocolHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolHint::Http => "http",
            ProtocolHint::Https => "https",
        }
    }
}

/// Join origin path and request URI into one absolute path with single slashes.
fn join_path(origin_path: &str, uri: &str) -> String {
    let segments = origin_path
        .split('/')
        .chain(uri.split('/'))
        .filter(|segment| !segment.is_empty());
    let mut path = String::from("/");
    path.push_str(&segments.collect::<Vec<_>>().join("/"));
    if uri.ends_with('/') && path.len() > 1 {
        path.push('/');
    }
    path
}

/// Full upstream URL for `request` against `origin`.
pub fn origin_url(
    request: &EdgeRequest,
    origin: &OriginDescriptor,
    hint: ProtocolHint,
) -> Result<Url, FetchError> {
    let scheme = origin.protocol().unwrap_or(hint.as_str());
    let domain = origin.domain_name().trim_end_matches('/');
    let raw = format!("{scheme}://{domain}{}", join_path(origin.path(), &request.uri));
    let mut url = Url::parse(&raw).map_err(|source| FetchError::InvalidUrl { url: raw, source })?;
    if !request.querystring.is_empty() {
        url.set_query(Some(&request.querystring));
    }
    Ok(url)
}

fn outbound_headers(request: &Headers, origin: &OriginDescriptor) -> HeaderMap {
    let mut map = HeaderMap::new();
    let forwarded = request
        .iter()
        .filter(|(name, _)| !NOT_FORWARDED.contains(&name.as_str()));
    for (name, entries) in forwarded.chain(origin.custom_headers().iter()) {
        let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        map.remove(&header);
        for entry in entries {
            if let Ok(value) = HeaderValue::from_str(&entry.value) {
                map.append(header.clone(), value);
            }
        }
    }
    map
}

/// HTTP client used for origin fetches.
#[derive(Debug, Clone)]
pub struct OriginClient {
    client: reqwest::Client,
}

impl OriginClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self { client })
    }

    /// Fetch the baseline response for `request` from `origin`.
    pub async fn fetch(
        &self,
        request: &EdgeRequest,
        origin: &OriginDescriptor,
        hint: ProtocolHint,
    ) -> Result<EdgeResponse, FetchError> {
        let url = origin_url(request, origin, hint)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidMethod(request.method.clone()))?;
        let url_text = url.to_string();

        tracing::debug!(url = %url_text, method = %method, "Fetching origin");

        let mut outbound = self
            .client
            .request(method, url)
            .headers(outbound_headers(&request.headers, origin));
        if let Some(body) = &request.body {
            outbound = outbound.body(body.clone());
        }

        let response = outbound
            .send()
            .await
            .map_err(|source| FetchError::Unreachable {
                url: url_text.clone(),
                source,
            })?;

        let status = response.status();
        let headers = Headers::end_to_end(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::BodyRead {
                url: url_text.clone(),
                source,
            })?;

        tracing::debug!(url = %url_text, status = status.as_u16(), bytes = body.len(), "Origin responded");

        Ok(EdgeResponse {
            status: status.as_u16().to_string(),
            status_description: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CustomOrigin, S3Origin};

    fn custom(domain: &str, path: &str, protocol: &str) -> OriginDescriptor {
        OriginDescriptor::Custom(CustomOrigin {
            custom_headers: Headers::parse([("x-origin-secret", "s3cr3t")]),
            domain_name: domain.into(),
            keepalive_timeout: 5,
            path: path.into(),
            port: 80,
            protocol: protocol.into(),
            read_timeout: 30,
            ssl_protocols: vec![],
        })
    }

    fn request(uri: &str, query: &str) -> EdgeRequest {
        EdgeRequest {
            client_ip: "127.0.0.1".into(),
            method: "GET".into(),
            querystring: query.into(),
            uri: uri.into(),
            headers: Headers::parse([("Host", "localhost:8080"), ("Accept", "text/html")]),
            body: None,
            origin: None,
        }
    }

    #[test]
    fn joins_domain_path_and_uri() {
        let url = origin_url(
            &request("/foo", ""),
            &custom("example.com", "/base/", ""),
            ProtocolHint::Http,
        )
        .unwrap();
        assert_eq!(url.as_str(), "http://example.com/base/foo");
    }

    #[test]
    fn keeps_query_and_trailing_slash() {
        let url = origin_url(
            &request("/dir/", "a=1&b=2"),
            &custom("127.0.0.1:9000", "", "https"),
            ProtocolHint::Http,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://127.0.0.1:9000/dir/?a=1&b=2");
    }

    #[test]
    fn root_request_maps_to_origin_root() {
        let url = origin_url(&request("/", ""), &custom("example.com", "", ""), ProtocolHint::Https)
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn s3_origins_use_https() {
        let origin = OriginDescriptor::S3(S3Origin {
            auth_method: "none".into(),
            custom_headers: Headers::new(),
            domain_name: "bucket.s3.amazonaws.com".into(),
            path: "".into(),
            region: "us-east-1".into(),
        });
        let url = origin_url(&request("/a.png", ""), &origin, ProtocolHint::Http).unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn outbound_headers_skip_host_and_add_custom_headers() {
        let request = request("/", "");
        let headers = outbound_headers(&request.headers, &custom("example.com", "", ""));
        assert!(headers.get("host").is_none());
        assert_eq!(headers.get("accept").unwrap(), "text/html");
        assert_eq!(headers.get("x-origin-secret").unwrap(), "s3cr3t");
    }

    #[tokio::test]
    async fn unreachable_origin_is_reported() {
        let client = OriginClient::new(Duration::from_secs(2)).unwrap();
        let err = client
            .fetch(
                &request("/", ""),
                &custom("127.0.0.1:1", "", "http"),
                ProtocolHint::Http,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Unreachable { .. }));
    }
}
