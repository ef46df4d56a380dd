//! Response rendering.
//!
//! # Responsibilities
//! - Write a pipeline outcome to the wire
//! - Render pipeline failures as a 502 HTML page
//!
//! # Design Decisions
//! - Framing headers are recomputed from the final body
//! - Diagnostics are HTML-escaped; handler output is never trusted markup

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::pipeline::{PipelineError, PipelineOutcome};

pub fn render_outcome(outcome: PipelineOutcome) -> Response {
    let mut headers = outcome.headers.to_http();
    headers.remove(header::CONTENT_LENGTH);

    let mut response = Response::new(Body::from(outcome.body));
    *response.status_mut() = outcome.status;
    *response.headers_mut() = headers;
    response
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// The 502 page shown for any pipeline failure.
pub fn error_page(error: &PipelineError) -> Response {
    let label = escape_html(error.label());
    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head><title>502 ERROR</title></head>\n<body>\n\
         <h1>502 ERROR</h1>\n<h2>{label}</h2>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(&error.diagnostic()),
    );

    (
        StatusCode::BAD_GATEWAY,
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"))],
        page,
    )
        .into_response()
}

pub fn not_found(path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("No behavior matches {path}\n"),
    )
        .into_response()
}

pub fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error\n").into_response()
}

pub fn payload_too_large(limit: usize) -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("Request body exceeds {limit} bytes\n"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Headers, Stage};
    use crate::handler::InvocationError;
    use axum::body::Bytes;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn outcome_keeps_status_headers_and_body() {
        let outcome = PipelineOutcome {
            status: StatusCode::FOUND,
            status_description: "Found".into(),
            headers: Headers::parse([("Location", "/login"), ("Content-Length", "999")]),
            body: Bytes::from_static(b"moved"),
            short_circuited: Some(Stage::ViewerRequest),
        };

        let response = render_outcome(outcome);
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], "/login");
        assert!(response.headers().get("content-length").is_none());
        assert_eq!(body_text(response).await, "moved");
    }

    #[tokio::test]
    async fn error_page_is_escaped_html() {
        let error = PipelineError::HandlerExecution {
            stage: Stage::OriginRequest,
            source: InvocationError::Failed {
                status: "exit status: 1".into(),
                output: "<script>alert(1)</script>".into(),
            },
        };

        let response = error_page(&error);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));

        let page = body_text(response).await;
        assert!(page.contains("failed to execute the handler"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
    }
}
