//! Read-only header enforcement.
//!
//! # Responsibilities
//! - Hold the per-stage sets of headers a handler may never change
//! - Compare a handler's headers against the pre-invocation headers
//!
//! # Design Decisions
//! - Names are matched case-insensitively; wildcard families are prefixes
//! - Only the first value of a multi-value entry is compared
//! - Introducing a protected header that was absent is a violation

use thiserror::Error;

use crate::event::{eq_ignore_case, HeaderEntry, Headers, Stage};

/// Errors raised when a handler's headers break the policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// An entry's key does not belong under the name it is stored at.
    #[error("header entry {entry_key:?} is stored under mismatched name {map_key:?}")]
    HeaderKeyMismatch { map_key: String, entry_key: String },

    /// A protected header was changed, removed or introduced.
    #[error("read-only header {name:?} cannot be modified in {stage} (expected {expected:?}, got {actual:?})")]
    ReadOnlyViolation {
        stage: Stage,
        name: String,
        expected: Option<String>,
        actual: Option<String>,
    },
}

/// A set of protected header names.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnlySet {
    exact: &'static [&'static str],
    prefixes: &'static [&'static str],
}

impl ReadOnlySet {
    pub const fn new(exact: &'static [&'static str], prefixes: &'static [&'static str]) -> Self {
        Self { exact, prefixes }
    }

    /// Whether `name` is protected, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.exact.iter().any(|protected| *protected == name)
            || self.prefixes.iter().any(|prefix| name.starts_with(prefix))
    }
}

/// Never writable, at any stage.
pub const ALWAYS_READ_ONLY: ReadOnlySet = ReadOnlySet::new(
    &[
        "connection",
        "expect",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "proxy-connection",
        "trailer",
        "upgrade",
        "x-accel-buffering",
        "x-accel-charset",
        "x-accel-limit-rate",
        "x-accel-redirect",
        "x-amzn-auth",
        "x-amzn-cf-billing",
        "x-amzn-cf-id",
        "x-amzn-cf-xff",
        "x-amzn-errortype",
        "x-amzn-fle-profile",
        "x-amzn-header-count",
        "x-amzn-header-order",
        "x-amzn-lambda-integration-tag",
        "x-amzn-requestid",
        "x-cache",
        "x-forwarded-proto",
        "x-real-ip",
    ],
    &["x-amz-cf-", "x-edge-"],
);

/// Additionally protected during viewer-request.
pub const VIEWER_REQUEST_READ_ONLY: ReadOnlySet = ReadOnlySet::new(
    &["content-length", "host", "transfer-encoding", "via"],
    &[],
);

/// Additionally protected during origin-request.
pub const ORIGIN_REQUEST_READ_ONLY: ReadOnlySet = ReadOnlySet::new(
    &[
        "accept-encoding",
        "content-length",
        "if-modified-since",
        "if-none-match",
        "if-range",
        "if-unmodified-since",
        "transfer-encoding",
        "via",
    ],
    &[],
);

/// The three protected sets consulted by [`HeaderPolicy::check`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderPolicy {
    pub always: ReadOnlySet,
    pub viewer_request: ReadOnlySet,
    pub origin_request: ReadOnlySet,
}

impl HeaderPolicy {
    pub const STANDARD: HeaderPolicy = HeaderPolicy {
        always: ALWAYS_READ_ONLY,
        viewer_request: VIEWER_REQUEST_READ_ONLY,
        origin_request: ORIGIN_REQUEST_READ_ONLY,
    };

    fn sets_for(&self, stage: Stage) -> impl Iterator<Item = &ReadOnlySet> {
        let extra = match stage {
            Stage::ViewerRequest => Some(&self.viewer_request),
            Stage::OriginRequest => Some(&self.origin_request),
            Stage::OriginResponse | Stage::ViewerResponse => None,
        };
        std::iter::once(&self.always).chain(extra)
    }

    /// Validate `candidate` against `baseline` for `stage`.
    pub fn check(
        &self,
        stage: Stage,
        baseline: &Headers,
        candidate: Option<&Headers>,
    ) -> Result<(), PolicyError> {
        let Some(candidate) = candidate else {
            return Ok(());
        };

        for (name, entries) in candidate.iter() {
            if let Some(entry) = entries.iter().find(|entry| !eq_ignore_case(&entry.key, name)) {
                return Err(PolicyError::HeaderKeyMismatch {
                    map_key: name.clone(),
                    entry_key: entry.key.clone(),
                });
            }

            if !self.sets_for(stage).any(|set| set.contains(name)) {
                continue;
            }

            let expected = baseline.first_value(name);
            let actual = entries.first().map(|entry: &HeaderEntry| entry.value.as_str());
            if expected != actual {
                return Err(PolicyError::ReadOnlyViolation {
                    stage,
                    name: name.clone(),
                    expected: expected.map(str::to_string),
                    actual: actual.map(str::to_string),
                });
            }
        }

        Ok(())
    }
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}
