//! The four pipeline stages.

use serde::{Deserialize, Serialize};

/// A fixed point in the edge request lifecycle.
///
/// Stages always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    ViewerRequest,
    OriginRequest,
    OriginResponse,
    ViewerResponse,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::ViewerRequest,
        Stage::OriginRequest,
        Stage::OriginResponse,
        Stage::ViewerResponse,
    ];

    /// Stages that run before the origin fetch.
    pub const REQUEST_SIDE: [Stage; 2] = [Stage::ViewerRequest, Stage::OriginRequest];

    /// Stages that run after the origin fetch.
    pub const RESPONSE_SIDE: [Stage; 2] = [Stage::OriginResponse, Stage::ViewerResponse];

    /// The event type tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ViewerRequest => "viewer-request",
            Stage::OriginRequest => "origin-request",
            Stage::OriginResponse => "origin-response",
            Stage::ViewerResponse => "viewer-response",
        }
    }

    /// Request-side stages mutate the request; the rest mutate the response.
    pub fn is_request_side(&self) -> bool {
        matches!(self, Stage::ViewerRequest | Stage::OriginRequest)
    }

    /// Origin-facing stages see the origin descriptor in their payload.
    pub fn is_origin_facing(&self) -> bool {
        matches!(self, Stage::OriginRequest | Stage::OriginResponse)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
