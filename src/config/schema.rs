//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the emulator.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::event::{CustomOrigin, Headers, OriginDescriptor, S3Origin, Stage};
use crate::handler::HandlerRef;

/// Root configuration for the emulator.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Distribution metadata reported to handlers.
    pub distribution: DistributionConfig,

    /// Where handlers live and how they run.
    pub handlers: HandlersConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Named origins.
    pub origins: BTreeMap<String, OriginConfig>,

    /// Behaviors in match order.
    pub behaviors: Vec<BehaviorConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host name or IP to bind.
    pub address: String,

    /// Port to bind. 443 switches the listener to TLS.
    pub port: u16,

    /// Optional certificate files. Without them a self-signed certificate is generated.
    pub tls: Option<TlsConfig>,

    /// Largest accepted request body, in bytes.
    pub max_body_size: usize,
}

impl ListenerConfig {
    pub const SECURE_PORT: u16 = 443;

    pub fn is_secure(&self) -> bool {
        self.port == Self::SECURE_PORT || self.tls.is_some()
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: Self::SECURE_PORT,
            tls: None,
            max_body_size: 1024 * 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DistributionConfig {
    pub id: String,
    pub name: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            id: "E1234567890".to_string(),
            name: "E1234567890".to_string(),
        }
    }
}

/// Handler runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HandlersConfig {
    /// Root that handler paths are resolved against. Relative paths are
    /// resolved against the configuration file's directory.
    pub working_directory: PathBuf,

    /// Runtime executable used to run handlers.
    pub runtime: String,

    /// Upper bound for one handler invocation, in seconds.
    pub timeout_secs: u64,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            working_directory: PathBuf::from("."),
            runtime: "node".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Timeout configuration for outbound operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin round trip timeout in seconds.
    pub origin_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { origin_secs: 5 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    #[default]
    Custom,
    S3,
}

/// An upstream origin.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct OriginConfig {
    /// Host, optionally with a port (e.g. "example.com" or "127.0.0.1:9000").
    pub domain: String,

    /// Path prefix prepended to every request URI.
    pub path: String,

    /// "http" or "https". Empty defers to the listener's scheme.
    pub protocol: String,

    pub kind: OriginKind,

    /// S3 region; ignored for custom origins.
    pub region: String,

    /// Headers added to every origin request.
    pub custom_headers: BTreeMap<String, String>,
}

impl OriginConfig {
    fn port(&self) -> u16 {
        self.domain
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(if self.protocol == "https" { 443 } else { 80 })
    }

    /// The descriptor handlers see in origin-facing payloads.
    pub fn descriptor(&self) -> OriginDescriptor {
        let custom_headers = Headers::parse(
            self.custom_headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        );
        match self.kind {
            OriginKind::Custom => OriginDescriptor::Custom(CustomOrigin {
                custom_headers,
                domain_name: self.domain.clone(),
                keepalive_timeout: 5,
                path: self.path.clone(),
                port: self.port(),
                protocol: self.protocol.clone(),
                read_timeout: 30,
                ssl_protocols: vec!["TLSv1.2".to_string()],
            }),
            OriginKind::S3 => OriginDescriptor::S3(S3Origin {
                auth_method: "none".to_string(),
                custom_headers,
                domain_name: self.domain.clone(),
                path: self.path.clone(),
                region: self.region.clone(),
            }),
        }
    }
}

/// Per-stage handler references. A missing stage passes through.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StageHandlers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_request: Option<HandlerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_request: Option<HandlerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_response: Option<HandlerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_response: Option<HandlerRef>,
}

impl StageHandlers {
    pub fn get(&self, stage: Stage) -> Option<&HandlerRef> {
        match stage {
            Stage::ViewerRequest => self.viewer_request.as_ref(),
            Stage::OriginRequest => self.origin_request.as_ref(),
            Stage::OriginResponse => self.origin_response.as_ref(),
            Stage::ViewerResponse => self.viewer_response.as_ref(),
        }
    }

    pub fn set(&mut self, stage: Stage, handler: HandlerRef) {
        let slot = match stage {
            Stage::ViewerRequest => &mut self.viewer_request,
            Stage::OriginRequest => &mut self.origin_request,
            Stage::OriginResponse => &mut self.origin_response,
            Stage::ViewerResponse => &mut self.viewer_response,
        };
        *slot = Some(handler);
    }

    /// Configured handlers in stage order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &HandlerRef)> {
        Stage::ALL
            .into_iter()
            .filter_map(move |stage| self.get(stage).map(|handler| (stage, handler)))
    }
}

/// A route: path pattern, origin and stage handlers.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Path pattern (`*` and `?` wildcards).
    pub path: String,

    /// Name of an entry in `origins`.
    pub origin: String,

    pub events: StageHandlers,
}
