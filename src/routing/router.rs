//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Compile behaviors into pipelines bound to their origin and handlers
//! - Look up the pipeline for a request path
//! - Return the matched pipeline or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction; reloads build a new table and swap it
//! - O(n) pattern scan in configuration order (first match wins)

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, EmulatorConfig, ValidationError};
use crate::handler::HandlerInvoker;
use crate::origin::{OriginClient, ProtocolHint};
use crate::pipeline::{Behavior, Pipeline, PipelineSettings};
use crate::routing::matcher::PathPattern;

/// One compiled behavior.
pub struct Route {
    pattern: PathPattern,
    pipeline: Arc<Pipeline>,
}

impl Route {
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

/// Ordered set of routes built from one configuration snapshot.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile every behavior in `config`.
    ///
    /// Fails if a behavior names an origin that is not defined.
    pub fn build(
        config: &EmulatorConfig,
        origin_client: OriginClient,
        invoker: Arc<dyn HandlerInvoker>,
    ) -> Result<Self, ConfigError> {
        let settings = Arc::new(PipelineSettings {
            distribution_id: config.distribution.id.clone(),
            distribution_name: config.distribution.name.clone(),
            working_directory: config.handlers.working_directory.clone(),
            handler_timeout: Duration::from_secs(config.handlers.timeout_secs),
            protocol: if config.listener.is_secure() {
                ProtocolHint::Https
            } else {
                ProtocolHint::Http
            },
        });

        let mut routes = Vec::with_capacity(config.behaviors.len());
        for behavior in &config.behaviors {
            let origin = config.origins.get(&behavior.origin).ok_or_else(|| {
                ConfigError::Validation(vec![ValidationError::UndefinedOrigin {
                    pattern: behavior.path.clone(),
                    origin: behavior.origin.clone(),
                }])
            })?;

            let pipeline = Pipeline::new(
                Behavior {
                    path: behavior.path.clone(),
                    origin_name: behavior.origin.clone(),
                    origin: origin.descriptor(),
                    handlers: behavior.events.clone(),
                },
                Arc::clone(&settings),
                origin_client.clone(),
                Arc::clone(&invoker),
            );

            tracing::debug!(
                pattern = %behavior.path,
                origin = %behavior.origin,
                handlers = behavior.events.iter().count(),
                "Route compiled"
            );

            routes.push(Route {
                pattern: PathPattern::new(&behavior.path),
                pipeline: Arc::new(pipeline),
            });
        }

        Ok(Self { routes })
    }

    /// First route whose pattern matches `path`.
    pub fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.pattern.matches(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|route| route.pattern.as_str())
    }
}
