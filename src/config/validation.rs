//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (behaviors reference existing origins)
//! - Validate value ranges (timeouts > 0)
//! - Detect duplicate behaviors
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EmulatorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::EmulatorConfig;
use crate::event::Stage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("behavior {pattern:?} references undefined origin {origin:?}")]
    UndefinedOrigin { pattern: String, origin: String },

    #[error("origin {0:?} has no domain")]
    EmptyOriginDomain(String),

    #[error("origin {origin:?} has unsupported protocol {protocol:?}")]
    UnsupportedProtocol { origin: String, protocol: String },

    #[error("behavior {pattern:?} has a malformed {stage} handler {handler:?}")]
    MalformedHandler {
        pattern: String,
        stage: Stage,
        handler: String,
    },

    #[error("behavior #{0} has an empty path pattern")]
    EmptyPattern(usize),

    #[error("path pattern {0:?} is defined more than once")]
    DuplicatePattern(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

pub fn validate_config(config: &EmulatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, origin) in &config.origins {
        if origin.domain.trim().is_empty() {
            errors.push(ValidationError::EmptyOriginDomain(name.clone()));
        }
        if !matches!(origin.protocol.as_str(), "" | "http" | "https") {
            errors.push(ValidationError::UnsupportedProtocol {
                origin: name.clone(),
                protocol: origin.protocol.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for (index, behavior) in config.behaviors.iter().enumerate() {
        if behavior.path.is_empty() {
            errors.push(ValidationError::EmptyPattern(index));
        } else if !seen.insert(behavior.path.as_str()) {
            errors.push(ValidationError::DuplicatePattern(behavior.path.clone()));
        }

        if !config.origins.contains_key(&behavior.origin) {
            errors.push(ValidationError::UndefinedOrigin {
                pattern: behavior.path.clone(),
                origin: behavior.origin.clone(),
            });
        }

        for (stage, handler) in behavior.events.iter() {
            if handler.entry_point().is_none() || handler.path.trim().is_empty() {
                errors.push(ValidationError::MalformedHandler {
                    pattern: behavior.path.clone(),
                    stage,
                    handler: handler.to_string(),
                });
            }
        }
    }

    if config.handlers.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("handlers.timeout_secs"));
    }
    if config.timeouts.origin_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.origin_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
