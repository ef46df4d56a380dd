//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.toml
//!     → loader.rs (parse, deserialize, resolve paths)
//!     → validation.rs (semantic checks)
//!     → EmulatorConfig (validated, immutable)
//!     → RouteTable built from one snapshot
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → snapshot sent to the server, which swaps its route table
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError, CONFIG_FILE_NAME};
pub use schema::{
    BehaviorConfig, DistributionConfig, EmulatorConfig, HandlersConfig, ListenerConfig,
    ObservabilityConfig, OriginConfig, OriginKind, StageHandlers, TimeoutConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
