//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ObservationConfig (validated, immutable)
//!     → conventions, sinks and the demo host are built from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ConventionConfig, LogFormat, LoggingConfig, MetricsConfig, ObservationConfig, ServerConfig,
};
pub use validation::{validate_config, ValidationError};
