//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HostConfig (validated, immutable)
//!     → lifecycle::startup turns [[addons]] into AddonConfigurations
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; the addon core never reads files
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Dependency cycles are left to the addon manager, which reports the path

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AddonConfig, HostConfig, LogFormat, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};
