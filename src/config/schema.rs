//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the addon host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Addons to register, in registration order.
    pub addons: Vec<AddonConfig>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive. `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

/// One addon to register with the manager.
///
/// Exactly one of `factory` (compiled-in factory name) and `module`
/// (path to a dynamic addon module) must be set.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AddonConfig {
    pub id: String,

    #[serde(default)]
    pub factory: Option<String>,

    #[serde(default)]
    pub module: Option<PathBuf>,

    /// Ids of addons that must be initialized first.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Opaque payload handed to the addon's `initialize`.
    #[serde(default)]
    pub parameters: toml::Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: HostConfig = toml::from_str("").unwrap();
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, LogFormat::Full);
        assert!(!config.observability.metrics_enabled);
        assert!(config.addons.is_empty());
    }

    #[test]
    fn addon_entries_keep_order_and_parameters() {
        let config: HostConfig = toml::from_str(
            r#"
            [observability]
            log_format = "compact"

            [[addons]]
            id = "tcp_server"
            factory = "tcp_server"

            [[addons]]
            id = "endpoints"
            factory = "echo_endpoints"
            dependencies = ["tcp_server"]
            [addons.parameters]
            port = 4841
            "#,
        )
        .unwrap();

        assert_eq!(config.observability.log_format, LogFormat::Compact);
        let ids: Vec<&str> = config.addons.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["tcp_server", "endpoints"]);
        assert_eq!(config.addons[1].dependencies, ["tcp_server"]);
        assert_eq!(
            config.addons[1].parameters.get("port").and_then(|v| v.as_integer()),
            Some(4841)
        );
    }

    #[test]
    fn unknown_log_format_rejected() {
        let result: Result<HostConfig, _> = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn misspelled_key_rejected() {
        let result: Result<HostConfig, _> = toml::from_str(
            r#"
            [[addons]]
            id = "a"
            factroy = "tcp_server"
            "#,
        );
        assert!(result.is_err());
    }
}
