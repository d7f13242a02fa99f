//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (dependencies name declared addons)
//! - Each addon names exactly one source: factory or module
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HostConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::HostConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("addon #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("addon id `{0}` is declared more than once")]
    DuplicateId(String),

    #[error("addon `{0}` needs either `factory` or `module`")]
    MissingSource(String),

    #[error("addon `{0}` sets both `factory` and `module`")]
    ConflictingSource(String),

    #[error("addon `{0}` depends on itself")]
    SelfDependency(String),

    #[error("addon `{addon}` depends on undeclared addon `{dependency}`")]
    UnknownDependency { addon: String, dependency: String },

    #[error("invalid metrics address `{0}`")]
    InvalidMetricsAddress(String),
}

pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    let declared: HashSet<&str> = config.addons.iter().map(|a| a.id.as_str()).collect();
    let mut seen = HashSet::new();

    for (index, addon) in config.addons.iter().enumerate() {
        if addon.id.trim().is_empty() {
            errors.push(ValidationError::EmptyId { index });
            continue;
        }
        if !seen.insert(addon.id.as_str()) {
            errors.push(ValidationError::DuplicateId(addon.id.clone()));
        }

        match (&addon.factory, &addon.module) {
            (None, None) => errors.push(ValidationError::MissingSource(addon.id.clone())),
            (Some(_), Some(_)) => errors.push(ValidationError::ConflictingSource(addon.id.clone())),
            _ => {}
        }

        for dependency in &addon.dependencies {
            if dependency == &addon.id {
                errors.push(ValidationError::SelfDependency(addon.id.clone()));
            } else if !declared.contains(dependency.as_str()) {
                errors.push(ValidationError::UnknownDependency {
                    addon: addon.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::AddonConfig;

    fn addon(id: &str, factory: Option<&str>, dependencies: &[&str]) -> AddonConfig {
        AddonConfig {
            id: id.to_string(),
            factory: factory.map(str::to_string),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            ..AddonConfig::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = HostConfig {
            addons: vec![
                addon("tcp_server", Some("tcp_server"), &[]),
                addon("endpoints", Some("echo_endpoints"), &["tcp_server"]),
            ],
            ..HostConfig::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn all_errors_collected() {
        let mut both = addon("both", Some("tcp_server"), &[]);
        both.module = Some("libboth.so".into());

        let config = HostConfig {
            addons: vec![
                addon("", Some("tcp_server"), &[]),
                addon("a", None, &["a", "ghost"]),
                addon("a", Some("tcp_server"), &[]),
                both,
            ],
            ..HostConfig::default()
        };

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyId { index: 0 },
                ValidationError::MissingSource("a".into()),
                ValidationError::SelfDependency("a".into()),
                ValidationError::UnknownDependency {
                    addon: "a".into(),
                    dependency: "ghost".into(),
                },
                ValidationError::DuplicateId("a".into()),
                ValidationError::ConflictingSource("both".into()),
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = HostConfig::default();
        config.observability.metrics_address = "not an address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidMetricsAddress("not an address".into())]
        );
    }
}
