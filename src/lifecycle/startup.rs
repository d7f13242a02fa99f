//! Startup orchestration.
//!
//! # Responsibilities
//! - Turn validated `[[addons]]` entries into addon configurations
//! - Resolve factories: compiled-in by name, or from a dynamic module
//! - Register everything with a fresh manager, in file order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Modules are loaded before anything starts, so a bad path never
//!   leaves half the addons running

use thiserror::Error;

use crate::addons::dependency::{self, DependencyNode};
use crate::addons::{
    AddonConfiguration, AddonError, AddonFactory, AddonId, AddonManager, AddonParameters,
    DynamicAddonFactory, FactoryRegistry,
};
use crate::config::{AddonConfig, HostConfig};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("addon `{id}` uses unknown factory `{factory}`")]
    UnknownFactory { id: String, factory: String },

    #[error("addon `{id}` has invalid parameters: {source}")]
    Parameters {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("addon `{0}` names neither a factory nor a module")]
    MissingSource(String),

    #[error(transparent)]
    Addon(#[from] AddonError),
}

/// Build an unstarted manager holding every addon of `config`.
pub fn build_manager(
    config: &HostConfig,
    registry: &FactoryRegistry,
) -> Result<AddonManager, StartupError> {
    let manager = AddonManager::new();
    for addon in &config.addons {
        manager.register(addon_configuration(addon, registry)?)?;
    }

    tracing::info!(addons = config.addons.len(), "Addons registered");
    Ok(manager)
}

/// Resolve one `[[addons]]` entry.
pub fn addon_configuration(
    addon: &AddonConfig,
    registry: &FactoryRegistry,
) -> Result<AddonConfiguration, StartupError> {
    let factory: Box<dyn AddonFactory> = match (&addon.factory, &addon.module) {
        (Some(name), _) => registry
            .create(name)
            .ok_or_else(|| StartupError::UnknownFactory {
                id: addon.id.clone(),
                factory: name.clone(),
            })?,
        (None, Some(path)) => Box::new(DynamicAddonFactory::load(path)?),
        (None, None) => return Err(StartupError::MissingSource(addon.id.clone())),
    };

    let parameters = to_parameters(&addon.parameters).map_err(|source| StartupError::Parameters {
        id: addon.id.clone(),
        source,
    })?;

    Ok(addon
        .dependencies
        .iter()
        .fold(
            AddonConfiguration::from_boxed(addon.id.as_str(), factory),
            |config, dependency| config.depends_on(dependency.as_str()),
        )
        .with_parameters(parameters))
}

/// The order `start` would initialize the addons of `config` in.
pub fn start_order(config: &HostConfig) -> Result<Vec<AddonId>, AddonError> {
    let entries: Vec<(AddonId, Vec<AddonId>)> = config
        .addons
        .iter()
        .map(|addon| {
            (
                AddonId::from(addon.id.as_str()),
                addon.dependencies.iter().map(|d| AddonId::from(d.as_str())).collect(),
            )
        })
        .collect();
    let nodes: Vec<DependencyNode<'_>> = entries
        .iter()
        .map(|(id, dependencies)| DependencyNode::new(id, dependencies))
        .collect();

    let order = dependency::resolve_order(&nodes)?;
    Ok(order.into_iter().map(|index| entries[index].0.clone()).collect())
}

fn to_parameters(table: &toml::Table) -> Result<AddonParameters, serde_json::Error> {
    match serde_json::to_value(table)? {
        serde_json::Value::Object(map) => Ok(AddonParameters::from(map)),
        _ => Ok(AddonParameters::new()),
    }
}
