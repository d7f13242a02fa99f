//! Addon subsystem.
//!
//! # Data Flow
//! ```text
//! AddonConfiguration { id, factory, dependencies, parameters }
//!     → manager.rs (Register: bookkeeping only)
//!     → dependency.rs (Start: topological order, unresolved/cycle checks)
//!     → factory.rs / dynamic.rs (create one addon per configuration)
//!     → Addon::initialize(&dyn Addons, &parameters), in order
//!     → registry of initialized addons (read by dependents via Addons)
//!
//! Stop:
//!     registry drained in reverse start order → Addon::stop on each
//! ```
//!
//! # Design Decisions
//! - The manager is handed to every addon explicitly as `&dyn Addons`
//! - Initialization order is strict; no two `initialize` calls overlap
//! - A failed Start never leaves addons running

pub mod dependency;
pub mod dynamic;
pub mod error;
pub mod factory;
pub mod manager;

pub use dynamic::DynamicAddonFactory;
pub use error::{AddonError, TeardownFailure};
pub use factory::{AddonFactory, FactoryRegistry, FnAddonFactory};
pub use manager::{AddonManager, ManagerState};

use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Addon-specific failure crossing the [`Addon`] boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unique identifier of an addon within one manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddonId(String);

impl AddonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AddonId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AddonId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for AddonId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AddonId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque configuration payload handed to [`Addon::initialize`].
///
/// The manager never looks inside; each addon reads the keys it understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddonParameters(serde_json::Map<String, serde_json::Value>);

impl AddonParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Read a typed value. `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.0
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }

    /// Read a typed value, falling back to `default` when absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, serde_json::Error> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for AddonParameters {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// A pluggable component with an initialize/stop lifecycle.
///
/// `initialize` runs exactly once, before the addon becomes visible to
/// others. `stop` runs at most once, on the shared instance.
#[async_trait]
pub trait Addon: Send + Sync + 'static {
    /// Called in dependency order. Dependencies are already initialized
    /// and reachable through `addons`.
    async fn initialize(
        &mut self,
        addons: &dyn Addons,
        parameters: &AddonParameters,
    ) -> Result<(), BoxError>;

    /// Called in reverse dependency order.
    async fn stop(&self) -> Result<(), BoxError>;

    /// Concrete-type access for [`get_addon_as`]. Implementations return `self`.
    fn as_any(&self) -> &dyn Any;
}

/// Read-only view of the initialized addons.
pub trait Addons: Send + Sync {
    fn get_addon(&self, id: &str) -> Result<Arc<dyn Addon>, AddonError>;
}

/// Look up an addon and check it has the concrete type `T`.
pub fn get_addon_as<T: Addon>(addons: &dyn Addons, id: &str) -> Result<AddonRef<T>, AddonError> {
    let addon = addons.get_addon(id)?;
    AddonRef::new(id, addon)
}

/// Shared, typed reference to an initialized addon.
///
/// Holds the addon as the manager stored it, so an addon coming from a
/// dynamic module keeps that module loaded for as long as the reference lives.
pub struct AddonRef<T> {
    addon: Arc<dyn Addon>,
    _type: PhantomData<fn() -> T>,
}

impl<T: Addon> AddonRef<T> {
    fn new(id: &str, addon: Arc<dyn Addon>) -> Result<Self, AddonError> {
        if !addon.as_any().is::<T>() {
            return Err(AddonError::TypeMismatch {
                id: AddonId::from(id),
                expected: std::any::type_name::<T>(),
            });
        }
        Ok(Self {
            addon,
            _type: PhantomData,
        })
    }

    /// The untyped addon this reference was built from.
    pub fn as_addon(&self) -> &Arc<dyn Addon> {
        &self.addon
    }
}

impl<T: Addon> Deref for AddonRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.addon.as_any().downcast_ref::<T>() {
            Some(addon) => addon,
            None => unreachable!("addon type is checked when the reference is built"),
        }
    }
}

impl<T> Clone for AddonRef<T> {
    fn clone(&self) -> Self {
        Self {
            addon: Arc::clone(&self.addon),
            _type: PhantomData,
        }
    }
}

impl<T> fmt::Debug for AddonRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonRef")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

/// Registration record for one addon.
pub struct AddonConfiguration {
    pub id: AddonId,
    pub factory: Box<dyn AddonFactory>,
    pub dependencies: Vec<AddonId>,
    pub parameters: AddonParameters,
}

impl AddonConfiguration {
    pub fn new(id: impl Into<AddonId>, factory: impl AddonFactory + 'static) -> Self {
        Self::from_boxed(id, Box::new(factory))
    }

    pub fn from_boxed(id: impl Into<AddonId>, factory: Box<dyn AddonFactory>) -> Self {
        Self {
            id: id.into(),
            factory,
            dependencies: Vec::new(),
            parameters: AddonParameters::default(),
        }
    }

    /// Add a dependency on another addon.
    pub fn depends_on(mut self, id: impl Into<AddonId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn with_parameters(mut self, parameters: AddonParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

impl fmt::Debug for AddonConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonConfiguration")
            .field("id", &self.id)
            .field("dependencies", &self.dependencies)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
