//! Addon host library.
//!
//! An addon manager that starts pluggable components in dependency order,
//! plus a TCP listener addon that hands each accepted connection to a
//! processor supplied by a higher-level addon.

pub mod addons;
pub mod config;
pub mod endpoints;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use addons::{
    get_addon_as, Addon, AddonConfiguration, AddonError, AddonFactory, AddonId, AddonManager,
    AddonParameters, AddonRef, Addons, BoxError,
};
pub use config::HostConfig;
pub use lifecycle::Shutdown;
