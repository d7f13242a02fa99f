//! Addon factories and the registry of compiled-in factories.

use std::collections::BTreeMap;
use std::fmt;

use super::Addon;

/// Produces a fresh addon on every call.
///
/// Two addons from the same factory share no mutable state unless the
/// addon type is explicitly built to share it.
pub trait AddonFactory: Send + Sync {
    fn create_addon(&self) -> Box<dyn Addon>;
}

/// Factory backed by a constructor closure.
pub struct FnAddonFactory<F> {
    create: F,
}

impl<F, A> FnAddonFactory<F>
where
    F: Fn() -> A + Send + Sync,
    A: Addon,
{
    pub fn new(create: F) -> Self {
        Self { create }
    }
}

impl<F, A> AddonFactory for FnAddonFactory<F>
where
    F: Fn() -> A + Send + Sync,
    A: Addon,
{
    fn create_addon(&self) -> Box<dyn Addon> {
        Box::new((self.create)())
    }
}

type FactoryConstructor = fn() -> Box<dyn AddonFactory>;

/// Name → factory table for addons compiled into the host.
///
/// Host configuration refers to these by name; anything else must come
/// from a dynamic module.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    constructors: BTreeMap<String, FactoryConstructor>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the addons this crate ships.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            crate::net::tcp_server::TCP_SERVER_FACTORY,
            || -> Box<dyn AddonFactory> { Box::new(crate::net::tcp_server::TcpServerAddonFactory) },
        );
        registry.register(
            crate::endpoints::ECHO_ENDPOINTS_FACTORY,
            || -> Box<dyn AddonFactory> { Box::new(crate::endpoints::EchoEndpointsAddonFactory) },
        );
        registry
    }

    /// Add or replace a named constructor.
    pub fn register(&mut self, name: impl Into<String>, constructor: FactoryConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    /// Build a new factory for `name`.
    pub fn create(&self, name: &str) -> Option<Box<dyn AddonFactory>> {
        self.constructors.get(name).map(|constructor| constructor())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.constructors.keys()).finish()
    }
}
