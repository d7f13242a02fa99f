//! Addon factories loaded from native dynamic libraries.
//!
//! # Module Contract
//! A module exports exactly one entry point, [`FACTORY_ENTRY_SYMBOL`], with
//! the [`FactoryEntry`] signature. Use [`declare_addon_module!`] to export it.
//! Module and host must be built by the same compiler against the same
//! version of this crate; trait objects cross the boundary as-is.
//!
//! # Lifetime
//! The library handle is reference counted. The factory and every addon
//! it produces hold a reference and are dropped before it, so the module
//! cannot be unloaded while its code may still run.
//!
//! [`declare_addon_module!`]: crate::declare_addon_module

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use libloading::{Library, Symbol};

use super::{Addon, AddonError, AddonFactory, AddonParameters, Addons, BoxError};

/// Name of the factory entry point every module exports.
pub const FACTORY_ENTRY_SYMBOL: &str = "addon_host_create_factory";

/// Entry point signature. Returns a heap-allocated factory handed over to the host.
pub type FactoryEntry = unsafe extern "C" fn() -> *mut Box<dyn AddonFactory>;

/// Export the factory entry point from an addon module (`cdylib`).
///
/// ```ignore
/// addon_host::declare_addon_module!(MyAddonFactory::default());
/// ```
#[macro_export]
macro_rules! declare_addon_module {
    ($factory:expr) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn addon_host_create_factory(
        ) -> *mut ::std::boxed::Box<dyn $crate::addons::AddonFactory> {
            let factory: ::std::boxed::Box<dyn $crate::addons::AddonFactory> =
                ::std::boxed::Box::new($factory);
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(factory))
        }
    };
}

/// Factory resolved from a module on disk.
pub struct DynamicAddonFactory {
    // Field order matters: the factory's code lives in `module`.
    factory: Box<dyn AddonFactory>,
    module: Arc<Library>,
    path: PathBuf,
}

impl DynamicAddonFactory {
    /// Open the module at `path` and take ownership of its factory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AddonError> {
        let path = path.as_ref().to_path_buf();

        // SAFETY: loading a module runs its initializers; modules are trusted
        // by the host configuration that names them.
        let library = unsafe { Library::new(&path) }.map_err(|source| AddonError::ModuleLoad {
            path: path.clone(),
            source,
        })?;

        let factory = {
            // SAFETY: the symbol type is fixed by the module contract.
            let entry: Symbol<FactoryEntry> = unsafe { library.get(FACTORY_ENTRY_SYMBOL.as_bytes()) }
                .map_err(|source| AddonError::SymbolNotFound {
                    path: path.clone(),
                    symbol: FACTORY_ENTRY_SYMBOL,
                    source,
                })?;
            // SAFETY: entry follows the module contract; the library outlives the factory.
            unsafe { adopt_factory(*entry) }.ok_or_else(|| AddonError::NullFactory(path.clone()))?
        };

        tracing::info!(path = %path.display(), "Addon module loaded");

        Ok(Self::from_parts(path, factory, Arc::new(library)))
    }

    fn from_parts(path: PathBuf, factory: Box<dyn AddonFactory>, module: Arc<Library>) -> Self {
        Self {
            factory,
            module,
            path,
        }
    }

    /// Path the module was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AddonFactory for DynamicAddonFactory {
    fn create_addon(&self) -> Box<dyn Addon> {
        Box::new(ModuleAddon {
            addon: self.factory.create_addon(),
            _module: Arc::clone(&self.module),
        })
    }
}

/// Call a module entry point and take ownership of the returned factory.
///
/// # Safety
/// `entry` must follow the module contract and its code must stay loaded
/// for as long as the returned factory is alive.
unsafe fn adopt_factory(entry: FactoryEntry) -> Option<Box<dyn AddonFactory>> {
    let raw = entry();
    if raw.is_null() {
        return None;
    }
    Some(*Box::from_raw(raw))
}

/// Addon produced by a module, pinned to that module.
struct ModuleAddon {
    addon: Box<dyn Addon>,
    _module: Arc<Library>,
}

#[async_trait]
impl Addon for ModuleAddon {
    async fn initialize(
        &mut self,
        addons: &dyn Addons,
        parameters: &AddonParameters,
    ) -> Result<(), BoxError> {
        self.addon.initialize(addons, parameters).await
    }

    async fn stop(&self) -> Result<(), BoxError> {
        self.addon.stop().await
    }

    fn as_any(&self) -> &dyn Any {
        self.addon.as_any()
    }
}
