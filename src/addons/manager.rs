//! Addon Manager
//!
//! Registers addon configurations, starts them in dependency order and
//! tears them down in reverse.
//!
//! # Lifecycle
//! ```text
//! Unstarted → Starting → Running → Stopping → Stopped
//!                 └──────── (Start failed) ───────┘
//! ```
//! Transitions are one-way. A manager is started at most once.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use futures_util::FutureExt;

use super::dependency::{self, DependencyNode};
use super::error::panic_message;
use super::{Addon, AddonConfiguration, AddonError, AddonId, Addons, TeardownFailure};
use crate::observability::metrics;

/// Lifecycle state of an [`AddonManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl ManagerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagerState::Unstarted => "unstarted",
            ManagerState::Starting => "starting",
            ManagerState::Running => "running",
            ManagerState::Stopping => "stopping",
            ManagerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Central authority over addon registration, ordering and lifecycle.
///
/// Start and Stop run one addon at a time. Lookups through [`Addons`] are
/// safe from any task once an addon is initialized.
pub struct AddonManager {
    state: Mutex<ManagerState>,
    /// Configurations waiting for Start, in registration order.
    pending: Mutex<Vec<AddonConfiguration>>,
    /// Initialized addons by id.
    addons: DashMap<AddonId, Arc<dyn Addon>>,
    /// Ids in the order they finished initializing.
    started: Mutex<Vec<AddonId>>,
}

impl fmt::Debug for AddonManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonManager")
            .field("state", &*lock(&self.state))
            .field("started", &*lock(&self.started))
            .finish_non_exhaustive()
    }
}

impl Default for AddonManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AddonManager {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManagerState::Unstarted),
            pending: Mutex::new(Vec::new()),
            addons: DashMap::new(),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Create a new manager wrapped in an Arc
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Add a configuration. Only allowed before Start.
    pub fn register(&self, config: AddonConfiguration) -> Result<(), AddonError> {
        let state = lock(&self.state);
        match *state {
            ManagerState::Unstarted => {}
            ManagerState::Starting | ManagerState::Running => return Err(AddonError::AlreadyStarted),
            other => {
                return Err(AddonError::InvalidState {
                    operation: "register with",
                    state: other.as_str(),
                })
            }
        }

        let mut pending = lock(&self.pending);
        if pending.iter().any(|registered| registered.id == config.id) {
            return Err(AddonError::DuplicateId(config.id));
        }

        tracing::debug!(
            addon_id = %config.id,
            dependencies = ?config.dependencies,
            "Addon registered"
        );
        pending.push(config);
        Ok(())
    }

    /// Create and initialize every registered addon in dependency order.
    ///
    /// On any failure the addons initialized so far are stopped in reverse
    /// order and the manager ends up `Stopped`.
    pub async fn start(&self) -> Result<(), AddonError> {
        {
            let mut state = lock(&self.state);
            match *state {
                ManagerState::Unstarted => *state = ManagerState::Starting,
                ManagerState::Starting | ManagerState::Running => return Err(AddonError::AlreadyStarted),
                other => {
                    return Err(AddonError::InvalidState {
                        operation: "start",
                        state: other.as_str(),
                    })
                }
            }
        }

        let configs = std::mem::take(&mut *lock(&self.pending));
        let nodes: Vec<DependencyNode<'_>> = configs
            .iter()
            .map(|config| DependencyNode::new(&config.id, &config.dependencies))
            .collect();

        let order = match dependency::resolve_order(&nodes) {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(error = %e, "Addon dependencies cannot be resolved");
                self.set_state(ManagerState::Stopped);
                return Err(e);
            }
        };

        tracing::info!(
            order = ?order.iter().map(|&i| configs[i].id.as_str()).collect::<Vec<_>>(),
            "Starting addons"
        );

        for index in order {
            let config = &configs[index];
            let mut addon = config.factory.create_addon();

            tracing::debug!(addon_id = %config.id, "Initializing addon");
            // A panicking addon takes the same rollback path as a failing one.
            let initialized = match AssertUnwindSafe(addon.initialize(self, &config.parameters))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(format!("initialize panicked: {}", panic_message(&*panic)).into()),
            };
            if let Err(source) = initialized {
                drop(addon);
                tracing::error!(
                    addon_id = %config.id,
                    error = %source,
                    "Addon failed to initialize, stopping already started addons"
                );
                for failure in self.stop_started().await {
                    tracing::warn!(
                        addon_id = %failure.id,
                        error = %failure.error,
                        "Addon failed to stop during rollback"
                    );
                }
                self.set_state(ManagerState::Stopped);
                return Err(AddonError::Initialization {
                    id: config.id.clone(),
                    source,
                });
            }

            self.addons.insert(config.id.clone(), Arc::from(addon));
            lock(&self.started).push(config.id.clone());
            metrics::record_addons_running(self.addons.len());
            tracing::info!(addon_id = %config.id, "Addon initialized");
        }

        self.set_state(ManagerState::Running);
        tracing::info!(count = self.addons.len(), "All addons started");
        Ok(())
    }

    /// Stop every initialized addon in reverse start order.
    ///
    /// Teardown never short-circuits; failures are collected into
    /// [`AddonError::Teardown`]. Stopping a stopped manager does nothing.
    pub async fn stop(&self) -> Result<(), AddonError> {
        {
            let mut state = lock(&self.state);
            match *state {
                ManagerState::Running => *state = ManagerState::Stopping,
                ManagerState::Stopped => return Ok(()),
                ManagerState::Unstarted => {
                    *state = ManagerState::Stopped;
                    return Ok(());
                }
                other => {
                    return Err(AddonError::InvalidState {
                        operation: "stop",
                        state: other.as_str(),
                    })
                }
            }
        }

        tracing::info!("Stopping addons");
        let failures = self.stop_started().await;
        self.set_state(ManagerState::Stopped);

        if failures.is_empty() {
            tracing::info!("All addons stopped");
            Ok(())
        } else {
            Err(AddonError::Teardown(failures))
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == ManagerState::Running
    }

    /// Ids of initialized addons, in start order.
    pub fn started_addons(&self) -> Vec<AddonId> {
        lock(&self.started).clone()
    }

    /// Number of initialized addons.
    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }

    async fn stop_started(&self) -> Vec<TeardownFailure> {
        let started = std::mem::take(&mut *lock(&self.started));
        let mut failures = Vec::new();

        for id in started.into_iter().rev() {
            let Some((id, addon)) = self.addons.remove(&id) else {
                continue;
            };
            match addon.stop().await {
                Ok(()) => tracing::debug!(addon_id = %id, "Addon stopped"),
                Err(error) => {
                    tracing::warn!(addon_id = %id, error = %error, "Addon failed to stop");
                    failures.push(TeardownFailure { id, error });
                }
            }
            metrics::record_addons_running(self.addons.len());
        }

        failures
    }

    fn set_state(&self, next: ManagerState) {
        let mut state = lock(&self.state);
        tracing::debug!(from = state.as_str(), to = next.as_str(), "Addon manager state change");
        *state = next;
    }
}

impl Addons for AddonManager {
    fn get_addon(&self, id: &str) -> Result<Arc<dyn Addon>, AddonError> {
        self.addons
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AddonError::NotFound(AddonId::from(id)))
    }
}

impl Drop for AddonManager {
    fn drop(&mut self) {
        if self.state() == ManagerState::Running {
            tracing::warn!(
                count = self.addons.len(),
                "Addon manager dropped while running; addons were not stopped"
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
