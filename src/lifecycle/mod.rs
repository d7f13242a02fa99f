//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → resolve factories → register → AddonManager::start
//!
//! Shutdown (shutdown.rs):
//!     Trigger → accept loops stop → StopListen drains connections
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → AddonManager::stop (reverse start order)
//! ```
//!
//! # Design Decisions
//! - Ordered startup: modules load before any addon starts
//! - Ordered shutdown: stop accept, close channels, drain with a timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{wait_for_signal, Signal};
pub use startup::{build_manager, start_order, StartupError};
