//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! addons/ and net/ produce:
//!     → tracing events (lifecycle transitions, per-connection outcomes)
//!     → metrics.rs (connection counters, active gauges, running addons)
//!
//! Consumers:
//!     → logging.rs (fmt subscriber on stdout, filtered by EnvFilter)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Recording is a no-op until a metrics recorder is installed
//! - `RUST_LOG` overrides the configured log level

pub mod logging;
pub mod metrics;
