//! Addon lifecycle errors.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use super::{AddonId, BoxError};

/// Errors raised by the addon manager and addon factories.
#[derive(Debug, Error)]
pub enum AddonError {
    /// Two configurations registered under the same id.
    #[error("addon `{0}` is already registered")]
    DuplicateId(AddonId),

    /// A declared dependency was never registered.
    #[error("addon `{addon}` depends on unregistered addon `{dependency}`")]
    UnresolvedDependency { addon: AddonId, dependency: AddonId },

    /// The dependency graph contains a cycle; the path starts and ends on the same id.
    #[error("cyclic addon dependency: {}", format_cycle(.0))]
    CyclicDependency(Vec<AddonId>),

    /// An addon's `initialize` failed during Start.
    #[error("addon `{id}` failed to initialize: {source}")]
    Initialization {
        id: AddonId,
        #[source]
        source: BoxError,
    },

    /// Lookup of an addon that is not registered or not initialized.
    #[error("addon `{0}` not found")]
    NotFound(AddonId),

    /// Lookup succeeded but the addon has another concrete type.
    #[error("addon `{id}` is not a `{expected}`")]
    TypeMismatch { id: AddonId, expected: &'static str },

    /// The dynamic module could not be opened.
    #[error("failed to load addon module {}: {source}", .path.display())]
    ModuleLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// The dynamic module lacks the factory entry point.
    #[error("addon module {} has no `{symbol}` entry point: {source}", .path.display())]
    SymbolNotFound {
        path: PathBuf,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },

    /// The module entry point returned no factory.
    #[error("addon module {} returned a null factory", .0.display())]
    NullFactory(PathBuf),

    /// Start called on a manager that is starting or running.
    #[error("addon manager already started")]
    AlreadyStarted,

    /// Operation not allowed in the manager's current state.
    #[error("cannot {operation} addon manager in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// One or more addons failed to stop. Every addon was still stopped.
    #[error("{} addon(s) failed to stop: {}", .0.len(), format_failures(.0))]
    Teardown(Vec<TeardownFailure>),
}

/// A single addon's failure during Stop.
#[derive(Debug)]
pub struct TeardownFailure {
    pub id: AddonId,
    pub error: BoxError,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.error)
    }
}

fn format_cycle(cycle: &[AddonId]) -> String {
    cycle
        .iter()
        .map(AddonId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Human-readable text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn format_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_text() {
        let literal = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(&*literal), "boom");

        let formatted = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(&*formatted), "code 7");

        let other = std::panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(&*other), "non-string panic payload");
    }

    #[test]
    fn cycle_message_lists_path() {
        let err = AddonError::CyclicDependency(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "cyclic addon dependency: a -> b -> a");
    }

    #[test]
    fn teardown_message_lists_failures() {
        let err = AddonError::Teardown(vec![TeardownFailure {
            id: "tcp_server".into(),
            error: "socket busy".into(),
        }]);
        assert_eq!(err.to_string(), "1 addon(s) failed to stop: tcp_server: socket busy");
    }
}
