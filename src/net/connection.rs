//! Connection identity and per-port tracking of live channels.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Keep a handle to every channel being processed, so StopListen can
//!   close them
//! - Count workers until they actually finish, so StopListen can drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::channel::ChannelHandle;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Live connections of one listening port.
///
/// Handles can be drained for closing while the workers still run; the
/// active count only drops when a worker's [`ConnectionGuard`] is dropped.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
    handles: Arc<DashMap<ConnectionId, ChannelHandle>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. Returns a guard that untracks it on drop.
    pub fn track(&self, handle: ChannelHandle) -> ConnectionGuard {
        let id = handle.id();
        self.active_count.fetch_add(1, Ordering::SeqCst);
        self.handles.insert(id, handle);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            handles: Arc::clone(&self.handles),
            id,
        }
    }

    /// Workers still running.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Take every tracked handle out of the tracker.
    pub fn drain(&self) -> Vec<ChannelHandle> {
        let ids: Vec<ConnectionId> = self.handles.iter().map(|entry| *entry.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.handles.remove(&id).map(|(_, handle)| handle))
            .collect()
    }

    /// Wait until all workers finished. Returns `false` on timeout.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Guard held by a worker for the lifetime of its connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    handles: Arc<DashMap<ConnectionId, ChannelHandle>>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.handles.remove(&self.id);
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection untracked");
    }
}
