//! TCP listener addon.
//!
//! # Responsibilities
//! - Listen on any number of ports, each with its own processor
//! - Run one worker task per accepted connection
//! - StopListen: stop accepting, ask processors to stop, close their
//!   channels and wait a bounded time for the workers to finish
//!
//! # Port States
//! ```text
//! Idle → Listening → Stopped (= Idle again, Listen may be called anew)
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use super::channel::Channel;
use super::connection::{ConnectionGuard, ConnectionTracker};
use super::listener::{ConnectionPermit, Listener, ListenerError};
use super::processor::ConnectionProcessor;
use crate::addons::error::panic_message;
use crate::addons::{Addon, AddonFactory, AddonParameters, Addons, BoxError};
use crate::lifecycle::shutdown::{Shutdown, ShutdownSignal};
use crate::observability::metrics;

/// Id the TCP server addon is registered under by convention.
pub const TCP_SERVER_ADDON_ID: &str = "tcp_server";

/// Name of the compiled-in factory.
pub const TCP_SERVER_FACTORY: &str = "tcp_server";

const DEFAULT_MAX_CONNECTIONS: usize = 1024;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2000;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Identifies one listening endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TcpParameters {
    pub port: u16,
}

impl TcpParameters {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Server-wide settings, read from the addon parameters on Initialize.
#[derive(Debug, Clone)]
pub struct TcpServerSettings {
    pub bind_host: String,
    /// Concurrent connections per port.
    pub max_connections: usize,
    /// How long StopListen waits for workers after closing their channels.
    pub drain_timeout: Duration,
}

impl Default for TcpServerSettings {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
        }
    }
}

impl TcpServerSettings {
    pub fn from_parameters(parameters: &AddonParameters) -> Result<Self, BoxError> {
        let defaults = Self::default();
        let settings = Self {
            bind_host: parameters.get_or("bind_host", defaults.bind_host)?,
            max_connections: parameters.get_or("max_connections", defaults.max_connections)?,
            drain_timeout: Duration::from_millis(
                parameters.get_or("drain_timeout_ms", DEFAULT_DRAIN_TIMEOUT_MS)?,
            ),
        };

        if settings.max_connections == 0 {
            return Err("max_connections must be greater than zero".into());
        }
        if settings.max_connections > Semaphore::MAX_PERMITS {
            return Err(format!("max_connections must not exceed {}", Semaphore::MAX_PERMITS).into());
        }
        Ok(settings)
    }
}

/// One listening port.
struct Endpoint {
    processor: Arc<dyn ConnectionProcessor>,
    connections: ConnectionTracker,
    shutdown: Shutdown,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        // Stops an orphaned accept loop when the server goes away without StopListen.
        self.shutdown.trigger();
    }
}

/// Addon owning the listening sockets of the host.
pub struct TcpServerAddon {
    settings: TcpServerSettings,
    endpoints: Mutex<HashMap<u16, Endpoint>>,
}

impl Default for TcpServerAddon {
    fn default() -> Self {
        Self::new(TcpServerSettings::default())
    }
}

impl TcpServerAddon {
    pub fn new(settings: TcpServerSettings) -> Self {
        Self {
            settings,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &TcpServerSettings {
        &self.settings
    }

    /// Bind `params.port` and start accepting in the background.
    ///
    /// Returns once the socket is bound. Port 0 binds an ephemeral port; the
    /// endpoint is then keyed by the port actually bound, which the returned
    /// address carries.
    pub async fn listen(
        &self,
        params: TcpParameters,
        processor: Arc<dyn ConnectionProcessor>,
    ) -> Result<SocketAddr, ListenerError> {
        let mut endpoints = self.endpoints.lock().await;
        if endpoints.contains_key(&params.port) {
            return Err(ListenerError::AlreadyListening(params.port));
        }

        let listener = Listener::bind(
            &self.settings.bind_host,
            params.port,
            self.settings.max_connections,
        )
        .await?;
        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            host: self.settings.bind_host.clone(),
            port: params.port,
            source,
        })?;
        let port = local_addr.port();

        let connections = ConnectionTracker::new();
        let shutdown = Shutdown::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            port,
            Arc::clone(&processor),
            connections.clone(),
            shutdown.subscribe(),
        ));

        endpoints.insert(
            port,
            Endpoint {
                processor,
                connections,
                shutdown,
                accept_task,
                local_addr,
            },
        );

        tracing::info!(port, address = %local_addr, "Listening");
        Ok(local_addr)
    }

    /// Stop accepting on `params.port` and end its connections.
    ///
    /// Each in-flight connection gets `stop_processing` and then has its
    /// channel closed, which fails pending `receive`/`send` calls with
    /// `ConnectionClosed`. Workers still running after the drain timeout are
    /// left to finish on their own. No-op when the port is not listening.
    pub async fn stop_listen(&self, params: TcpParameters) {
        let Some(mut endpoint) = self.endpoints.lock().await.remove(&params.port) else {
            tracing::debug!(port = params.port, "StopListen on a port that is not listening");
            return;
        };

        endpoint.shutdown.trigger();
        if let Err(e) = (&mut endpoint.accept_task).await {
            tracing::warn!(port = params.port, error = %e, "Accept loop ended abnormally");
        }

        let channels = endpoint.connections.drain();
        tracing::info!(
            port = params.port,
            connections = channels.len(),
            "Stopping listener"
        );
        for channel in &channels {
            endpoint.processor.stop_processing(channel);
            channel.close();
        }

        if !endpoint
            .connections
            .wait_for_idle(self.settings.drain_timeout)
            .await
        {
            tracing::warn!(
                port = params.port,
                remaining = endpoint.connections.active_count(),
                "Workers still running after drain timeout"
            );
        }

        tracing::info!(port = params.port, "Stopped listening");
    }

    pub async fn is_listening(&self, port: u16) -> bool {
        self.endpoints.lock().await.contains_key(&port)
    }

    /// Address the port's socket is bound to.
    pub async fn local_addr(&self, port: u16) -> Option<SocketAddr> {
        self.endpoints
            .lock()
            .await
            .get(&port)
            .map(|endpoint| endpoint.local_addr)
    }

    /// Connections on `port` whose worker has not finished yet.
    pub async fn active_connections(&self, port: u16) -> u64 {
        self.endpoints
            .lock()
            .await
            .get(&port)
            .map_or(0, |endpoint| endpoint.connections.active_count())
    }

    pub async fn listening_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.endpoints.lock().await.keys().copied().collect();
        ports.sort_unstable();
        ports
    }
}

#[async_trait]
impl Addon for TcpServerAddon {
    async fn initialize(
        &mut self,
        _addons: &dyn Addons,
        parameters: &AddonParameters,
    ) -> Result<(), BoxError> {
        self.settings = TcpServerSettings::from_parameters(parameters)?;
        tracing::info!(
            bind_host = %self.settings.bind_host,
            max_connections = self.settings.max_connections,
            drain_timeout_ms = self.settings.drain_timeout.as_millis() as u64,
            "TCP server initialized"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        for port in self.listening_ports().await {
            self.stop_listen(TcpParameters::new(port)).await;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`TcpServerAddon`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpServerAddonFactory;

impl AddonFactory for TcpServerAddonFactory {
    fn create_addon(&self) -> Box<dyn Addon> {
        Box::new(TcpServerAddon::default())
    }
}

async fn accept_loop(
    listener: Listener,
    port: u16,
    processor: Arc<dyn ConnectionProcessor>,
    connections: ConnectionTracker,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr, permit)) => {
                let channel = Channel::new(stream, peer_addr);
                let guard = connections.track(channel.handle());
                tokio::spawn(run_worker(
                    port,
                    channel,
                    Arc::clone(&processor),
                    guard,
                    permit,
                ));
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }

    // Dropping the listener closes the socket.
    tracing::debug!(port, "Accept loop stopped");
}

async fn run_worker(
    port: u16,
    mut channel: Channel,
    processor: Arc<dyn ConnectionProcessor>,
    guard: ConnectionGuard,
    permit: ConnectionPermit,
) {
    let connection_id = channel.id();
    let peer_addr = channel.peer_addr();
    metrics::record_connection_opened(port);
    tracing::debug!(port, connection_id = %connection_id, peer_addr = %peer_addr, "Processing connection");

    let outcome = AssertUnwindSafe(processor.process(&mut channel))
        .catch_unwind()
        .await;

    let failed = match outcome {
        Ok(Ok(())) => {
            tracing::debug!(port, connection_id = %connection_id, "Connection finished");
            false
        }
        Ok(Err(e)) => {
            tracing::warn!(port, connection_id = %connection_id, error = %e, "Connection processor failed");
            true
        }
        Err(panic) => {
            tracing::error!(
                port,
                connection_id = %connection_id,
                panic = panic_message(&*panic),
                "Connection processor panicked"
            );
            true
        }
    };

    // Socket first, then the tracking slot and the connection permit.
    drop(channel);
    metrics::record_connection_closed(port, failed);
    drop(guard);
    drop(permit);
}
