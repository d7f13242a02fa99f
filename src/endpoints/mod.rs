//! Endpoints addon.
//!
//! Serves one port of the TCP server addon with an [`EchoProcessor`].
//! Depends on the TCP server; the dependency must be declared in its
//! configuration so the server is initialized first.
//!
//! # Parameters
//! - `port` (default 4841)
//! - `frame_size` (default 4, at most 64 KiB)
//! - `tcp_server`: id of the server addon (default `tcp_server`)

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::addons::{get_addon_as, Addon, AddonFactory, AddonParameters, AddonRef, Addons, BoxError};
use crate::net::processor::EchoProcessor;
use crate::net::tcp_server::{TcpParameters, TcpServerAddon, TCP_SERVER_ADDON_ID};

/// Id the endpoints addon is registered under by convention.
pub const ENDPOINTS_ADDON_ID: &str = "endpoints";

/// Name of the compiled-in factory.
pub const ECHO_ENDPOINTS_FACTORY: &str = "echo_endpoints";

pub const DEFAULT_PORT: u16 = 4841;

/// Echo service bound to one TCP server port.
#[derive(Debug, Default)]
pub struct EchoEndpointsAddon {
    server: Option<AddonRef<TcpServerAddon>>,
    params: Option<TcpParameters>,
}

impl EchoEndpointsAddon {
    /// Port being served, once initialized.
    pub fn port(&self) -> Option<u16> {
        self.params.map(|params| params.port)
    }
}

#[async_trait]
impl Addon for EchoEndpointsAddon {
    async fn initialize(
        &mut self,
        addons: &dyn Addons,
        parameters: &AddonParameters,
    ) -> Result<(), BoxError> {
        let server_id: String = parameters.get_or("tcp_server", TCP_SERVER_ADDON_ID.to_string())?;
        let port: u16 = parameters.get_or("port", DEFAULT_PORT)?;
        let frame_size: usize = parameters.get_or("frame_size", EchoProcessor::DEFAULT_FRAME_SIZE)?;
        if frame_size == 0 {
            return Err("frame_size must be greater than zero".into());
        }
        if frame_size > EchoProcessor::MAX_FRAME_SIZE {
            return Err(format!(
                "frame_size {frame_size} exceeds {} bytes",
                EchoProcessor::MAX_FRAME_SIZE
            )
            .into());
        }

        let server = get_addon_as::<TcpServerAddon>(addons, &server_id)?;
        let local_addr = server
            .listen(TcpParameters::new(port), Arc::new(EchoProcessor::new(frame_size)))
            .await?;

        tracing::info!(
            server = %server_id,
            address = %local_addr,
            frame_size,
            "Echo endpoint ready"
        );

        self.params = Some(TcpParameters::new(local_addr.port()));
        self.server = Some(server);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        if let (Some(server), Some(params)) = (&self.server, self.params) {
            server.stop_listen(params).await;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`EchoEndpointsAddon`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoEndpointsAddonFactory;

impl AddonFactory for EchoEndpointsAddonFactory {
    fn create_addon(&self) -> Box<dyn Addon> {
        Box::new(EchoEndpointsAddon::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::{AddonConfiguration, AddonError, AddonManager};
    use crate::net::tcp_server::TcpServerAddonFactory;

    fn server_config() -> AddonConfiguration {
        AddonConfiguration::new(TCP_SERVER_ADDON_ID, TcpServerAddonFactory)
            .with_parameters(AddonParameters::new().with("bind_host", "127.0.0.1"))
    }

    #[tokio::test]
    async fn serves_and_releases_its_port() {
        let manager = AddonManager::new();
        manager.register(server_config()).unwrap();
        manager
            .register(
                AddonConfiguration::new(ENDPOINTS_ADDON_ID, EchoEndpointsAddonFactory)
                    .depends_on(TCP_SERVER_ADDON_ID)
                    .with_parameters(AddonParameters::new().with("port", 0)),
            )
            .unwrap();
        manager.start().await.unwrap();

        let endpoints = get_addon_as::<EchoEndpointsAddon>(&manager, ENDPOINTS_ADDON_ID).unwrap();
        let server = get_addon_as::<TcpServerAddon>(&manager, TCP_SERVER_ADDON_ID).unwrap();
        let port = endpoints.port().unwrap();
        assert_ne!(port, 0);
        assert!(server.is_listening(port).await);

        manager.stop().await.unwrap();
        assert!(!server.is_listening(port).await);
    }

    #[tokio::test]
    async fn missing_server_fails_start() {
        let manager = AddonManager::new();
        manager
            .register(AddonConfiguration::new("echo", EchoEndpointsAddonFactory).with_parameters(
                AddonParameters::new().with("port", 0).with("tcp_server", "missing"),
            ))
            .unwrap();

        let err = manager.start().await.unwrap_err();
        match err {
            AddonError::Initialization { id, source } => {
                assert_eq!(id.as_str(), "echo");
                assert!(source.to_string().contains("missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn zero_frame_size_is_rejected() {
        let manager = AddonManager::new();
        manager.register(server_config()).unwrap();
        manager
            .register(
                AddonConfiguration::new(ENDPOINTS_ADDON_ID, EchoEndpointsAddonFactory)
                    .depends_on(TCP_SERVER_ADDON_ID)
                    .with_parameters(AddonParameters::new().with("port", 0).with("frame_size", 0)),
            )
            .unwrap();

        assert!(matches!(
            manager.start().await,
            Err(AddonError::Initialization { .. })
        ));
    }

    #[tokio::test]
    async fn oversized_frame_size_is_rejected() {
        let manager = AddonManager::new();
        manager.register(server_config()).unwrap();
        manager
            .register(
                AddonConfiguration::new(ENDPOINTS_ADDON_ID, EchoEndpointsAddonFactory)
                    .depends_on(TCP_SERVER_ADDON_ID)
                    .with_parameters(
                        AddonParameters::new().with("port", 0).with("frame_size", 1u64 << 62),
                    ),
            )
            .unwrap();

        match manager.start().await {
            Err(AddonError::Initialization { id, source }) => {
                assert_eq!(id.as_str(), ENDPOINTS_ADDON_ID);
                assert!(source.to_string().contains("exceeds"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(manager.is_empty());

        // The largest accepted frame still starts.
        let manager = AddonManager::new();
        manager.register(server_config()).unwrap();
        manager
            .register(
                AddonConfiguration::new(ENDPOINTS_ADDON_ID, EchoEndpointsAddonFactory)
                    .depends_on(TCP_SERVER_ADDON_ID)
                    .with_parameters(
                        AddonParameters::new()
                            .with("port", 0)
                            .with("frame_size", EchoProcessor::MAX_FRAME_SIZE as u64),
                    ),
            )
            .unwrap();
        manager.start().await.unwrap();
        manager.stop().await.unwrap();
    }
}
