//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use addon_host::addons::{AddonConfiguration, AddonManager, AddonParameters};
use addon_host::endpoints::{EchoEndpointsAddonFactory, ENDPOINTS_ADDON_ID};
use addon_host::net::tcp_server::{TcpServerAddonFactory, TCP_SERVER_ADDON_ID};

/// Upper bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP server bound to loopback, with a short drain timeout.
pub fn tcp_server_config() -> AddonConfiguration {
    AddonConfiguration::new(TCP_SERVER_ADDON_ID, TcpServerAddonFactory).with_parameters(
        AddonParameters::new()
            .with("bind_host", "127.0.0.1")
            .with("drain_timeout_ms", 500),
    )
}

/// Echo endpoints on `port`, depending on the TCP server.
pub fn echo_endpoints_config(port: u16) -> AddonConfiguration {
    AddonConfiguration::new(ENDPOINTS_ADDON_ID, EchoEndpointsAddonFactory)
        .depends_on(TCP_SERVER_ADDON_ID)
        .with_parameters(AddonParameters::new().with("port", port))
}

/// Start a manager with the TCP server and echo endpoints on `port`.
pub async fn start_echo_host(port: u16) -> AddonManager {
    let manager = AddonManager::new();
    manager.register(tcp_server_config()).unwrap();
    manager.register(echo_endpoints_config(port)).unwrap();
    manager.start().await.unwrap();
    manager
}

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Send one frame and read back as many bytes.
pub async fn echo_frame(client: &mut TcpStream, frame: &[u8]) -> Vec<u8> {
    client.write_all(frame).await.unwrap();
    let mut echoed = vec![0u8; frame.len()];
    tokio::time::timeout(TEST_TIMEOUT, client.read_exact(&mut echoed))
        .await
        .expect("echo timed out")
        .unwrap();
    echoed
}

/// True once the peer closed the connection (EOF or reset).
pub async fn peer_closed(client: &mut TcpStream) -> bool {
    let mut buf = [0u8; 1];
    matches!(
        tokio::time::timeout(TEST_TIMEOUT, client.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}
