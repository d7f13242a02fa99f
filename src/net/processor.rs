//! Per-connection processing strategies.

use async_trait::async_trait;

use super::channel::{Channel, ChannelError, ChannelHandle};
use crate::addons::BoxError;

/// Strategy invoked once for every accepted connection.
///
/// Supplied by the addon that calls `listen`; the TCP server owns no
/// protocol knowledge.
#[async_trait]
pub trait ConnectionProcessor: Send + Sync + 'static {
    /// Handle one connection until it is done. Errors and panics stay
    /// inside the worker running this call.
    async fn process(&self, channel: &mut Channel) -> Result<(), BoxError>;

    /// Cooperative stop request for a connection still being processed.
    ///
    /// Called by `stop_listen` right before it closes the channel; pending
    /// channel operations then fail with [`ChannelError::ConnectionClosed`].
    fn stop_processing(&self, _channel: &ChannelHandle) {}
}

/// Echoes fixed-size frames back unmodified until the peer hangs up.
#[derive(Debug, Clone)]
pub struct EchoProcessor {
    frame_size: usize,
}

impl EchoProcessor {
    pub const DEFAULT_FRAME_SIZE: usize = 4;
    /// Largest frame a connection buffers.
    pub const MAX_FRAME_SIZE: usize = 64 * 1024;

    pub fn new(frame_size: usize) -> Self {
        Self { frame_size }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl Default for EchoProcessor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FRAME_SIZE)
    }
}

#[async_trait]
impl ConnectionProcessor for EchoProcessor {
    async fn process(&self, channel: &mut Channel) -> Result<(), BoxError> {
        let mut frame = vec![0u8; self.frame_size];
        let mut frames = 0u64;

        let outcome = loop {
            if let Err(e) = channel.receive(&mut frame).await {
                break e;
            }
            if let Err(e) = channel.send(&frame).await {
                break e;
            }
            frames += 1;
        };

        tracing::debug!(
            connection_id = %channel.id(),
            frames,
            "Echo finished"
        );

        match outcome {
            ChannelError::ConnectionClosed => Ok(()),
            e => Err(e.into()),
        }
    }

    fn stop_processing(&self, channel: &ChannelHandle) {
        tracing::debug!(connection_id = %channel.id(), "Echo stop requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn echoes_frames_until_hangup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        let mut channel = Channel::new(server, peer);

        let worker = tokio::spawn(async move { EchoProcessor::default().process(&mut channel).await });

        for frame in [[0u8, 1, 2, 3], [7, 7, 7, 7]] {
            client.write_all(&frame).await.unwrap();
            let mut echoed = [0u8; 4];
            client.read_exact(&mut echoed).await.unwrap();
            assert_eq!(echoed, frame);
        }
        drop(client);

        assert!(worker.await.unwrap().is_ok());
    }
}
