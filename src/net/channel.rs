//! Byte-stream channel over one accepted connection.
//!
//! # Responsibilities
//! - Exact-length send and receive; partial reads never count as success
//! - Map peer hang-ups to [`ChannelError::ConnectionClosed`]
//! - Let the listener close the channel from outside via [`ChannelHandle`],
//!   which wakes any pending `send`/`receive`

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use super::connection::ConnectionId;

/// Error type for channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer hung up or the channel was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Any other socket failure.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ChannelError::ConnectionClosed,
            _ => ChannelError::Io(e),
        }
    }
}

/// Bidirectional byte stream bound to one connection.
///
/// Owned by the worker processing the connection.
#[derive(Debug)]
pub struct Channel {
    id: ConnectionId,
    peer_addr: SocketAddr,
    stream: TcpStream,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl Channel {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            peer_addr,
            stream,
            closed_tx: Arc::new(closed_tx),
            closed_rx,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Handle for closing this channel from another task.
    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            id: self.id,
            peer_addr: self.peer_addr,
            closed_tx: Arc::clone(&self.closed_tx),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Write all of `data`.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::ConnectionClosed);
        }
        let Self {
            stream, closed_rx, ..
        } = self;

        tokio::select! {
            biased;
            _ = wait_closed(closed_rx) => Err(ChannelError::ConnectionClosed),
            written = stream.write_all(data) => Ok(written?),
        }
    }

    /// Fill `buf` completely, suspending until enough bytes arrived.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::ConnectionClosed);
        }
        let Self {
            stream, closed_rx, ..
        } = self;

        tokio::select! {
            biased;
            _ = wait_closed(closed_rx) => Err(ChannelError::ConnectionClosed),
            read = stream.read_exact(buf) => {
                read?;
                Ok(())
            }
        }
    }

    /// Flush and shut down the write half, then mark the channel closed.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.closed_tx.send_replace(true);
        self.stream.shutdown().await.map_err(ChannelError::from)
    }
}

/// Resolves once the channel is marked closed.
///
/// The sender lives in the [`Channel`] itself, so it cannot disappear
/// while this future is polled.
async fn wait_closed(closed_rx: &mut watch::Receiver<bool>) {
    let _ = closed_rx.wait_for(|closed| *closed).await;
}

/// Listener-side view of a channel: identity plus the ability to close it.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ConnectionId,
    peer_addr: SocketAddr,
    closed_tx: Arc<watch::Sender<bool>>,
}

impl ChannelHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Close the channel. Pending and future operations fail with
    /// [`ChannelError::ConnectionClosed`].
    pub fn close(&self) {
        self.closed_tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn pair() -> (Channel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer_addr) = listener.accept().await.unwrap();
        (Channel::new(server, peer_addr), client)
    }

    #[tokio::test]
    async fn receive_waits_for_the_full_length() {
        let (mut channel, mut client) = pair().await;

        tokio::spawn(async move {
            client.write_all(&[0, 1]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.write_all(&[2, 3]).await.unwrap();
            let mut echoed = [0u8; 4];
            client.read_exact(&mut echoed).await.unwrap();
            assert_eq!(echoed, [0, 1, 2, 3]);
        });

        let mut buf = [0u8; 4];
        channel.receive(&mut buf).await.unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        channel.send(&buf).await.unwrap();
    }

    #[tokio::test]
    async fn partial_frame_then_hangup_is_closed() {
        let (mut channel, mut client) = pair().await;
        client.write_all(&[9, 9]).await.unwrap();
        drop(client);

        let mut buf = [0u8; 4];
        let result = channel.receive(&mut buf).await;
        assert!(matches!(result, Err(ChannelError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn handle_close_unblocks_pending_receive() {
        let (mut channel, _client) = pair().await;
        let handle = channel.handle();

        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 4];
            let result = channel.receive(&mut buf).await;
            (result, channel)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.close();

        let (result, mut channel) = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("receive did not unblock")
            .unwrap();
        assert!(matches!(result, Err(ChannelError::ConnectionClosed)));
        assert!(channel.is_closed());
        assert!(matches!(
            channel.send(&[1]).await,
            Err(ChannelError::ConnectionClosed)
        ));
    }

    #[test]
    fn io_error_classification() {
        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert!(matches!(ChannelError::from(eof), ChannelError::ConnectionClosed));

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(ChannelError::from(denied), ChannelError::Io(_)));
    }
}
