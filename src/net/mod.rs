//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! TcpServerAddon::listen(port, processor)
//!     → listener.rs (bind, accept with connection limits)
//!     → channel.rs (exact-length byte channel per connection)
//!     → connection.rs (tracking for StopListen)
//!     → processor.rs (one `process` call per connection, own task)
//!
//! TcpServerAddon::stop_listen(port)
//!     → stop accept loop → stop_processing + close every channel → drain
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked so StopListen can unblock it
//! - No framing: the processor owns the wire format

pub mod channel;
pub mod connection;
pub mod listener;
pub mod processor;
pub mod tcp_server;

pub use channel::{Channel, ChannelError, ChannelHandle};
pub use listener::ListenerError;
pub use processor::{ConnectionProcessor, EchoProcessor};
pub use tcp_server::{TcpParameters, TcpServerAddon, TcpServerAddonFactory, TcpServerSettings};
