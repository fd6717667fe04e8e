//! # easyws-net
//!
//! WebSocket session manager.
//!
//! - [`ConnectionPool`]: concurrent registry of live connections
//! - [`Session`]: one receive loop per connection, reporting to an [`EventSink`]
//! - [`Server`] / [`Client`]: accept and dial, with targeted send and broadcast
//! - [`HandshakeGate`]: path routing and header auth before the upgrade
//!
//! Notifications reach the embedding application through an [`EventSink`];
//! [`ChannelSink`] forwards them onto two bounded queues.

#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod event_bridge;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod session;
pub mod tls;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{HandshakeGate, path_matches};
pub use client::{Client, ClientConfig};
pub use connection::{Connection, Role, SessionState};
pub use dispatch::BroadcastReport;
pub use endpoint::Endpoint;
pub use error::{NetError, Result};
pub use event_bridge::{CallbackSink, ChannelSink, Event, EventKind, EventQueues, EventSink};
pub use pool::ConnectionPool;
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionEnd};
pub use tls::{TlsIdentity, generate_self_signed};
pub use transport::{DEFAULT_MAX_MESSAGE_SIZE, MessageSink, MessageSource};
