//! One live connection: identity, write half, and lifecycle state.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use easyws_core::{ClientId, Message};
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{NetError, Result};
use crate::metrics::WS_MESSAGES_SENT_TOTAL;
use crate::transport::MessageSink;

/// Upper bound on writing the Close frame. A peer that stops reading must not
/// hold up shutdown.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Which side of the handshake created the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Accepted by a listener.
    Server,
    /// Dialed by a client.
    Client,
}

/// Session lifecycle: `Connecting → Open → Closed`. Never moves backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Handshake done, receive loop not started.
    Connecting = 0,
    /// Registered and reading.
    Open = 1,
    /// Receive loop has ended.
    Closed = 2,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

/// A connected peer.
pub struct Connection {
    id: ClientId,
    role: Role,
    sink: Arc<dyn MessageSink>,
    cancel: CancellationToken,
    remote_addr: Option<SocketAddr>,
    connected_at: Instant,
    state: AtomicU8,
    closing: AtomicBool,
}

impl Connection {
    /// Wrap a write half. `cancel` stops the receive loop of this connection.
    pub fn new(
        id: ClientId,
        role: Role,
        sink: Arc<dyn MessageSink>,
        cancel: CancellationToken,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            id,
            role,
            sink,
            cancel,
            remote_addr,
            connected_at: Instant::now(),
            state: AtomicU8::new(SessionState::Connecting as u8),
            closing: AtomicBool::new(false),
        }
    }

    /// Client identity.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Server or client side.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Peer address, when known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Advance the lifecycle. Moving backwards is ignored.
    pub(crate) fn advance(&self, next: SessionState) {
        let _ = self.state.fetch_max(next as u8, Ordering::AcqRel);
    }

    /// Token cancelled when the connection is closed locally.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether [`Connection::close`] has been called.
    ///
    /// Once set, a transport error seen by the receive loop is the tail of
    /// the local close, not a remote failure.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Whether the connection has been closed or is closing.
    pub fn is_closed(&self) -> bool {
        self.is_closing() || self.state() == SessionState::Closed
    }

    /// Write one message to the peer.
    pub async fn write(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(NetError::ConnectionClosed);
        }
        self.sink.write(message).await?;
        counter!(WS_MESSAGES_SENT_TOTAL).increment(1);
        Ok(())
    }

    /// Close locally: send a normal-closure frame, then stop the receive loop.
    ///
    /// Idempotent. Returns `false` if the connection was already closing.
    pub async fn close(&self) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.state() != SessionState::Closed {
            match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, self.sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(client_id = %self.id, error = %e, "close frame not sent"),
                Err(_) => warn!(client_id = %self.id, "close frame timed out"),
            }
        }
        self.cancel.cancel();
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("remote_addr", &self.remote_addr)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
