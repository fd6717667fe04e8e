//! Error type of the session manager.
//!
//! Library errors are stored as strings so that [`NetError`] is `Clone`: the
//! same terminal error is handed to the event sink and returned to the caller.

use easyws_core::ClientId;
use thiserror::Error;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::error::ProtocolError;

/// Errors raised by the pool, sessions, server, and client.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NetError {
    /// The endpoint URL could not be parsed or has no host.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The endpoint scheme is not `ws` or `wss`.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    /// TLS setup failed (bad key pair, unusable trust store, bad server name).
    #[error("tls error: {0}")]
    Tls(String),
    /// An extra request header has an invalid name or value.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(String),
    /// The upgrade exchange failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The server refused the upgrade with an HTTP status.
    #[error("upgrade rejected with status {status}")]
    Rejected {
        /// HTTP status code of the refusal.
        status: u16,
    },
    /// Any other websocket protocol failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The peer sent a Close frame.
    #[error("peer closed the connection ({code}): {reason}")]
    PeerClosed {
        /// Close code sent by the peer.
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },
    /// The connection is already closed.
    #[error("connection closed")]
    ConnectionClosed,
    /// No connection is registered under this identity.
    #[error("no such client: {0}")]
    NoSuchClient(ClientId),
    /// The client has no live session.
    #[error("not connected")]
    NotConnected,
    /// The client already has a live session.
    #[error("already connected")]
    AlreadyConnected,
    /// Writing to one client failed.
    #[error("send to {client_id} failed: {source}")]
    SendFailed {
        /// The client the write was addressed to.
        client_id: ClientId,
        /// The underlying write error.
        source: Box<NetError>,
    },
    /// A text message payload is not valid UTF-8.
    #[error("text payload is not valid utf-8")]
    InvalidUtf8,
    /// The accept loop has stopped.
    #[error("listener closed")]
    ListenerClosed,
}

impl NetError {
    /// Whether this error happened before any listening or dialing started.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl(_) | Self::UnsupportedScheme(_) | Self::Tls(_) | Self::InvalidHeader(_)
        )
    }

    /// Short static label for logs and metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::UnsupportedScheme(_) => "unsupported_scheme",
            Self::Tls(_) => "tls",
            Self::InvalidHeader(_) => "invalid_header",
            Self::Io(_) => "io",
            Self::Handshake(_) => "handshake",
            Self::Rejected { .. } => "rejected",
            Self::Transport(_) => "transport",
            Self::PeerClosed { .. } => "peer_closed",
            Self::ConnectionClosed => "connection_closed",
            Self::NoSuchClient(_) => "no_such_client",
            Self::NotConnected => "not_connected",
            Self::AlreadyConnected => "already_connected",
            Self::SendFailed { .. } => "send_failed",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::ListenerClosed => "listener_closed",
        }
    }
}

impl From<std::io::Error> for NetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<tungstenite::Error> for NetError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Protocol(ProtocolError::SendAfterClosing) => {
                Self::ConnectionClosed
            }
            tungstenite::Error::Io(e) => Self::Io(e.to_string()),
            tungstenite::Error::Http(resp) => Self::Rejected {
                status: resp.status().as_u16(),
            },
            tungstenite::Error::Url(e) => Self::InvalidUrl(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Result type for session manager operations.
pub type Result<T> = std::result::Result<T, NetError>;
