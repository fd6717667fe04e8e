//! Listener side: accept loop, per-connection upgrade, send and broadcast.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use easyws_core::{AuthPolicy, ClientId, Message};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument};

use crate::auth::HandshakeGate;
use crate::connection::{Connection, Role};
use crate::dispatch::{self, BroadcastReport};
use crate::endpoint::Endpoint;
use crate::error::{NetError, Result};
use crate::event_bridge::EventSink;
use crate::pool::ConnectionPool;
use crate::session::Session;
use crate::tls::TlsIdentity;
use crate::transport::{self, DEFAULT_MAX_MESSAGE_SIZE};

/// Listener configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Only upgrade requests whose path matches the endpoint path.
    pub path_routing: bool,
    /// Required handshake headers. `None` accepts every request.
    pub auth: Option<AuthPolicy>,
    /// Certificate and key, required for `wss://` endpoints.
    pub tls: Option<TlsIdentity>,
    /// Inbound message size limit in bytes.
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            path_routing: true,
            auth: None,
            tls: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Require `policy` on every upgrade request.
    #[must_use]
    pub fn with_auth(mut self, policy: AuthPolicy) -> Self {
        self.auth = Some(policy);
        self
    }

    /// Serve TLS with `identity`.
    #[must_use]
    pub fn with_tls(mut self, identity: TlsIdentity) -> Self {
        self.tls = Some(identity);
        self
    }
}

/// A websocket listener. Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("endpoint", &self.inner.endpoint)
            .finish_non_exhaustive()
    }
}

struct ServerInner {
    endpoint: Endpoint,
    config: ServerConfig,
    gate: HandshakeGate,
    events: Arc<dyn EventSink>,
    pool: Arc<ConnectionPool>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Create a server for a `ws://` or `wss://` URL. Nothing is bound yet.
    pub fn new(url: &str, config: ServerConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let endpoint = Endpoint::parse(url)?;
        let path = config.path_routing.then(|| endpoint.path().to_owned());
        let gate = HandshakeGate::new(path, config.auth.clone());
        Ok(Self {
            inner: Arc::new(ServerInner {
                endpoint,
                config,
                gate,
                events,
                pool: Arc::new(ConnectionPool::new()),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                local_addr: Mutex::new(None),
            }),
        })
    }

    /// The endpoint this server was created for.
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Bind the endpoint authority and serve until [`Server::close`] or an
    /// accept error.
    ///
    /// Setup and bind failures are reported as `on_failure(true, ..)` and
    /// returned. A graceful close returns `Ok(())`.
    pub async fn listen_and_serve(&self) -> Result<()> {
        let acceptor = self.prepare_tls()?;
        let listener = match TcpListener::bind(self.inner.endpoint.authority()).await {
            Ok(l) => l,
            Err(e) => return Err(self.fail_setup(e.into())),
        };
        self.accept_loop(listener, acceptor).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let acceptor = self.prepare_tls()?;
        self.accept_loop(listener, acceptor).await
    }

    /// Address the accept loop is bound to, once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    /// Identities of the live sessions.
    pub fn client_ids(&self) -> Vec<ClientId> {
        self.inner.pool.ids()
    }

    /// Number of live sessions.
    pub fn client_count(&self) -> usize {
        self.inner.pool.len()
    }

    /// Write to one client. Fails with [`NetError::NoSuchClient`] for an
    /// unknown identity; write errors propagate.
    pub async fn send(&self, id: ClientId, message: Message) -> Result<()> {
        dispatch::send(&self.inner.pool, id, message).await
    }

    /// Write to every client, reporting per-client failures to the event sink.
    pub async fn broadcast(&self, message: Message) -> BroadcastReport {
        dispatch::broadcast(&self.inner.pool, self.inner.events.as_ref(), &message).await
    }

    /// Close one session.
    pub async fn disconnect(&self, id: ClientId) -> Result<()> {
        let conn = self.inner.pool.get(id).ok_or(NetError::NoSuchClient(id))?;
        let _ = conn.close().await;
        Ok(())
    }

    /// Whether [`Server::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop accepting, close every session, and wait for all of them and the
    /// accept loop to finish.
    pub async fn close(&self) {
        let conns = self.inner.pool.connections();
        info!(sessions = conns.len(), "closing server");
        let _ = futures::future::join_all(conns.iter().map(|conn| conn.close())).await;
        self.inner.shutdown.cancel();
        let _ = self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("server closed");
    }

    fn fail_setup(&self, err: NetError) -> NetError {
        error!(endpoint = %self.inner.endpoint, error = %err, "server setup failed");
        self.inner.events.on_failure(true, err.clone());
        err
    }

    fn prepare_tls(&self) -> Result<Option<TlsAcceptor>> {
        if !self.inner.endpoint.is_tls() {
            return Ok(None);
        }
        let identity = self.inner.config.tls.as_ref().ok_or_else(|| {
            self.fail_setup(NetError::Tls(
                "wss endpoint requires a certificate and key".into(),
            ))
        })?;
        identity.acceptor().map(Some).map_err(|e| self.fail_setup(e))
    }

    #[instrument(skip_all, fields(endpoint = %self.inner.endpoint))]
    async fn accept_loop(
        &self,
        listener: TcpListener,
        acceptor: Option<TlsAcceptor>,
    ) -> Result<()> {
        let inner = &self.inner;
        // Keeps `close()` waiting until this loop has returned.
        let _token = inner.tracker.token();

        let addr = listener
            .local_addr()
            .map_err(|e| self.fail_setup(e.into()))?;
        *inner.local_addr.lock() = Some(addr);
        info!(%addr, tls = acceptor.is_some(), "listening");

        let outcome = loop {
            tokio::select! {
                biased;
                () = inner.shutdown.cancelled() => break Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let inner = Arc::clone(inner);
                        let acceptor = acceptor.clone();
                        let _ = self.inner.tracker.spawn(async move {
                            handle_connection(inner, stream, remote, acceptor).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed, listener stopping");
                        break Err(NetError::from(e));
                    }
                },
            }
        };

        let reason = outcome.clone().err().unwrap_or(NetError::ListenerClosed);
        info!(reason = %reason, "accept loop exited");
        inner.events.on_failure(true, reason);
        outcome
    }
}

async fn handle_connection(
    inner: Arc<ServerInner>,
    stream: TcpStream,
    remote: SocketAddr,
    acceptor: Option<TlsAcceptor>,
) {
    match acceptor {
        Some(acceptor) => {
            let tls = tokio::select! {
                () = inner.shutdown.cancelled() => return,
                tls = acceptor.accept(stream) => tls,
            };
            match tls {
                Ok(tls) => serve_stream(inner, tls, remote).await,
                Err(e) => info!(%remote, error = %e, "tls handshake failed"),
            }
        }
        None => serve_stream(inner, stream, remote).await,
    }
}

async fn serve_stream<S>(inner: Arc<ServerInner>, stream: S, remote: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let Some(ws) = upgrade(&inner, stream, remote).await else {
        return;
    };
    let (sink, source) = transport::split(ws);
    let conn = Arc::new(Connection::new(
        ClientId::next(),
        Role::Server,
        sink,
        inner.shutdown.child_token(),
        Some(remote),
    ));
    let session = Session::new(conn, Arc::clone(&inner.pool), Arc::clone(&inner.events));
    let _ = session.run(source).await;
}

async fn upgrade<S>(
    inner: &ServerInner,
    stream: S,
    remote: SocketAddr,
) -> Option<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let gate = inner.gate.clone();
    let callback = move |request: &Request,
                         response: Response|
          -> std::result::Result<Response, ErrorResponse> {
        gate.check(request).map(|()| response)
    };
    let config = transport::ws_config(inner.config.max_message_size);
    let handshake = tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(config));

    tokio::select! {
        () = inner.shutdown.cancelled() => None,
        result = handshake => match result {
            Ok(ws) => Some(ws),
            Err(e) => {
                info!(%remote, error = %e, "websocket handshake failed");
                None
            }
        },
    }
}
