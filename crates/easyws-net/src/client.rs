//! Dialer side: one session per `connect_and_serve` call.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use easyws_core::{ClientId, Message};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connection::{Connection, Role};
use crate::dispatch;
use crate::endpoint::Endpoint;
use crate::error::{NetError, Result};
use crate::event_bridge::EventSink;
use crate::pool::ConnectionPool;
use crate::session::{Session, SessionEnd};
use crate::tls::{self, ClientTlsOptions};
use crate::transport::{self, DEFAULT_MAX_MESSAGE_SIZE, MessageSink, MessageSource};

/// Dialer configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Accept any server certificate.
    pub skip_verify: bool,
    /// Validate the chain but ignore a hostname mismatch.
    pub skip_hostname_check: bool,
    /// PEM buffers of extra trusted roots.
    pub root_cas: Vec<Vec<u8>>,
    /// Headers sent with every upgrade request.
    pub headers: Vec<(String, String)>,
    /// Inbound message size limit in bytes.
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            skip_verify: false,
            skip_hostname_check: false,
            root_cas: Vec::new(),
            headers: Vec::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// A websocket client. Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    events: Arc<dyn EventSink>,
    pool: Arc<ConnectionPool>,
    current: Mutex<Option<Arc<Connection>>>,
    /// Cancel token of the running `connect_and_serve`, set from the start
    /// of the dial.
    attempt: Mutex<Option<CancellationToken>>,
    extra_roots: Mutex<Vec<CertificateDer<'static>>>,
    serving: watch::Sender<bool>,
}

type Dialed = (Arc<dyn MessageSink>, Box<dyn MessageSource>, Option<SocketAddr>);

/// Resets the serving state however `connect_and_serve` exits.
struct ServingGuard<'a>(&'a ClientInner);

impl Drop for ServingGuard<'_> {
    fn drop(&mut self) {
        *self.0.attempt.lock() = None;
        let _ = self.0.serving.send_replace(false);
    }
}

impl Client {
    /// Create a client that reports to `events`.
    pub fn new(config: ClientConfig, events: Arc<dyn EventSink>) -> Self {
        let (serving, _) = watch::channel(false);
        Self {
            inner: Arc::new(ClientInner {
                config,
                events,
                pool: Arc::new(ConnectionPool::new()),
                current: Mutex::new(None),
                attempt: Mutex::new(None),
                extra_roots: Mutex::new(Vec::new()),
                serving,
            }),
        }
    }

    /// Trust the certificates in `pem` for later dials. Returns how many
    /// were added; invalid PEM is logged and ignored.
    pub fn add_root_ca(&self, pem: &[u8]) -> usize {
        match tls::parse_certs(pem) {
            Ok(certs) => {
                let added = certs.len();
                self.inner.extra_roots.lock().extend(certs);
                added
            }
            Err(e) => {
                warn!(error = %e, "ignoring root certificate");
                0
            }
        }
    }

    /// Dial `url`, run the session until it ends, and return.
    ///
    /// Returns `Ok(())` after a local [`Client::disconnect`] and the terminal
    /// error otherwise. Dial failures are also reported as
    /// `on_failure(true, ..)`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect_and_serve(&self, url: &str, headers: &[(String, String)]) -> Result<()> {
        let claimed = self.inner.serving.send_if_modified(|serving| {
            if *serving {
                false
            } else {
                *serving = true;
                true
            }
        });
        if !claimed {
            return Err(NetError::AlreadyConnected);
        }
        let _guard = ServingGuard(&self.inner);
        let cancel = CancellationToken::new();
        *self.inner.attempt.lock() = Some(cancel.clone());

        let dialed = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("disconnected while dialing");
                return Ok(());
            }
            dialed = self.dial(url, headers) => dialed,
        };
        let (sink, source, remote) = match dialed {
            Ok(dialed) => dialed,
            Err(e) => {
                warn!(error = %e, "dial failed");
                self.inner.events.on_failure(true, e.clone());
                return Err(e);
            }
        };

        let conn = Arc::new(Connection::new(
            ClientId::next(),
            Role::Client,
            sink,
            cancel.clone(),
            remote,
        ));
        // `disconnect` reads `current` and cancels `attempt` under the
        // `current` lock, so a cancel here is never missed.
        let published = {
            let mut current = self.inner.current.lock();
            let live = !cancel.is_cancelled();
            if live {
                *current = Some(Arc::clone(&conn));
            }
            live
        };
        if !published {
            debug!("disconnected during handshake");
            let _ = conn.close().await;
            return Ok(());
        }
        info!(client_id = %conn.id(), "connected");

        let session = Session::new(
            Arc::clone(&conn),
            Arc::clone(&self.inner.pool),
            Arc::clone(&self.inner.events),
        );
        let end = session.run(source).await;

        let mut current = self.inner.current.lock();
        if current.as_ref().is_some_and(|c| c.id() == conn.id()) {
            *current = None;
        }
        drop(current);

        match end {
            SessionEnd::Local => Ok(()),
            SessionEnd::Remote(e) => Err(e),
        }
    }

    /// Write to the server.
    pub async fn send(&self, message: Message) -> Result<()> {
        let id = self.client_id().ok_or(NetError::NotConnected)?;
        dispatch::send(&self.inner.pool, id, message).await
    }

    /// Write a text message to the server.
    pub async fn send_text(&self, text: impl Into<Bytes>) -> Result<()> {
        self.send(Message::text(text)).await
    }

    /// Close the session and wait for `connect_and_serve` to return.
    ///
    /// A dial still in progress is abandoned. Idempotent; disconnecting an
    /// idle client is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let conn = {
            let current = self.inner.current.lock();
            if current.is_none() {
                if let Some(attempt) = self.inner.attempt.lock().as_ref() {
                    attempt.cancel();
                }
            }
            current.clone()
        };
        if let Some(conn) = conn {
            if conn.close().await {
                debug!(client_id = %conn.id(), "disconnect requested");
            }
        }
        let mut serving = self.inner.serving.subscribe();
        let _ = serving.wait_for(|s| !*s).await;
        Ok(())
    }

    /// Whether a session is live.
    pub fn is_connected(&self) -> bool {
        self.inner
            .current
            .lock()
            .as_ref()
            .is_some_and(|c| !c.is_closed())
    }

    /// Identity of the live session.
    pub fn client_id(&self) -> Option<ClientId> {
        self.inner.current.lock().as_ref().map(|c| c.id())
    }

    async fn dial(&self, url: &str, headers: &[(String, String)]) -> Result<Dialed> {
        let endpoint = Endpoint::parse(url)?;

        let mut request = endpoint.as_str().into_client_request()?;
        let config_headers = self.inner.config.headers.iter();
        for (name, value) in config_headers.chain(headers.iter()) {
            append_header(&mut request, name, value)?;
        }

        let tls = if endpoint.is_tls() {
            Some((
                tls::connector(&self.tls_options())?,
                tls::server_name(endpoint.host())?,
            ))
        } else {
            None
        };

        let tcp = TcpStream::connect(endpoint.authority()).await?;
        let remote = tcp.peer_addr().ok();
        debug!(?remote, tls = tls.is_some(), "tcp connected");
        let ws_config = Some(transport::ws_config(self.inner.config.max_message_size));

        let (sink, source) = match tls {
            Some((connector, name)) => {
                let stream = connector
                    .connect(name, tcp)
                    .await
                    .map_err(|e| NetError::Tls(e.to_string()))?;
                let (ws, _) =
                    tokio_tungstenite::client_async_with_config(request, stream, ws_config)
                        .await?;
                transport::split(ws)
            }
            None => {
                let (ws, _) =
                    tokio_tungstenite::client_async_with_config(request, tcp, ws_config).await?;
                transport::split(ws)
            }
        };
        Ok((sink, source, remote))
    }

    fn tls_options(&self) -> ClientTlsOptions {
        let mut roots = Vec::new();
        for pem in &self.inner.config.root_cas {
            match tls::parse_certs(pem) {
                Ok(certs) => roots.extend(certs),
                Err(e) => warn!(error = %e, "ignoring configured root certificate"),
            }
        }
        roots.extend(self.inner.extra_roots.lock().iter().cloned());
        ClientTlsOptions {
            skip_verify: self.inner.config.skip_verify,
            skip_hostname_check: self.inner.config.skip_hostname_check,
            roots,
        }
    }
}

fn append_header(request: &mut Request, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| NetError::InvalidHeader(format!("{name}: {e}")))?;
    let value =
        HeaderValue::from_str(value).map_err(|e| NetError::InvalidHeader(format!("{name}: {e}")))?;
    let _ = request.headers_mut().append(name, value);
    Ok(())
}
