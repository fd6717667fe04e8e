//! Transport seam between sessions and the websocket library.
//!
//! Sessions only see [`MessageSink`] and [`MessageSource`], so the receive
//! loop and the pool can be driven by in-memory fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use easyws_core::{Message, MessageKind};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::error::{NetError, Result};

/// Default inbound message and frame size limit (16 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 << 20;

/// Protocol settings shared by both roles.
pub(crate) fn ws_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

/// Write half of a connection. Safe to share between tasks.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Write one message.
    async fn write(&self, message: Message) -> Result<()>;

    /// Send a normal-closure Close frame. Closing twice is not an error.
    async fn close(&self) -> Result<()>;
}

/// Read half of a connection. Owned by exactly one receive loop.
#[async_trait]
pub trait MessageSource: Send {
    /// Read the next data message.
    ///
    /// Control frames are handled by the transport. A Close frame from the
    /// peer is returned as [`NetError::PeerClosed`].
    async fn read(&mut self) -> Result<Message>;
}

/// [`MessageSink`] over the write half of a websocket stream.
pub struct WsSink<S> {
    inner: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
}

/// [`MessageSource`] over the read half of a websocket stream.
pub struct WsSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

/// Split an upgraded stream into the two seam halves.
pub fn split<S>(ws: WebSocketStream<S>) -> (Arc<dyn MessageSink>, Box<dyn MessageSource>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    (
        Arc::new(WsSink {
            inner: Mutex::new(sink),
        }),
        Box::new(WsSource { inner: stream }),
    )
}

fn to_ws(message: Message) -> Result<WsMessage> {
    let kind = message.kind();
    let payload = message.into_payload();
    Ok(match kind {
        MessageKind::Text => {
            let text = String::from_utf8(payload.to_vec()).map_err(|_| NetError::InvalidUtf8)?;
            WsMessage::text(text)
        }
        MessageKind::Binary => WsMessage::binary(payload),
        MessageKind::Ping => WsMessage::Ping(payload),
        MessageKind::Pong => WsMessage::Pong(payload),
        MessageKind::Close => WsMessage::Close(None),
    })
}

#[async_trait]
impl<S> MessageSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&self, message: Message) -> Result<()> {
        let frame = to_ws(message)?;
        self.inner.lock().await.send(frame).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let frame = WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: String::new().into(),
        }));
        let mut sink = self.inner.lock().await;
        let sent = match sink.send(frame).await {
            // The peer closed first; closing the sink flushes the queued reply.
            Err(WsError::Protocol(ProtocolError::SendAfterClosing)) => sink.close().await,
            other => other,
        };
        match sent.map_err(NetError::from) {
            Ok(()) | Err(NetError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<S> MessageSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read(&mut self) -> Result<Message> {
        loop {
            let Some(frame) = self.inner.next().await else {
                return Err(NetError::ConnectionClosed);
            };
            match frame? {
                WsMessage::Text(text) => {
                    return Ok(Message::text(Bytes::copy_from_slice(text.as_bytes())));
                }
                WsMessage::Binary(data) => return Ok(Message::binary(data)),
                WsMessage::Close(frame) => {
                    let (code, reason) = frame.map_or((1005, String::new()), |f| {
                        (u16::from(f.code), f.reason.as_str().to_owned())
                    });
                    return Err(NetError::PeerClosed { code, reason });
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;

    async fn pair() -> (
        (Arc<dyn MessageSink>, Box<dyn MessageSource>),
        (Arc<dyn MessageSink>, Box<dyn MessageSource>),
    ) {
        let (a, b) = duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (split(server), split(client))
    }

    #[tokio::test]
    async fn text_and_binary_cross_the_seam() {
        let ((server_tx, _server_rx), (_client_tx, mut client_rx)) = pair().await;

        server_tx.write(Message::text("hello")).await.unwrap();
        server_tx
            .write(Message::binary(vec![0u8, 159, 146, 150]))
            .await
            .unwrap();

        let first = client_rx.read().await.unwrap();
        assert_eq!(first.kind(), MessageKind::Text);
        assert_eq!(first.as_text(), Some("hello"));

        let second = client_rx.read().await.unwrap();
        assert_eq!(second.kind(), MessageKind::Binary);
        assert_eq!(second.payload().as_ref(), &[0u8, 159, 146, 150]);
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_refused() {
        let ((server_tx, _server_rx), _client) = pair().await;
        let err = server_tx
            .write(Message::text(vec![0xffu8, 0xfe]))
            .await
            .unwrap_err();
        assert_eq!(err, NetError::InvalidUtf8);
    }

    #[tokio::test]
    async fn close_surfaces_as_peer_closed() {
        let ((server_tx, _server_rx), (_client_tx, mut client_rx)) = pair().await;
        server_tx.close().await.unwrap();
        let err = client_rx.read().await.unwrap_err();
        assert_eq!(
            err,
            NetError::PeerClosed {
                code: 1000,
                reason: String::new()
            }
        );
    }

    #[tokio::test]
    async fn closing_after_peer_close_sends_the_reply() {
        let ((server_tx, mut server_rx), (client_tx, mut client_rx)) = pair().await;
        server_tx.close().await.unwrap();
        assert_eq!(
            client_rx.read().await.unwrap_err().error_kind(),
            NetError::PeerClosed {
                code: 1000,
                reason: String::new()
            }
            .error_kind()
        );

        client_tx.close().await.unwrap();

        let reply = tokio::time::timeout(std::time::Duration::from_secs(5), server_rx.read())
            .await
            .expect("close reply never arrived");
        assert_eq!(
            reply.unwrap_err(),
            NetError::PeerClosed {
                code: 1000,
                reason: String::new()
            }
        );
    }

    #[tokio::test]
    async fn oversized_message_ends_the_read() {
        let (a, b) = duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, Some(ws_config(16))).await;
        let (server_tx, _server_rx) = split(server);
        let (_client_tx, mut client_rx) = split(client);

        server_tx.write(Message::binary(vec![7u8; 64])).await.unwrap();
        let err = client_rx.read().await.unwrap_err();
        assert_eq!(err.error_kind(), "transport");
    }

    #[tokio::test]
    async fn dropped_peer_is_connection_closed_or_io() {
        let ((server_tx, server_rx), (_client_tx, mut client_rx)) = pair().await;
        drop(server_tx);
        drop(server_rx);
        let err = client_rx.read().await.unwrap_err();
        assert!(
            matches!(err, NetError::ConnectionClosed | NetError::Io(_) | NetError::Transport(_)),
            "{err:?}"
        );
    }
}
