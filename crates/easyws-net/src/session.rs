//! Session lifecycle: one connection from registration through disconnect.

use std::sync::Arc;

use metrics::{counter, gauge};
use tracing::{debug, instrument};

use crate::connection::{Connection, Role, SessionState};
use crate::error::NetError;
use crate::event_bridge::EventSink;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
    WS_MESSAGES_RECEIVED_TOTAL,
};
use crate::pool::ConnectionPool;
use crate::transport::MessageSource;

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Closed locally through the connection's cancel token.
    Local,
    /// The peer closed or the transport failed.
    Remote(NetError),
}

/// A registered connection plus the collaborators its receive loop reports to.
pub struct Session {
    connection: Arc<Connection>,
    pool: Arc<ConnectionPool>,
    events: Arc<dyn EventSink>,
}

impl Session {
    /// Bind a connection to a pool and an event sink.
    pub fn new(
        connection: Arc<Connection>,
        pool: Arc<ConnectionPool>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            connection,
            pool,
            events,
        }
    }

    /// The connection this session drives.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Run the receive loop until the peer goes away or the connection is
    /// closed locally.
    ///
    /// 1. Registers the connection and emits `on_connect`
    /// 2. Emits `on_receive` for each message, in arrival order
    /// 3. Unregisters and emits `on_disconnect`
    ///
    /// A client session that ends remotely also emits
    /// `on_failure(true, ..)` before the disconnect.
    #[instrument(skip_all, fields(client_id = %self.connection.id()))]
    pub async fn run(self, mut source: Box<dyn MessageSource>) -> SessionEnd {
        let conn = &self.connection;
        let id = conn.id();

        self.pool.add_or_update(Arc::clone(conn));
        conn.advance(SessionState::Open);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        debug!(remote = ?conn.remote_addr(), role = ?conn.role(), "session open");
        self.events.on_connect(id);

        let cancel = conn.cancel_token().clone();
        let end = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break SessionEnd::Local,
                read = source.read() => match read {
                    Ok(message) => {
                        counter!(WS_MESSAGES_RECEIVED_TOTAL).increment(1);
                        self.events.on_receive(message.with_client(id));
                    }
                    Err(e) if conn.is_closing() => {
                        debug!(error = %e, "transport ended during local close");
                        break SessionEnd::Local;
                    }
                    Err(e) => break SessionEnd::Remote(e),
                },
            }
        };

        if let SessionEnd::Remote(NetError::PeerClosed { .. }) = &end {
            // Flush the queued Close reply so the peer sees a clean handshake.
            let _ = conn.close().await;
        }
        conn.advance(SessionState::Closed);
        cancel.cancel();
        let _ = self.pool.delete(id);
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);

        match &end {
            SessionEnd::Local => debug!("session closed locally"),
            SessionEnd::Remote(e) => {
                debug!(error = %e, kind = e.error_kind(), "session ended by peer");
                if conn.role() == Role::Client {
                    self.events.on_failure(true, e.clone());
                }
            }
        }
        self.events.on_disconnect(id);
        end
    }
}

#[cfg(test)]
mod tests {
    use easyws_core::{ClientId, Message, MessageKind};
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::event_bridge::{Event, EventKind};
    use crate::test_support::{FakeSink, RecordingSink, ScriptedSource};

    struct Harness {
        pool: Arc<ConnectionPool>,
        events: Arc<RecordingSink>,
        sink: Arc<FakeSink>,
        conn: Arc<Connection>,
    }

    fn harness(role: Role) -> Harness {
        harness_with(role, FakeSink::new())
    }

    fn harness_with(role: Role, sink: Arc<FakeSink>) -> Harness {
        let conn = Arc::new(Connection::new(
            ClientId::next(),
            role,
            Arc::clone(&sink) as Arc<dyn crate::transport::MessageSink>,
            CancellationToken::new(),
            None,
        ));
        Harness {
            pool: Arc::new(ConnectionPool::new()),
            events: Arc::new(RecordingSink::new()),
            sink,
            conn,
        }
    }

    impl Harness {
        fn session(&self) -> Session {
            Session::new(
                Arc::clone(&self.conn),
                Arc::clone(&self.pool),
                Arc::clone(&self.events) as Arc<dyn EventSink>,
            )
        }
    }

    #[tokio::test]
    async fn receives_in_order_then_disconnects() {
        let h = harness(Role::Server);
        let id = h.conn.id();
        let (tx, source) = ScriptedSource::new();
        tx.send(Ok(Message::text("one"))).unwrap();
        tx.send(Ok(Message::binary(vec![2u8]))).unwrap();
        tx.send(Ok(Message::text("three"))).unwrap();
        drop(tx);

        let end = h.session().run(source).await;

        assert_eq!(end, SessionEnd::Remote(NetError::ConnectionClosed));
        let msgs = h.events.messages();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].as_text(), Some("one"));
        assert_eq!(msgs[1].kind(), MessageKind::Binary);
        assert_eq!(msgs[2].as_text(), Some("three"));
        assert!(msgs.iter().all(|m| m.client_id() == Some(id)));

        assert_eq!(
            h.events.events(),
            vec![Event::Connect(id), Event::Disconnect(id)]
        );
        assert!(h.pool.is_empty());
        assert_eq!(h.conn.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn registered_while_open() {
        let h = harness(Role::Server);
        let id = h.conn.id();
        let (tx, source) = ScriptedSource::new();
        let task = tokio::spawn(h.session().run(source));

        tx.send(Ok(Message::text("ping"))).unwrap();
        while h.events.messages().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(h.pool.contains(id));
        assert_eq!(h.conn.state(), SessionState::Open);

        drop(tx);
        let _ = task.await.unwrap();
        assert!(!h.pool.contains(id));
    }

    #[tokio::test]
    async fn local_close_ends_loop_without_failure() {
        let h = harness(Role::Client);
        let id = h.conn.id();
        let (_tx, source) = ScriptedSource::new();
        let task = tokio::spawn(h.session().run(source));

        while !h.pool.contains(id) {
            tokio::task::yield_now().await;
        }
        assert!(h.conn.close().await);
        assert!(!h.conn.close().await);

        assert_eq!(task.await.unwrap(), SessionEnd::Local);
        assert_eq!(
            h.events.events(),
            vec![Event::Connect(id), Event::Disconnect(id)]
        );
    }

    #[tokio::test]
    async fn client_remote_end_reports_exit_before_disconnect() {
        let h = harness(Role::Client);
        let id = h.conn.id();
        let (tx, source) = ScriptedSource::new();
        let closed = NetError::PeerClosed {
            code: 1001,
            reason: "going away".into(),
        };
        tx.send(Err(closed.clone())).unwrap();

        let end = h.session().run(source).await;

        assert_eq!(end, SessionEnd::Remote(closed.clone()));
        let events = h.events.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::Connect(id));
        assert_eq!(events[1].kind(), EventKind::FailureWithExit);
        assert_eq!(events[1].error(), Some(&closed));
        assert_eq!(events[2], Event::Disconnect(id));
    }

    #[tokio::test]
    async fn transport_error_while_closing_counts_as_local() {
        let release = Arc::new(Notify::new());
        let h = harness_with(Role::Client, FakeSink::held(Arc::clone(&release)));
        let id = h.conn.id();
        let (tx, source) = ScriptedSource::new();
        let task = tokio::spawn(h.session().run(source));
        while !h.pool.contains(id) {
            tokio::task::yield_now().await;
        }

        // Close frame is in flight; the token is not cancelled yet.
        let closing = tokio::spawn({
            let conn = Arc::clone(&h.conn);
            async move { conn.close().await }
        });
        while !h.conn.is_closing() {
            tokio::task::yield_now().await;
        }
        tx.send(Err(NetError::Transport(
            "Connection reset without closing handshake".into(),
        )))
        .unwrap();

        assert_eq!(task.await.unwrap(), SessionEnd::Local);
        release.notify_one();
        assert!(closing.await.unwrap());
        assert_eq!(
            h.events.events(),
            vec![Event::Connect(id), Event::Disconnect(id)]
        );
    }

    #[tokio::test]
    async fn peer_close_is_answered() {
        let h = harness(Role::Server);
        let (tx, source) = ScriptedSource::new();
        tx.send(Err(NetError::PeerClosed {
            code: 1000,
            reason: String::new(),
        }))
        .unwrap();

        let _ = h.session().run(source).await;

        assert_eq!(h.sink.close_count(), 1);
        assert!(h.conn.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn transport_failure_is_not_answered() {
        let h = harness(Role::Server);
        let (tx, source) = ScriptedSource::new();
        tx.send(Err(NetError::Transport("reset".into()))).unwrap();

        let _ = h.session().run(source).await;

        assert_eq!(h.sink.close_count(), 0);
    }

    #[tokio::test]
    async fn server_remote_end_only_disconnects() {
        let h = harness(Role::Server);
        let (tx, source) = ScriptedSource::new();
        tx.send(Err(NetError::Transport("protocol violation".into())))
            .unwrap();

        let _ = h.session().run(source).await;

        let kinds: Vec<_> = h.events.events().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::Connect, EventKind::Disconnect]);
    }

    #[tokio::test]
    async fn writes_after_end_fail() {
        let h = harness(Role::Server);
        let (tx, source) = ScriptedSource::new();
        drop(tx);
        let _ = h.session().run(source).await;
        assert_eq!(
            h.conn.write(Message::text("late")).await,
            Err(NetError::ConnectionClosed)
        );
    }
}
