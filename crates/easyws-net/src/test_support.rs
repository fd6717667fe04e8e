//! In-memory fakes for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use easyws_core::{ClientId, Message};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

use crate::error::{NetError, Result};
use crate::event_bridge::{Event, EventSink};
use crate::transport::{MessageSink, MessageSource};

/// [`EventSink`] that records everything in order.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<Event>>,
    messages: Mutex<Vec<Message>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub(crate) fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn on_connect(&self, id: ClientId) {
        self.events.lock().push(Event::Connect(id));
    }

    fn on_disconnect(&self, id: ClientId) {
        self.events.lock().push(Event::Disconnect(id));
    }

    fn on_receive(&self, message: Message) {
        self.messages.lock().push(message);
    }

    fn on_failure(&self, exited: bool, error: NetError) {
        self.events.lock().push(Event::Failure { exited, error });
    }
}

/// [`MessageSink`] that records writes, or fails every write.
#[derive(Default)]
pub(crate) struct FakeSink {
    written: Mutex<Vec<Message>>,
    fail_with: Option<NetError>,
    closes: AtomicUsize,
    hold_close: Option<Arc<Notify>>,
}

impl FakeSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing(error: NetError) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(error),
            ..Self::default()
        })
    }

    /// Sink whose `close` never completes on its own.
    pub(crate) fn stalled() -> Arc<Self> {
        Self::held(Arc::new(Notify::new()))
    }

    /// Sink whose `close` waits until `release` is notified.
    pub(crate) fn held(release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            hold_close: Some(release),
            ..Self::default()
        })
    }

    pub(crate) fn written(&self) -> Vec<Message> {
        self.written.lock().clone()
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSink for FakeSink {
    async fn write(&self, message: Message) -> Result<()> {
        if let Some(e) = &self.fail_with {
            return Err(e.clone());
        }
        self.written.lock().push(message);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(release) = &self.hold_close {
            release.notified().await;
        }
        Ok(())
    }
}

/// [`MessageSource`] fed from a channel. Dropping the sender ends the
/// stream with [`NetError::ConnectionClosed`].
pub(crate) struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<Result<Message>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> (mpsc::UnboundedSender<Result<Message>>, Box<dyn MessageSource>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Box::new(Self { rx }))
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn read(&mut self) -> Result<Message> {
        self.rx.recv().await.unwrap_or(Err(NetError::ConnectionClosed))
    }
}
