//! Lifecycle and data notifications.
//!
//! [`EventSink`] is the capability sessions, the server, and the client call
//! into. Two implementations ship here: [`ChannelSink`] forwards onto two
//! bounded queues, [`CallbackSink`] invokes closures directly.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use easyws_core::{ClientId, Message};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

use crate::error::NetError;
use crate::metrics::WS_BRIDGE_DROPS_TOTAL;

/// Receiver of session notifications.
///
/// Called concurrently from many session tasks. Implementations must not
/// block for long: the calling receive loop waits for each call to return.
pub trait EventSink: Send + Sync {
    /// A session opened.
    fn on_connect(&self, id: ClientId);

    /// A session ended.
    fn on_disconnect(&self, id: ClientId);

    /// A data message arrived. The message carries the sender's identity.
    fn on_receive(&self, message: Message);

    /// Something failed. `exited` is true when the owning accept or dial loop
    /// has stopped for good.
    fn on_failure(&self, exited: bool, error: NetError);
}

/// Event kind tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A session opened.
    Connect,
    /// A session ended.
    Disconnect,
    /// A per-operation failure.
    Failure,
    /// A failure that stopped the accept or dial loop.
    FailureWithExit,
}

/// A lifecycle notification as delivered on the event queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A session opened.
    Connect(ClientId),
    /// A session ended.
    Disconnect(ClientId),
    /// Something failed.
    Failure {
        /// Whether the owning loop has stopped.
        exited: bool,
        /// The failure.
        error: NetError,
    },
}

impl Event {
    /// Kind tag of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connect(_) => EventKind::Connect,
            Self::Disconnect(_) => EventKind::Disconnect,
            Self::Failure { exited: false, .. } => EventKind::Failure,
            Self::Failure { exited: true, .. } => EventKind::FailureWithExit,
        }
    }

    /// Identity for connect and disconnect events.
    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            Self::Connect(id) | Self::Disconnect(id) => Some(*id),
            Self::Failure { .. } => None,
        }
    }

    /// Error for failure events.
    pub fn error(&self) -> Option<&NetError> {
        match self {
            Self::Failure { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(id) => write!(f, "connected {id}"),
            Self::Disconnect(id) => write!(f, "disconnected {id}"),
            Self::Failure { error, .. } => write!(f, "failure: {error}"),
        }
    }
}

/// Consumer ends of a [`ChannelSink`].
#[derive(Debug)]
pub struct EventQueues {
    /// Received data messages.
    pub messages: mpsc::Receiver<Message>,
    /// Connect, disconnect, and failure events.
    pub events: mpsc::Receiver<Event>,
}

/// [`EventSink`] that forwards onto two bounded queues.
///
/// A full queue drops the notification and logs an error; a queue whose
/// receiver is gone drops with a warning. The receive loop never waits on a
/// slow consumer.
#[derive(Debug)]
pub struct ChannelSink {
    messages: mpsc::Sender<Message>,
    events: mpsc::Sender<Event>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and its queues. Capacities are clamped to at least 1.
    pub fn bounded(message_capacity: usize, event_capacity: usize) -> (Self, EventQueues) {
        let (msg_tx, msg_rx) = mpsc::channel(message_capacity.max(1));
        let (evt_tx, evt_rx) = mpsc::channel(event_capacity.max(1));
        (
            Self {
                messages: msg_tx,
                events: evt_tx,
                dropped: AtomicU64::new(0),
            },
            EventQueues {
                messages: msg_rx,
                events: evt_rx,
            },
        )
    }

    /// Notifications dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward<T>(&self, queue: &'static str, tx: &mpsc::Sender<T>, item: T) {
        match tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(WS_BRIDGE_DROPS_TOTAL, "queue" => queue).increment(1);
                error!(queue, dropped = total, "bridge queue full, dropping notification");
            }
            Err(TrySendError::Closed(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(WS_BRIDGE_DROPS_TOTAL, "queue" => queue).increment(1);
                warn!(queue, "bridge queue closed, dropping notification");
            }
        }
    }
}

impl EventSink for ChannelSink {
    fn on_connect(&self, id: ClientId) {
        self.forward("events", &self.events, Event::Connect(id));
    }

    fn on_disconnect(&self, id: ClientId) {
        self.forward("events", &self.events, Event::Disconnect(id));
    }

    fn on_receive(&self, message: Message) {
        self.forward("messages", &self.messages, message);
    }

    fn on_failure(&self, exited: bool, error: NetError) {
        self.forward("events", &self.events, Event::Failure { exited, error });
    }
}

type IdCallback = Box<dyn Fn(ClientId) + Send + Sync>;
type MessageCallback = Box<dyn Fn(Message) + Send + Sync>;
type FailureCallback = Box<dyn Fn(bool, NetError) + Send + Sync>;

/// [`EventSink`] that calls closures synchronously. Unset callbacks ignore
/// the notification.
#[derive(Default)]
pub struct CallbackSink {
    connect: Option<IdCallback>,
    disconnect: Option<IdCallback>,
    receive: Option<MessageCallback>,
    failure: Option<FailureCallback>,
}

impl CallbackSink {
    /// A sink that ignores everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `f` on connect.
    #[must_use]
    pub fn with_connect(mut self, f: impl Fn(ClientId) + Send + Sync + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    /// Call `f` on disconnect.
    #[must_use]
    pub fn with_disconnect(mut self, f: impl Fn(ClientId) + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Box::new(f));
        self
    }

    /// Call `f` for each received message.
    #[must_use]
    pub fn with_receive(mut self, f: impl Fn(Message) + Send + Sync + 'static) -> Self {
        self.receive = Some(Box::new(f));
        self
    }

    /// Call `f` on failure.
    #[must_use]
    pub fn with_failure(mut self, f: impl Fn(bool, NetError) + Send + Sync + 'static) -> Self {
        self.failure = Some(Box::new(f));
        self
    }

    /// Wrap in an `Arc` for handing to a server or client.
    pub fn into_shared(self) -> Arc<dyn EventSink> {
        Arc::new(self)
    }
}

impl EventSink for CallbackSink {
    fn on_connect(&self, id: ClientId) {
        if let Some(f) = &self.connect {
            f(id);
        }
    }

    fn on_disconnect(&self, id: ClientId) {
        if let Some(f) = &self.disconnect {
            f(id);
        }
    }

    fn on_receive(&self, message: Message) {
        if let Some(f) = &self.receive {
            f(message);
        }
    }

    fn on_failure(&self, exited: bool, error: NetError) {
        if let Some(f) = &self.failure {
            f(exited, error);
        }
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("connect", &self.connect.is_some())
            .field("disconnect", &self.disconnect.is_some())
            .field("receive", &self.receive.is_some())
            .field("failure", &self.failure.is_some())
            .finish()
    }
}
