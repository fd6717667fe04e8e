//! Messages exchanged over a session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ids::ClientId;

/// Frame type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
    /// Close control frame.
    Close,
    /// Ping control frame.
    Ping,
    /// Pong control frame.
    Pong,
}

impl MessageKind {
    /// Whether this is a control frame (close/ping/pong).
    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Lowercase label for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }
}

/// One message: a frame kind, its payload, and the client it came from or
/// is addressed to.
///
/// Immutable once built. Cloning is cheap because the payload is
/// reference-counted [`Bytes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    payload: Bytes,
    client_id: Option<ClientId>,
}

impl Message {
    /// Build a message of any kind.
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            client_id: None,
        }
    }

    /// Text message.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Text, payload)
    }

    /// Binary message.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Binary, payload)
    }

    /// Tag the message with a client identity.
    #[must_use]
    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    /// Frame kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Originating or target client, if tagged.
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Payload as UTF-8, when it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consume the message, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message() {
        let msg = Message::text("hello");
        assert_eq!(msg.kind(), MessageKind::Text);
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.len(), 5);
        assert!(msg.client_id().is_none());
    }

    #[test]
    fn binary_message_may_be_invalid_utf8() {
        let msg = Message::binary(vec![0xff, 0xfe]);
        assert_eq!(msg.kind(), MessageKind::Binary);
        assert!(msg.as_text().is_none());
    }

    #[test]
    fn with_client_tags_identity() {
        let id = ClientId::from_raw(9);
        let msg = Message::text("x").with_client(id);
        assert_eq!(msg.client_id(), Some(id));
    }

    #[test]
    fn empty_payload() {
        let msg = Message::new(MessageKind::Ping, Bytes::new());
        assert!(msg.is_empty());
        assert!(msg.kind().is_control());
    }

    #[test]
    fn control_classification() {
        assert!(!MessageKind::Text.is_control());
        assert!(!MessageKind::Binary.is_control());
        assert!(MessageKind::Close.is_control());
        assert!(MessageKind::Pong.is_control());
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&MessageKind::Binary).unwrap();
        assert_eq!(json, "\"binary\"");
        assert_eq!(MessageKind::Binary.as_str(), "binary");
    }

    #[test]
    fn into_payload_returns_bytes() {
        let msg = Message::text("abc");
        assert_eq!(msg.into_payload(), Bytes::from_static(b"abc"));
    }
}
