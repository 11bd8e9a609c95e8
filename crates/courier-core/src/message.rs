//! Application messages handed to the messenger
//!
//! A message is an opaque payload plus a destination address string. The body
//! encoding is the caller's business; the core never inspects it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Message
// ----------------------------------------------------------------------------

/// An application message: opaque payload plus destination address.
///
/// Immutable once handed to `put`; owned by the caller until enqueued, then
/// by the messenger until sent and settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    address: String,
    body: Vec<u8>,
}

impl Message {
    /// Create a message with an opaque byte body
    pub fn new<A: Into<String>>(address: A, body: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            address: address.into(),
            body,
        }
    }

    /// Create a message with a UTF-8 text body
    pub fn text<A: Into<String>, T: Into<String>>(address: A, text: T) -> Self {
        Self::new(address, text.into().into_bytes())
    }

    /// Unique message id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Destination address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Opaque payload bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Payload as UTF-8 text, when it is one
    pub fn body_text(&self) -> Option<&str> {
        core::str::from_utf8(&self.body).ok()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message() {
        let message = Message::text("amqp://0.0.0.0", "Hello World!");
        assert_eq!(message.address(), "amqp://0.0.0.0");
        assert_eq!(message.body(), b"Hello World!");
        assert_eq!(message.body_text(), Some("Hello World!"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Message::new("amqp://host/queue", vec![1, 2, 3]);
        let b = Message::new("amqp://host/queue", vec![1, 2, 3]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_binary_body_is_not_text() {
        let message = Message::new("amqp://host", vec![0xff, 0xfe]);
        assert_eq!(message.body_text(), None);
    }
}
