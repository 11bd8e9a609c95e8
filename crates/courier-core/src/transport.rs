//! Transport abstraction for the courier messenger
//!
//! The core never performs network I/O itself. An external [`Transport`]
//! accepts framed bytes for a destination address and reports progress,
//! remote dispositions, inbound messages, and shutdown asynchronously over
//! an event channel. Wire framing is the transport's business.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::delivery::{DeliveryFlags, Disposition};
use crate::errors::{MessengerError, Result};
use crate::message::Message;
use crate::tracker::Tracker;

// ----------------------------------------------------------------------------
// Transport Events
// ----------------------------------------------------------------------------

/// Sender half of the transport event channel, handed to the transport at
/// open time
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half, owned by the messenger
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Notifications a transport delivers back to the messenger
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Transport-level readiness changed for a delivery
    Progress {
        tracker: Tracker,
        flags: DeliveryFlags,
    },
    /// The remote peer declared a disposition for a delivery
    Disposition {
        tracker: Tracker,
        state: Disposition,
    },
    /// The transport can accept more outbound data
    Writable,
    /// A message arrived from the peer
    Inbound { message: Message },
    /// The transport closed: orderly shutdown when `error` is None,
    /// otherwise a fatal failure
    Closed { error: Option<String> },
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// External collaborator that moves message bytes for the messenger.
///
/// Handshake, security, and addressing resolution all live behind this
/// seam.
#[async_trait]
pub trait Transport: Send {
    /// Bind transport resources and start reporting events on the given
    /// channel
    async fn open(&mut self, events: EventSender) -> Result<()>;

    /// Hand one framed message to the transport for the destination address
    async fn dispatch(&mut self, tracker: Tracker, address: &str, payload: &[u8]) -> Result<()>;

    /// Release transport resources
    async fn close(&mut self) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Loopback Transport
// ----------------------------------------------------------------------------

/// In-process transport that immediately acknowledges every dispatched
/// message and echoes it back as an inbound message. Used by the CLI and as
/// a reference implementation.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    events: Option<EventSender>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(events) = &self.events {
            // the messenger may already have dropped its receiver at stop
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&mut self, events: EventSender) -> Result<()> {
        self.events = Some(events);
        Ok(())
    }

    async fn dispatch(&mut self, tracker: Tracker, address: &str, payload: &[u8]) -> Result<()> {
        if self.events.is_none() {
            return Err(MessengerError::transport("loopback transport is not open"));
        }
        trace!(%tracker, address, len = payload.len(), "loopback dispatch");

        self.emit(TransportEvent::Progress {
            tracker,
            flags: DeliveryFlags {
                writable: true,
                ..Default::default()
            },
        });
        self.emit(TransportEvent::Disposition {
            tracker,
            state: Disposition::Accepted,
        });
        self.emit(TransportEvent::Inbound {
            message: Message::new(address, payload.to_vec()),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.emit(TransportEvent::Closed { error: None });
        self.events = None;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Direction;

    #[tokio::test]
    async fn test_loopback_acks_and_echoes() {
        let mut transport = LoopbackTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.open(tx).await.unwrap();

        let tracker = Tracker::new(Direction::Outgoing, 1);
        transport
            .dispatch(tracker, "amqp://0.0.0.0", b"hi")
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            TransportEvent::Progress { tracker: t, flags } => {
                assert_eq!(t, tracker);
                assert!(flags.writable);
            }
            other => panic!("expected progress, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            TransportEvent::Disposition { tracker: t, state } => {
                assert_eq!(t, tracker);
                assert_eq!(state, Disposition::Accepted);
            }
            other => panic!("expected disposition, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            TransportEvent::Inbound { message } => {
                assert_eq!(message.address(), "amqp://0.0.0.0");
                assert_eq!(message.body(), b"hi");
            }
            other => panic!("expected inbound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_before_open_fails() {
        let mut transport = LoopbackTransport::new();
        let tracker = Tracker::new(Direction::Outgoing, 1);
        let err = transport
            .dispatch(tracker, "amqp://0.0.0.0", b"hi")
            .await
            .unwrap_err();
        assert!(matches!(err, MessengerError::TransportFailure { .. }));
    }

    #[tokio::test]
    async fn test_close_reports_orderly_shutdown() {
        let mut transport = LoopbackTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.open(tx).await.unwrap();
        transport.close().await.unwrap();

        match rx.recv().await.unwrap() {
            TransportEvent::Closed { error: None } => {}
            other => panic!("expected orderly close, got {other:?}"),
        }
    }
}
