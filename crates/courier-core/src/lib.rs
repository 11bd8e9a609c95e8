//! Courier messenger core
//!
//! A windowed message sender with per-delivery tracking: messages are
//! enqueued with `put`, driven onto a pluggable transport by `send` under a
//! sliding window bound, and their delivery followed through a local/remote
//! disposition state machine until explicit (or configured automatic)
//! settlement frees the tracked resources.
//!
//! The transport, wire encoding, and CLI glue are external collaborators;
//! this crate only owns the delivery-tracking state machines.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod delivery;
pub mod errors;
pub mod message;
pub mod messenger;
pub mod tracker;
pub mod transport;
pub mod window;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::MessengerConfig;
pub use delivery::{DeliveryFlags, DeliveryInfo, Disposition};
pub use errors::{MessengerError, Result};
pub use message::Message;
pub use messenger::{Messenger, SendOutcome, SettleMode};
pub use tracker::{Direction, Tracker};
pub use transport::{EventSender, LoopbackTransport, Transport, TransportEvent};
pub use window::Window;
