//! Error types for the courier messenger core
//!
//! All failures surface through a single [`MessengerError`] enum. Errors are
//! also recorded in the messenger's last-error slot so that polling-style
//! callers can check after each call instead of handling results directly.

use crate::tracker::Tracker;

// ----------------------------------------------------------------------------
// Messenger Errors
// ----------------------------------------------------------------------------

/// Core error types for the courier messenger
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessengerError {
    /// Operation attempted before `start` or after `stop`
    #[error("messenger is not started")]
    NotStarted,

    /// Disposition set out of order or on a settled delivery
    #[error("invalid {side} disposition transition: {from} -> {to}")]
    InvalidTransition {
        side: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Lookup or settle on an absent or evicted tracker
    #[error("no delivery information for tracker {tracker}")]
    UnknownTracker { tracker: Tracker },

    /// Non-fatal: the outgoing window is full and the timeout elapsed
    #[error("operation would block: outgoing window is full")]
    WouldBlock,

    /// Fatal: the underlying transport was lost or rejected the operation
    #[error("transport failure: {reason}")]
    TransportFailure { reason: String },

    /// Programming error: a window slot was released twice
    #[error("window slot released twice")]
    DoubleRelease,

    /// Message rejected before enqueue (e.g. empty destination address)
    #[error("invalid message: {reason}")]
    InvalidMessage { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl MessengerError {
    /// Create a transport failure with a reason
    pub fn transport<T: Into<String>>(reason: T) -> Self {
        MessengerError::TransportFailure {
            reason: reason.into(),
        }
    }

    /// Create an invalid message error with a reason
    pub fn invalid_message<T: Into<String>>(reason: T) -> Self {
        MessengerError::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Whether the error is recoverable by retrying later
    pub fn is_would_block(&self) -> bool {
        matches!(self, MessengerError::WouldBlock)
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, MessengerError>;
