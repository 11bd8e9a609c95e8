//! Per-message delivery state machine
//!
//! Each message in transit is represented by a [`Delivery`]: a local
//! disposition, a remote disposition observed from the peer, a set of
//! advisory transport flags, and an irreversible settlement bit. Invalid
//! transitions are rejected with [`MessengerError::InvalidTransition`] and
//! leave the record untouched.

use serde::{Deserialize, Serialize};

use crate::errors::{MessengerError, Result};
use crate::tracker::Tracker;

// ----------------------------------------------------------------------------
// Disposition
// ----------------------------------------------------------------------------

/// Declared outcome for one side of a delivery.
///
/// `Received` is provisional and may be superseded; the other four
/// non-`None` dispositions are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// No disposition declared yet
    None,
    /// Provisional: the endpoint has seen the message but not judged it
    Received,
    /// Message accepted
    Accepted,
    /// Message rejected as invalid
    Rejected,
    /// Message released back without processing
    Released,
    /// Message modified and released
    Modified,
}

impl Disposition {
    /// Whether this disposition is final and can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Disposition::Accepted
                | Disposition::Rejected
                | Disposition::Released
                | Disposition::Modified
        )
    }

    /// Disposition name for logging and error reporting
    pub fn name(&self) -> &'static str {
        match self {
            Disposition::None => "none",
            Disposition::Received => "received",
            Disposition::Accepted => "accepted",
            Disposition::Rejected => "rejected",
            Disposition::Released => "released",
            Disposition::Modified => "modified",
        }
    }
}

// ----------------------------------------------------------------------------
// Delivery Flags
// ----------------------------------------------------------------------------

/// Advisory transport-level readiness flags.
///
/// Set by the transport on progress notifications; read-only to callers.
/// The flags are informative, not mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFlags {
    /// Only part of the message has crossed the transport so far
    pub partial: bool,
    /// Inbound data is ready to be read
    pub readable: bool,
    /// The transport can accept more outbound data
    pub writable: bool,
    /// The disposition pair changed since the caller last looked
    pub updated: bool,
}

// ----------------------------------------------------------------------------
// Delivery
// ----------------------------------------------------------------------------

/// The evolving disposition record for exactly one message in transit
#[derive(Debug, Clone)]
pub struct Delivery {
    tracker: Tracker,
    local: Disposition,
    remote: Disposition,
    settled: bool,
    dispatched: bool,
    flags: DeliveryFlags,
}

impl Delivery {
    /// Create a fresh delivery record for a tracker
    pub fn new(tracker: Tracker) -> Self {
        Self {
            tracker,
            local: Disposition::None,
            remote: Disposition::None,
            settled: false,
            dispatched: false,
            flags: DeliveryFlags::default(),
        }
    }

    /// Tracker this delivery belongs to
    pub fn tracker(&self) -> Tracker {
        self.tracker
    }

    /// Local endpoint's disposition
    pub fn local(&self) -> Disposition {
        self.local
    }

    /// Remote peer's disposition, observed asynchronously
    pub fn remote(&self) -> Disposition {
        self.remote
    }

    /// Whether both sides agree the delivery is final
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Whether the message was handed to the transport (and, for outgoing
    /// deliveries, holds a window slot)
    pub fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    /// Current advisory flags
    pub fn flags(&self) -> DeliveryFlags {
        self.flags
    }

    /// Set the local endpoint's disposition.
    ///
    /// Allowed from `None` or the provisional `Received` only; terminal
    /// dispositions are final.
    pub fn dispose_local(&mut self, state: Disposition) -> Result<()> {
        self.check_transition("local", self.local, state)?;
        self.local = state;
        self.flags.updated = true;
        Ok(())
    }

    /// Record the remote peer's disposition, driven by transport frames
    pub fn observe_remote(&mut self, state: Disposition) -> Result<()> {
        self.check_transition("remote", self.remote, state)?;
        self.remote = state;
        self.flags.updated = true;
        Ok(())
    }

    /// Finalize the delivery. Requires a terminal local disposition;
    /// irreversible and idempotent.
    pub fn settle(&mut self) -> Result<()> {
        if self.settled {
            return Ok(());
        }
        if !self.local.is_terminal() {
            return Err(MessengerError::InvalidTransition {
                side: "local",
                from: self.local.name(),
                to: "settled",
            });
        }
        self.settled = true;
        self.flags.updated = true;
        Ok(())
    }

    /// Mark the message as handed to the transport
    pub fn mark_dispatched(&mut self) {
        self.dispatched = true;
    }

    /// Apply a transport progress notification.
    ///
    /// The `updated` member of the incoming flags is ignored; the delivery
    /// raises its own `updated` bit on every notification.
    pub fn apply_progress(&mut self, flags: DeliveryFlags) {
        self.flags.partial = flags.partial;
        self.flags.readable = flags.readable;
        self.flags.writable = flags.writable;
        self.flags.updated = true;
    }

    /// Take a read-only snapshot and clear the `updated` flag, so status
    /// polling is edge-triggered. The snapshot carries the pre-clear value.
    pub fn snapshot(&mut self) -> DeliveryInfo {
        let info = DeliveryInfo {
            tracker: self.tracker,
            local: self.local,
            remote: self.remote,
            settled: self.settled,
            flags: self.flags,
        };
        self.flags.updated = false;
        info
    }

    fn check_transition(
        &self,
        side: &'static str,
        from: Disposition,
        to: Disposition,
    ) -> Result<()> {
        let blocked = self.settled || from.is_terminal() || to == Disposition::None;
        if blocked {
            let from = if self.settled { "settled" } else { from.name() };
            return Err(MessengerError::InvalidTransition {
                side,
                from,
                to: to.name(),
            });
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Delivery Snapshot
// ----------------------------------------------------------------------------

/// Read-only view of a delivery, returned by status queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub tracker: Tracker,
    pub local: Disposition,
    pub remote: Disposition,
    pub settled: bool,
    pub flags: DeliveryFlags,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::Direction;

    fn delivery() -> Delivery {
        Delivery::new(Tracker::new(Direction::Outgoing, 1))
    }

    #[test]
    fn test_initial_state() {
        let d = delivery();
        assert_eq!(d.local(), Disposition::None);
        assert_eq!(d.remote(), Disposition::None);
        assert!(!d.is_settled());
        assert!(!d.is_dispatched());
        assert_eq!(d.flags(), DeliveryFlags::default());
    }

    #[test]
    fn test_received_is_provisional() {
        let mut d = delivery();
        d.dispose_local(Disposition::Received).unwrap();
        d.dispose_local(Disposition::Accepted).unwrap();
        assert_eq!(d.local(), Disposition::Accepted);
    }

    #[test]
    fn test_terminal_disposition_is_final() {
        let mut d = delivery();
        d.dispose_local(Disposition::Accepted).unwrap();

        let err = d.dispose_local(Disposition::Rejected).unwrap_err();
        assert_eq!(
            err,
            MessengerError::InvalidTransition {
                side: "local",
                from: "accepted",
                to: "rejected",
            }
        );
        // state unchanged after the failed call
        assert_eq!(d.local(), Disposition::Accepted);
    }

    #[test]
    fn test_cannot_dispose_back_to_none() {
        let mut d = delivery();
        assert!(d.dispose_local(Disposition::None).is_err());
    }

    #[test]
    fn test_remote_side_is_independent() {
        let mut d = delivery();
        d.observe_remote(Disposition::Accepted).unwrap();
        assert_eq!(d.remote(), Disposition::Accepted);
        assert_eq!(d.local(), Disposition::None);
        assert!(d.observe_remote(Disposition::Released).is_err());
    }

    #[test]
    fn test_settle_requires_terminal_local() {
        let mut d = delivery();
        assert!(d.settle().is_err());

        d.dispose_local(Disposition::Accepted).unwrap();
        d.settle().unwrap();
        assert!(d.is_settled());

        // settle is idempotent
        d.settle().unwrap();
        assert!(d.is_settled());
    }

    #[test]
    fn test_settled_delivery_is_frozen() {
        let mut d = delivery();
        d.dispose_local(Disposition::Accepted).unwrap();
        d.settle().unwrap();

        let err = d.observe_remote(Disposition::Accepted).unwrap_err();
        assert_eq!(
            err,
            MessengerError::InvalidTransition {
                side: "remote",
                from: "settled",
                to: "accepted",
            }
        );
    }

    #[test]
    fn test_snapshot_clears_updated_flag() {
        let mut d = delivery();
        d.apply_progress(DeliveryFlags {
            partial: true,
            writable: true,
            ..Default::default()
        });

        let info = d.snapshot();
        assert!(info.flags.updated);
        assert!(info.flags.partial);
        assert!(info.flags.writable);

        // edge-triggered: a second snapshot with no new progress is quiet
        let info = d.snapshot();
        assert!(!info.flags.updated);
        assert!(info.flags.partial);
    }

    #[test]
    fn test_progress_can_report_updated_and_partial_together() {
        let mut d = delivery();
        d.observe_remote(Disposition::Received).unwrap();
        d.apply_progress(DeliveryFlags {
            partial: true,
            ..Default::default()
        });

        let info = d.snapshot();
        assert!(info.flags.updated && info.flags.partial);
    }
}
