//! Tracker allocation and the delivery registry
//!
//! Trackers are opaque 64-bit handles, monotonically increasing per
//! direction, that stay valid across asynchronous transport callbacks long
//! after the call that created them returned. The registry is the single
//! source of truth mapping tracker to delivery record; callers never hold
//! live references.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::delivery::Delivery;
use crate::errors::{MessengerError, Result};

// ----------------------------------------------------------------------------
// Tracker
// ----------------------------------------------------------------------------

/// Direction of a tracked message relative to this messenger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
}

impl Direction {
    fn label(&self) -> &'static str {
        match self {
            Direction::Outgoing => "out",
            Direction::Incoming => "in",
        }
    }
}

/// Opaque handle identifying one message's delivery.
///
/// Unique within the lifetime of one messenger; the outgoing and incoming
/// sequence namespaces are independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tracker {
    direction: Direction,
    sequence: u64,
}

impl Tracker {
    pub(crate) fn new(direction: Direction, sequence: u64) -> Self {
        Self {
            direction,
            sequence,
        }
    }

    /// Direction namespace this tracker was allocated in
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Position in its direction namespace; older trackers have smaller
    /// sequence numbers
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.direction.label(), self.sequence)
    }
}

// ----------------------------------------------------------------------------
// Tracker Registry
// ----------------------------------------------------------------------------

/// Maps trackers to delivery records, per direction.
///
/// Ordered storage so cumulative settlement can walk every open tracker up
/// to a given sequence cheaply.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    outgoing: BTreeMap<u64, Delivery>,
    incoming: BTreeMap<u64, Delivery>,
    next_outgoing: u64,
    next_incoming: u64,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh tracker and its delivery record; never fails
    pub fn allocate(&mut self, direction: Direction) -> Tracker {
        let sequence = match direction {
            Direction::Outgoing => {
                self.next_outgoing += 1;
                self.next_outgoing
            }
            Direction::Incoming => {
                self.next_incoming += 1;
                self.next_incoming
            }
        };
        let tracker = Tracker::new(direction, sequence);
        self.map_mut(direction).insert(sequence, Delivery::new(tracker));
        tracker
    }

    /// Delivery for a tracker, or None if absent or evicted
    pub fn lookup(&self, tracker: Tracker) -> Option<&Delivery> {
        self.map(tracker.direction).get(&tracker.sequence)
    }

    /// Mutable delivery for a tracker, or None if absent or evicted
    pub fn lookup_mut(&mut self, tracker: Tracker) -> Option<&mut Delivery> {
        self.map_mut(tracker.direction).get_mut(&tracker.sequence)
    }

    /// Remove a mapping. Only permitted once the delivery is settled; use
    /// [`TrackerRegistry::clear`] for forced cleanup at shutdown.
    pub fn evict(&mut self, tracker: Tracker) -> Result<()> {
        match self.lookup(tracker) {
            None => Err(MessengerError::UnknownTracker { tracker }),
            Some(delivery) if !delivery.is_settled() => Err(MessengerError::InvalidTransition {
                side: "local",
                from: delivery.local().name(),
                to: "evicted",
            }),
            Some(_) => {
                self.map_mut(tracker.direction).remove(&tracker.sequence);
                Ok(())
            }
        }
    }

    /// Sequences of all un-settled deliveries at or before the given
    /// tracker, oldest first (cumulative settlement order)
    pub fn unsettled_sequences_up_to(&self, tracker: Tracker) -> SmallVec<[u64; 8]> {
        self.map(tracker.direction)
            .range(..=tracker.sequence)
            .filter(|(_, delivery)| !delivery.is_settled())
            .map(|(sequence, _)| *sequence)
            .collect()
    }

    /// Number of open (un-evicted) deliveries in a direction
    pub fn open_count(&self, direction: Direction) -> usize {
        self.map(direction).len()
    }

    /// Forced cleanup at messenger shutdown: drop every record
    pub fn clear(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
    }

    fn map(&self, direction: Direction) -> &BTreeMap<u64, Delivery> {
        match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        }
    }

    fn map_mut(&mut self, direction: Direction) -> &mut BTreeMap<u64, Delivery> {
        match direction {
            Direction::Outgoing => &mut self.outgoing,
            Direction::Incoming => &mut self.incoming,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Disposition;

    #[test]
    fn test_allocation_is_monotonic() {
        let mut registry = TrackerRegistry::new();
        let a = registry.allocate(Direction::Outgoing);
        let b = registry.allocate(Direction::Outgoing);
        let c = registry.allocate(Direction::Outgoing);
        assert!(a.sequence() < b.sequence());
        assert!(b.sequence() < c.sequence());
    }

    #[test]
    fn test_direction_namespaces_are_independent() {
        let mut registry = TrackerRegistry::new();
        let out = registry.allocate(Direction::Outgoing);
        let inc = registry.allocate(Direction::Incoming);
        assert_eq!(out.sequence(), inc.sequence());
        assert_ne!(out, inc);
        assert_eq!(registry.open_count(Direction::Outgoing), 1);
        assert_eq!(registry.open_count(Direction::Incoming), 1);
    }

    #[test]
    fn test_lookup_absent_is_none() {
        let registry = TrackerRegistry::new();
        let tracker = Tracker::new(Direction::Outgoing, 42);
        assert!(registry.lookup(tracker).is_none());
    }

    #[test]
    fn test_evict_requires_settlement() {
        let mut registry = TrackerRegistry::new();
        let tracker = registry.allocate(Direction::Outgoing);

        assert!(registry.evict(tracker).is_err());

        let delivery = registry.lookup_mut(tracker).unwrap();
        delivery.dispose_local(Disposition::Accepted).unwrap();
        delivery.settle().unwrap();

        registry.evict(tracker).unwrap();
        assert!(registry.lookup(tracker).is_none());
        assert_eq!(
            registry.evict(tracker),
            Err(MessengerError::UnknownTracker { tracker })
        );
    }

    #[test]
    fn test_sequence_not_reused_after_evict() {
        let mut registry = TrackerRegistry::new();
        let first = registry.allocate(Direction::Outgoing);

        let delivery = registry.lookup_mut(first).unwrap();
        delivery.dispose_local(Disposition::Accepted).unwrap();
        delivery.settle().unwrap();
        registry.evict(first).unwrap();

        let second = registry.allocate(Direction::Outgoing);
        assert!(second.sequence() > first.sequence());
    }

    #[test]
    fn test_unsettled_walk_stops_at_tracker() {
        let mut registry = TrackerRegistry::new();
        let trackers: Vec<_> = (0..4).map(|_| registry.allocate(Direction::Outgoing)).collect();

        // settle the second one out of band
        let delivery = registry.lookup_mut(trackers[1]).unwrap();
        delivery.dispose_local(Disposition::Accepted).unwrap();
        delivery.settle().unwrap();

        let sequences = registry.unsettled_sequences_up_to(trackers[2]);
        assert_eq!(
            sequences.as_slice(),
            &[trackers[0].sequence(), trackers[2].sequence()]
        );
    }
}
