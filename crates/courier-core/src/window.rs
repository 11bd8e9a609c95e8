//! Sliding send window
//!
//! Bounds the number of un-settled dispatched deliveries. A slot is reserved
//! when a message is handed to the transport and released exactly once when
//! its delivery settles.

use crate::errors::{MessengerError, Result};

// ----------------------------------------------------------------------------
// Window Controller
// ----------------------------------------------------------------------------

/// Bounded count of in-flight deliveries. Capacity 0 means unbounded.
#[derive(Debug, Clone)]
pub struct Window {
    capacity: usize,
    in_flight: usize,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_flight: 0,
        }
    }

    /// Attempt to claim one slot for a new outgoing send; false when the
    /// window is full
    pub fn reserve(&mut self) -> bool {
        if self.capacity > 0 && self.in_flight >= self.capacity {
            return false;
        }
        self.in_flight += 1;
        true
    }

    /// Return one slot upon settlement. Called exactly once per dispatched
    /// delivery; underflow is a reported programming error, never silently
    /// ignored.
    pub fn release(&mut self) -> Result<()> {
        if self.in_flight == 0 {
            return Err(MessengerError::DoubleRelease);
        }
        self.in_flight -= 1;
        Ok(())
    }

    /// Adjust the capacity. Shrinking below the current count simply blocks
    /// new reservations until settlements bring the count back under.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
