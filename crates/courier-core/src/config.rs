//! Messenger configuration

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Messenger Configuration
// ----------------------------------------------------------------------------

/// Configuration for messenger behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Outgoing window capacity: maximum un-settled dispatched deliveries.
    /// 0 means unbounded.
    pub window: usize,
    /// Settle a delivery automatically once the remote peer reports a
    /// terminal disposition (fire-and-forget sending). Default is explicit
    /// caller-driven settlement.
    pub auto_settle: bool,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            window: 0,
            auto_settle: false,
        }
    }
}

impl MessengerConfig {
    /// Set the outgoing window capacity
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Enable or disable automatic settlement on remote disposition
    pub fn with_auto_settle(mut self, auto_settle: bool) -> Self {
        self.auto_settle = auto_settle;
        self
    }
}
