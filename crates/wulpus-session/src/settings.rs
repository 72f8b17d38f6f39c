//! Session timing and capacity settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default serial baud rate of the WULPUS dongle
pub const DEFAULT_BAUD_RATE: u32 = 4_000_000;

/// Tunables for [`AcquisitionSession`](crate::AcquisitionSession) and the
/// serial transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Wait between the restart packet and the configuration packet
    pub settle_delay_ms: u64,
    /// Sleep when a receive returns nothing
    pub idle_delay_ms: u64,
    /// Events buffered per subscriber before it starts lagging
    pub broadcast_capacity: usize,
    pub baud_rate: u32,
    /// Serial read timeout per receive call
    pub read_timeout_ms: u64,
    /// Pacing between replayed frames
    pub replay_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2500,
            idle_delay_ms: 5,
            broadcast_capacity: 256,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            replay_interval_ms: 100,
        }
    }
}

impl SessionSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }
}
