//! Transducer channel to HV-multiplexer switch mapping
//!
//! The probe has eight transducer channels. Each channel is reachable through
//! two multiplexer switches, one on the transmit path and one on the receive
//! path. Switches are numbered 0..15; RX switches are the even ids and TX
//! switches the odd ids.

use std::fmt;

/// Highest valid transducer channel index
pub const MAX_CH_ID: u8 = 7;

/// Number of transducer channels
pub const NUM_CHANNELS: usize = MAX_CH_ID as usize + 1;

/// Channel → switch id for the receive path
pub const RX_MAP: [u8; NUM_CHANNELS] = [0, 2, 4, 6, 8, 10, 12, 14];

/// Channel → switch id for the transmit path
pub const TX_MAP: [u8; NUM_CHANNELS] = [1, 3, 5, 7, 9, 11, 13, 15];

/// Role a channel plays within a sub-configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    Tx,
    Rx,
}

impl ChannelRole {
    /// Switch lookup table for this role
    pub fn switch_map(&self) -> &'static [u8; NUM_CHANNELS] {
        match self {
            ChannelRole::Tx => &TX_MAP,
            ChannelRole::Rx => &RX_MAP,
        }
    }

    /// Mask bit of the switch serving `channel` in this role
    ///
    /// `channel` must already be validated.
    pub fn switch_bit(&self, channel: u8) -> u16 {
        1u16 << self.switch_map()[channel as usize]
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRole::Tx => f.write_str("TX"),
            ChannelRole::Rx => f.write_str("RX"),
        }
    }
}
