//! TX/RX switch configuration compiler
//!
//! Turns logical channel selections into the HV-multiplexer bitmasks the
//! probe firmware expects, one `(tx, rx)` pair per sub-configuration.
//!
//! # Optimized switching
//!
//! Closing a multiplexer switch takes time. When `optimized_switching` is set,
//! some RX switches are closed already during the TX phase so the probe does
//! not have to wait for them after the pulse:
//!
//! - if more RX channels overlap the TX channels than not
//!   (`|tx ∩ rx| > |rx \ tx|`), the RX switches of the overlap are pre-closed
//! - otherwise the RX switches of the RX-only channels are pre-closed
//!
//! The comparison is strict. On a tie (including both sets empty) the RX-only
//! branch is taken, which does nothing when there are no RX-only channels.

use tracing::debug;

use crate::channels::{ChannelRole, MAX_CH_ID, NUM_CHANNELS};
use crate::error::ConfigError;

/// Maximum number of TX/RX sub-configurations per acquisition
pub const TX_RX_MAX_NUM_OF_CONFIGS: usize = 16;

/// One TX/RX channel selection within an acquisition configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TxRxSubConfig {
    /// Identifier echoed back by the probe in each frame
    #[cfg_attr(feature = "serde", serde(default))]
    pub config_id: u8,
    /// Channels that transmit
    #[cfg_attr(feature = "serde", serde(default))]
    pub tx_channels: Vec<i32>,
    /// Channels that receive
    #[cfg_attr(feature = "serde", serde(default))]
    pub rx_channels: Vec<i32>,
    /// Pre-close RX switches during the TX phase
    #[cfg_attr(feature = "serde", serde(default))]
    pub optimized_switching: bool,
}

impl TxRxSubConfig {
    /// Create a sub-configuration without optimized switching
    pub fn new(tx_channels: impl Into<Vec<i32>>, rx_channels: impl Into<Vec<i32>>) -> Self {
        Self {
            config_id: 0,
            tx_channels: tx_channels.into(),
            rx_channels: rx_channels.into(),
            optimized_switching: false,
        }
    }

    /// Enable or disable optimized switching
    pub fn with_optimized_switching(mut self, enabled: bool) -> Self {
        self.optimized_switching = enabled;
        self
    }
}

/// A 16-bit multiplexer switch mask; bit `i` closes switch `i`
///
/// Only the compiler creates masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SwitchMask(u16);

impl SwitchMask {
    /// Raw mask bits
    pub fn bits(&self) -> u16 {
        self.0
    }

    /// Whether switch `id` is closed
    pub fn is_closed(&self, id: u8) -> bool {
        id < 16 && self.0 & (1 << id) != 0
    }
}

/// Compiled masks, index-aligned with the input sub-configurations
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SwitchMasks {
    pub tx: Vec<SwitchMask>,
    pub rx: Vec<SwitchMask>,
}

impl SwitchMasks {
    /// Number of compiled `(tx, rx)` pairs
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Iterate over `(tx, rx)` pairs in order
    pub fn pairs(&self) -> impl Iterator<Item = (SwitchMask, SwitchMask)> + '_ {
        self.tx.iter().copied().zip(self.rx.iter().copied())
    }
}

/// Set of validated channels, one bit per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChannelSet(u8);

impl ChannelSet {
    fn from_indices(role: ChannelRole, channels: &[i32]) -> Result<Self, ConfigError> {
        let mut set = 0u8;
        for &channel in channels {
            if !(0..=MAX_CH_ID as i32).contains(&channel) {
                return Err(ConfigError::InvalidChannel {
                    role,
                    channel,
                    max: MAX_CH_ID,
                });
            }
            set |= 1 << channel;
        }
        Ok(Self(set))
    }

    fn len(&self) -> u32 {
        self.0.count_ones()
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn intersection(&self, other: ChannelSet) -> ChannelSet {
        ChannelSet(self.0 & other.0)
    }

    fn difference(&self, other: ChannelSet) -> ChannelSet {
        ChannelSet(self.0 & !other.0)
    }

    /// OR of the switch bits of every channel in the set
    fn switch_bits(&self, role: ChannelRole) -> u16 {
        (0..NUM_CHANNELS as u8)
            .filter(|ch| self.0 & (1 << ch) != 0)
            .fold(0, |mask, ch| mask | role.switch_bit(ch))
    }
}

/// Compile a single sub-configuration to its `(tx, rx)` mask pair
pub fn compile_one(config: &TxRxSubConfig) -> Result<(SwitchMask, SwitchMask), ConfigError> {
    let tx = ChannelSet::from_indices(ChannelRole::Tx, &config.tx_channels)?;
    let rx = ChannelSet::from_indices(ChannelRole::Rx, &config.rx_channels)?;

    let mut tx_mask = tx.switch_bits(ChannelRole::Tx);
    let rx_mask = rx.switch_bits(ChannelRole::Rx);

    if config.optimized_switching {
        let intersection = tx.intersection(rx);
        let rx_only = rx.difference(intersection);

        if intersection.len() > rx_only.len() {
            tx_mask |= intersection.switch_bits(ChannelRole::Rx);
        } else if !rx_only.is_empty() {
            tx_mask |= rx_only.switch_bits(ChannelRole::Rx);
        }
    }

    Ok((SwitchMask(tx_mask), SwitchMask(rx_mask)))
}

/// Compile an ordered list of sub-configurations
///
/// Fails with [`ConfigError::TooManyConfigs`] above
/// [`TX_RX_MAX_NUM_OF_CONFIGS`] entries and with
/// [`ConfigError::InvalidChannel`] for any out-of-range channel.
pub fn compile(configs: &[TxRxSubConfig]) -> Result<SwitchMasks, ConfigError> {
    if configs.len() > TX_RX_MAX_NUM_OF_CONFIGS {
        return Err(ConfigError::TooManyConfigs {
            count: configs.len(),
            max: TX_RX_MAX_NUM_OF_CONFIGS,
        });
    }

    let mut masks = SwitchMasks {
        tx: Vec::with_capacity(configs.len()),
        rx: Vec::with_capacity(configs.len()),
    };
    for config in configs {
        let (tx, rx) = compile_one(config)?;
        debug!(
            "TX/RX config {}: tx=0x{:04X} rx=0x{:04X}",
            config.config_id,
            tx.bits(),
            rx.bits()
        );
        masks.tx.push(tx);
        masks.rx.push(rx);
    }
    Ok(masks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{RX_MAP, TX_MAP};
    use proptest::prelude::*;

    fn bits_set(mask: SwitchMask) -> Vec<u8> {
        (0..16).filter(|&i| mask.is_closed(i)).collect()
    }

    fn rx_bit(ch: usize) -> u16 {
        1 << RX_MAP[ch]
    }

    #[test]
    fn test_single_tx_single_rx() {
        let masks = compile(&[TxRxSubConfig::new([0], [1])]).unwrap();
        assert_eq!(masks.len(), 1);
        assert_eq!(bits_set(masks.tx[0]), vec![TX_MAP[0]]);
        assert_eq!(bits_set(masks.rx[0]), vec![RX_MAP[1]]);
    }

    #[test]
    fn test_multiple_channels() {
        let masks = compile(&[TxRxSubConfig::new([0, 2, 4], [1, 3])]).unwrap();
        assert_eq!(bits_set(masks.tx[0]), vec![TX_MAP[0], TX_MAP[2], TX_MAP[4]]);
        assert_eq!(bits_set(masks.rx[0]), vec![RX_MAP[1], RX_MAP[3]]);
    }

    #[test]
    fn test_empty_lists_give_zero_masks() {
        let masks = compile(&[TxRxSubConfig::new([], []).with_optimized_switching(true)]).unwrap();
        assert_eq!(masks.tx[0].bits(), 0);
        assert_eq!(masks.rx[0].bits(), 0);
    }

    #[test]
    fn test_first_and_last_channel() {
        let max = MAX_CH_ID as i32;
        let masks = compile(&[TxRxSubConfig::new([0, max], [0, max])]).unwrap();
        assert!(masks.tx[0].is_closed(TX_MAP[0]));
        assert!(masks.tx[0].is_closed(TX_MAP[7]));
        assert!(masks.rx[0].is_closed(RX_MAP[0]));
        assert!(masks.rx[0].is_closed(RX_MAP[7]));
    }

    #[test]
    fn test_invalid_channel_high() {
        let err = compile(&[TxRxSubConfig::new([MAX_CH_ID as i32 + 1], [])]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidChannel { role: ChannelRole::Tx, channel: 8, .. }
        ));

        let err = compile(&[TxRxSubConfig::new([], [MAX_CH_ID as i32 + 2])]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidChannel { role: ChannelRole::Rx, channel: 9, .. }
        ));
    }

    #[test]
    fn test_invalid_channel_negative() {
        let err = compile(&[TxRxSubConfig::new([-1], [])]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChannel { role: ChannelRole::Tx, .. }));

        let err = compile(&[TxRxSubConfig::new([], [-2])]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChannel { role: ChannelRole::Rx, .. }));
    }

    #[test]
    fn test_max_number_of_configs() {
        let configs = vec![TxRxSubConfig::new([0], [0]); TX_RX_MAX_NUM_OF_CONFIGS];
        assert_eq!(compile(&configs).unwrap().len(), TX_RX_MAX_NUM_OF_CONFIGS);

        let configs = vec![TxRxSubConfig::new([0], [0]); TX_RX_MAX_NUM_OF_CONFIGS + 1];
        assert_eq!(
            compile(&configs).unwrap_err(),
            ConfigError::TooManyConfigs { count: 17, max: 16 }
        );
    }

    #[test]
    fn test_order_is_preserved() {
        let masks = compile(&[
            TxRxSubConfig::new([0], [0]),
            TxRxSubConfig::new([1, 2], [3]),
        ])
        .unwrap();
        assert!(masks.tx[0].is_closed(TX_MAP[0]));
        assert!(masks.rx[1].is_closed(RX_MAP[3]));
        assert_eq!(masks.pairs().count(), 2);
    }

    #[test]
    fn test_optimized_intersection_larger_than_rx_only() {
        // intersection {0, 1}, rx_only {2}
        let cfg = TxRxSubConfig::new([0, 1, 3], [0, 1, 2]).with_optimized_switching(true);
        let (tx, _) = compile_one(&cfg).unwrap();
        assert!(tx.is_closed(RX_MAP[0]));
        assert!(tx.is_closed(RX_MAP[1]));
        assert!(!tx.is_closed(RX_MAP[2]));
    }

    #[test]
    fn test_optimized_rx_only_larger_than_intersection() {
        // intersection {0}, rx_only {1, 2}
        let cfg = TxRxSubConfig::new([0, 3], [0, 1, 2]).with_optimized_switching(true);
        let (tx, _) = compile_one(&cfg).unwrap();
        assert!(tx.is_closed(RX_MAP[1]));
        assert!(tx.is_closed(RX_MAP[2]));
        assert!(!tx.is_closed(RX_MAP[0]));
    }

    #[test]
    fn test_optimized_tie_takes_rx_only_branch() {
        // intersection {0}, rx_only {1}
        let cfg = TxRxSubConfig::new([0], [0, 1]).with_optimized_switching(true);
        let (tx, _) = compile_one(&cfg).unwrap();
        assert_eq!(tx.bits(), (1 << TX_MAP[0]) | rx_bit(1));
    }

    #[test]
    fn test_optimized_full_overlap() {
        // intersection {2}, rx_only empty: 1 > 0
        let cfg = TxRxSubConfig::new([2], [2]).with_optimized_switching(true);
        let (tx, rx) = compile_one(&cfg).unwrap();
        assert_eq!(tx.bits(), (1 << TX_MAP[2]) | rx_bit(2));
        assert_eq!(rx.bits(), rx_bit(2));
    }

    #[test]
    fn test_duplicate_channels_are_idempotent() {
        let (a, _) = compile_one(&TxRxSubConfig::new([3, 3, 3], [])).unwrap();
        let (b, _) = compile_one(&TxRxSubConfig::new([3], [])).unwrap();
        assert_eq!(a, b);
    }

    fn channel_list() -> impl Strategy<Value = Vec<i32>> {
        proptest::collection::vec(0..=MAX_CH_ID as i32, 0..8)
    }

    fn rx_bits_of(channels: &[i32]) -> u16 {
        channels.iter().fold(0, |m, &c| m | rx_bit(c as usize))
    }

    fn tx_bits_of(channels: &[i32]) -> u16 {
        channels.iter().fold(0, |m, &c| m | (1 << TX_MAP[c as usize]))
    }

    proptest! {
        #[test]
        fn prop_unoptimized_tx_mask_has_only_tx_bits(tx in channel_list(), rx in channel_list()) {
            let (tx_mask, rx_mask) = compile_one(&TxRxSubConfig::new(tx.clone(), rx.clone())).unwrap();
            prop_assert_eq!(tx_mask.bits(), tx_bits_of(&tx));
            prop_assert_eq!(rx_mask.bits(), rx_bits_of(&rx));
        }

        #[test]
        fn prop_optimized_follows_set_sizes(tx in channel_list(), rx in channel_list()) {
            let cfg = TxRxSubConfig::new(tx.clone(), rx.clone()).with_optimized_switching(true);
            let (tx_mask, _) = compile_one(&cfg).unwrap();

            let intersection: Vec<i32> = rx.iter().copied().filter(|c| tx.contains(c)).collect();
            let rx_only: Vec<i32> = rx.iter().copied().filter(|c| !tx.contains(c)).collect();
            let n_inter = intersection.iter().collect::<std::collections::BTreeSet<_>>().len();
            let n_only = rx_only.iter().collect::<std::collections::BTreeSet<_>>().len();

            let expected_extra = if n_inter > n_only {
                rx_bits_of(&intersection)
            } else {
                rx_bits_of(&rx_only)
            };
            prop_assert_eq!(tx_mask.bits(), tx_bits_of(&tx) | expected_extra);
        }

        #[test]
        fn prop_out_of_range_channels_rejected(bad in prop_oneof![i32::MIN..0, 8..i32::MAX], as_rx in any::<bool>()) {
            let cfg = if as_rx {
                TxRxSubConfig::new([0], [bad])
            } else {
                TxRxSubConfig::new([bad], [0])
            };
            let is_invalid_channel = matches!(compile_one(&cfg), Err(ConfigError::InvalidChannel { .. }));
            prop_assert!(is_invalid_channel);
        }
    }
}
