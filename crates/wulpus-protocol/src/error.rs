//! Error types for configuration compilation and packet encoding

use thiserror::Error;

use crate::channels::ChannelRole;

/// Errors raised while validating a configuration or encoding a packet
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Channel index outside `[0, MAX_CH_ID]`
    #[error("invalid {role} channel {channel}: must be within 0..={max}")]
    InvalidChannel {
        role: ChannelRole,
        channel: i32,
        max: u8,
    },

    /// More TX/RX sub-configurations than the device supports
    #[error("too many TX/RX configurations: {count} (maximum {max})")]
    TooManyConfigs { count: usize, max: usize },

    /// Value with no register mapping (sampling frequency, gain)
    #[error("invalid value for {field}: {value}")]
    InvalidEnumValue { field: &'static str, value: String },

    /// Encoded content does not fit the fixed packet length
    #[error("packet overflow: {len} bytes exceed the {max}-byte packet")]
    PacketOverflow { len: usize, max: usize },

    /// Value does not fit the wire width of its field
    #[error("{field} out of range: {value}")]
    FieldOutOfRange { field: &'static str, value: f64 },

    /// `num_txrx_configs` asks for more slots than sub-configurations exist
    #[error("num_txrx_configs is {requested} but only {defined} TX/RX configurations are defined")]
    TxRxCountMismatch { requested: usize, defined: usize },
}
