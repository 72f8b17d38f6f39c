//! WULPUS Protocol Library
//!
//! This crate turns a high-level acquisition configuration into the binary
//! command packets understood by the WULPUS wearable ultrasound probe, and
//! decodes the acquisition frames it streams back.
//!
//! # Architecture
//!
//! - [`channels`]: static transducer channel → multiplexer switch tables
//! - [`switching`]: TX/RX channel selections → 16-bit switch masks, including
//!   the optimized-switching heuristic
//! - [`config`]: the acquisition configuration and its register lookup tables
//! - [`packet`]: fixed 68-byte configuration and restart packets
//! - [`frame`]: acquisition frames and a streaming decoder for the link
//!
//! Everything in this crate is pure and synchronous; I/O lives in
//! `wulpus-session`.
//!
//! # Example
//!
//! ```rust
//! use wulpus_protocol::{encode_config, AcquisitionConfig, TxRxSubConfig, UltrasoundParams};
//!
//! let config = AcquisitionConfig::new(
//!     UltrasoundParams::default(),
//!     vec![TxRxSubConfig::new([0], [1])],
//! );
//! let packet = encode_config(&config).unwrap();
//! assert_eq!(packet.as_bytes().len(), 68);
//! assert_eq!(packet.as_bytes()[0], 250);
//! ```

pub mod channels;
pub mod config;
pub mod error;
pub mod frame;
pub mod packet;
pub mod switching;

pub use channels::{ChannelRole, MAX_CH_ID, RX_MAP, TX_MAP};
pub use config::{AcquisitionConfig, UltrasoundParams};
pub use error::ConfigError;
pub use frame::{Frame, FrameDecoder};
pub use packet::{
    encode_config, encode_restart, CommandPacket, ConfigPacketHeader, PacketKind, PACKET_LEN,
};
pub use switching::{compile, SwitchMask, SwitchMasks, TxRxSubConfig, TX_RX_MAX_NUM_OF_CONFIGS};
