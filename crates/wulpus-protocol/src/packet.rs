//! Fixed-length command packets sent to the probe
//!
//! Every packet is [`PACKET_LEN`] bytes. Multi-byte fields are little-endian.
//!
//! # Configuration packet layout
//! ```text
//! off  width  field
//!   0    1    start byte (250)
//!   1    2    dcdc_turnon ticks
//!   3    2    meas_period ticks
//!   5    4    trans_freq (Hz)
//!   9    4    pulse_freq (Hz)
//!  13    1    num_pulses
//!  14    2    sampling_freq register
//!  16    2    num_samples * 2
//!  18    1    rx_gain register
//!  19    1    num_txrx_configs (n)
//!  20   4n    (tx_mask, rx_mask) per configuration
//! 20+4n 14    start_hvmuxrx, start_ppg, turnon_adc, start_pgainbias,
//!             start_adcsampl, restart_capt, capt_timeout ticks
//!  ...        zero padding
//! ```
//!
//! A restart packet is the start byte 251 followed by zeros.

use std::fmt;

use tracing::debug;

use crate::config::{rx_gain_register, sampling_freq_register, ticks_per_us, AcquisitionConfig};
use crate::error::ConfigError;

/// Length of every command packet
pub const PACKET_LEN: usize = 68;

/// Start byte of a configuration packet
pub const START_BYTE_CONFIG: u8 = 250;

/// Start byte of a restart packet
pub const START_BYTE_RESTART: u8 = 251;

/// Offset of the first switch mask pair
pub const SWITCH_MASKS_OFFSET: usize = 20;

/// Kind of packet, taken from its start byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Config,
    Restart,
    Unknown(u8),
}

/// An encoded command packet
#[derive(Clone, PartialEq, Eq)]
pub struct CommandPacket([u8; PACKET_LEN]);

impl CommandPacket {
    /// Packet bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn kind(&self) -> PacketKind {
        match self.0[0] {
            START_BYTE_CONFIG => PacketKind::Config,
            START_BYTE_RESTART => PacketKind::Restart,
            other => PacketKind::Unknown(other),
        }
    }

    /// Hex dump for logs
    pub fn to_hex(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl AsRef<[u8]> for CommandPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for CommandPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandPacket")
            .field(&self.kind())
            .field(&self.to_hex())
            .finish()
    }
}

/// Appends little-endian fields and pads to the packet length
struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    fn new(start_byte: u8) -> Self {
        let mut buf = Vec::with_capacity(PACKET_LEN);
        buf.push(start_byte);
        Self { buf }
    }

    fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    fn u16(&mut self, value: u16) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn finish(self) -> Result<CommandPacket, ConfigError> {
        if self.buf.len() > PACKET_LEN {
            return Err(ConfigError::PacketOverflow {
                len: self.buf.len(),
                max: PACKET_LEN,
            });
        }
        let mut bytes = [0u8; PACKET_LEN];
        bytes[..self.buf.len()].copy_from_slice(&self.buf);
        Ok(CommandPacket(bytes))
    }
}

/// Convert a microsecond value to 16-bit device ticks, truncating toward zero
fn ticks(field: &'static str, us: f64, scale: f64) -> Result<u16, ConfigError> {
    let value = (us * scale).trunc();
    if !value.is_finite() || value < 0.0 || value > u16::MAX as f64 {
        return Err(ConfigError::FieldOutOfRange { field, value: us });
    }
    Ok(value as u16)
}

/// Encode the restart packet
pub fn encode_restart() -> CommandPacket {
    let mut bytes = [0u8; PACKET_LEN];
    bytes[0] = START_BYTE_RESTART;
    CommandPacket(bytes)
}

/// Encode a full configuration packet
pub fn encode_config(config: &AcquisitionConfig) -> Result<CommandPacket, ConfigError> {
    let us = &config.us;
    let masks = config.switch_masks()?;

    let slots = us.num_txrx_configs as usize;
    if slots > masks.len() {
        return Err(ConfigError::TxRxCountMismatch {
            requested: slots,
            defined: masks.len(),
        });
    }

    let num_samples_x2 =
        us.num_samples
            .checked_mul(2)
            .ok_or(ConfigError::FieldOutOfRange {
                field: "num_samples",
                value: us.num_samples as f64,
            })?;

    let mut w = PacketWriter::new(START_BYTE_CONFIG);
    w.u16(ticks("dcdc_turnon", us.dcdc_turnon, ticks_per_us::DCDC_TURNON)?)
        .u16(ticks("meas_period", us.meas_period, ticks_per_us::MEAS_PERIOD)?)
        .u32(us.trans_freq)
        .u32(us.pulse_freq)
        .u8(us.num_pulses)
        .u16(sampling_freq_register(us.sampling_freq)?)
        .u16(num_samples_x2)
        .u8(rx_gain_register(us.rx_gain)?)
        .u8(us.num_txrx_configs);

    for (tx, rx) in masks.pairs().take(slots) {
        w.u16(tx.bits()).u16(rx.bits());
    }

    w.u16(ticks("start_hvmuxrx", us.start_hvmuxrx, ticks_per_us::START_HVMUXRX)?)
        .u16(ticks("start_ppg", us.start_ppg, ticks_per_us::START_PPG)?)
        .u16(ticks("turnon_adc", us.turnon_adc, ticks_per_us::TURNON_ADC)?)
        .u16(ticks("start_pgainbias", us.start_pgainbias, ticks_per_us::START_PGAINBIAS)?)
        .u16(ticks("start_adcsampl", us.start_adcsampl, ticks_per_us::START_ADCSAMPL)?)
        .u16(ticks("restart_capt", us.restart_capt, ticks_per_us::RESTART_CAPT)?)
        .u16(ticks("capt_timeout", us.capt_timeout, ticks_per_us::CAPT_TIMEOUT)?);

    debug!("Encoded config packet: {} content bytes", w.buf.len());
    w.finish()
}

/// Fields read back from an encoded configuration packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPacketHeader {
    pub dcdc_turnon_ticks: u16,
    pub meas_period_ticks: u16,
    pub trans_freq: u32,
    pub pulse_freq: u32,
    pub num_pulses: u8,
    pub sampling_freq_reg: u16,
    pub num_samples: u16,
    pub rx_gain_reg: u8,
    pub num_txrx_configs: u8,
    /// `(tx, rx)` mask bits per slot
    pub switch_masks: Vec<(u16, u16)>,
}

impl ConfigPacketHeader {
    /// Parse a configuration packet; `None` for restart or malformed packets
    pub fn parse(packet: &CommandPacket) -> Option<Self> {
        let b = packet.as_bytes();
        if packet.kind() != PacketKind::Config {
            return None;
        }
        let u16_at = |off: usize| u16::from_le_bytes([b[off], b[off + 1]]);
        let u32_at = |off: usize| u32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]]);

        let num_txrx_configs = b[19];
        let masks_end = SWITCH_MASKS_OFFSET + 4 * num_txrx_configs as usize;
        if masks_end > PACKET_LEN {
            return None;
        }
        let switch_masks = (SWITCH_MASKS_OFFSET..masks_end)
            .step_by(4)
            .map(|off| (u16_at(off), u16_at(off + 2)))
            .collect();

        Some(Self {
            dcdc_turnon_ticks: u16_at(1),
            meas_period_ticks: u16_at(3),
            trans_freq: u32_at(5),
            pulse_freq: u32_at(9),
            num_pulses: b[13],
            sampling_freq_reg: u16_at(14),
            num_samples: u16_at(16) / 2,
            rx_gain_reg: b[18],
            num_txrx_configs,
            switch_masks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{RX_MAP, TX_MAP};
    use crate::config::UltrasoundParams;
    use crate::switching::TxRxSubConfig;

    fn sample_config() -> AcquisitionConfig {
        let us = UltrasoundParams {
            trans_freq: 2_000_000,
            pulse_freq: 2_000_000,
            num_pulses: 8,
            ..Default::default()
        };
        AcquisitionConfig::new(us, vec![TxRxSubConfig::new([0], [1])])
    }

    #[test]
    fn test_restart_packet() {
        let packet = encode_restart();
        assert_eq!(packet.as_bytes().len(), PACKET_LEN);
        assert_eq!(packet.as_bytes()[0], 251);
        assert!(packet.as_bytes()[1..].iter().all(|&b| b == 0));
        assert_eq!(packet.kind(), PacketKind::Restart);
    }

    #[test]
    fn test_config_packet_field_offsets() {
        let packet = encode_config(&sample_config()).unwrap();
        let b = packet.as_bytes();

        assert_eq!(b.len(), PACKET_LEN);
        assert_eq!(b[0], START_BYTE_CONFIG);
        // dcdc_turnon 100 us -> 3 ticks
        assert_eq!(u16::from_le_bytes([b[1], b[2]]), 3);
        // meas_period 321965 us -> 10549.98 ticks
        assert_eq!(u16::from_le_bytes([b[3], b[4]]), 10549);
        assert_eq!(u32::from_le_bytes([b[5], b[6], b[7], b[8]]), 2_000_000);
        assert_eq!(u32::from_le_bytes([b[9], b[10], b[11], b[12]]), 2_000_000);
        assert_eq!(b[13], 8);
        assert_eq!(u16::from_le_bytes([b[14], b[15]]), 0);
        assert_eq!(u16::from_le_bytes([b[16], b[17]]), 800);
        assert_eq!(b[18], 0x11 + 12);
        assert_eq!(b[19], 1);

        let tx_mask = u16::from_le_bytes([b[20], b[21]]);
        let rx_mask = u16::from_le_bytes([b[22], b[23]]);
        assert_eq!(tx_mask, 1 << TX_MAP[0]);
        assert_eq!(rx_mask, 1 << RX_MAP[1]);

        // start_hvmuxrx 500 us * 8
        assert_eq!(u16::from_le_bytes([b[24], b[25]]), 4000);
        // start_ppg 500 us * 5
        assert_eq!(u16::from_le_bytes([b[26], b[27]]), 2500);
        assert_eq!(u16::from_le_bytes([b[28], b[29]]), 25);
        assert_eq!(u16::from_le_bytes([b[30], b[31]]), 25);
        assert_eq!(u16::from_le_bytes([b[32], b[33]]), 2515);
        // restart_capt 3000 us * 5/16
        assert_eq!(u16::from_le_bytes([b[34], b[35]]), 937);
        // capt_timeout 3000 us * 5/4
        assert_eq!(u16::from_le_bytes([b[36], b[37]]), 3750);

        assert!(b[38..].iter().all(|&x| x == 0));
    }

    #[test]
    fn test_header_read_back() {
        let packet = encode_config(&sample_config()).unwrap();
        let header = ConfigPacketHeader::parse(&packet).unwrap();
        assert_eq!(header.num_samples, 400);
        assert_eq!(header.num_pulses, 8);
        assert_eq!(header.switch_masks, vec![(1 << TX_MAP[0], 1 << RX_MAP[1])]);
        assert!(ConfigPacketHeader::parse(&encode_restart()).is_none());
    }

    #[test]
    fn test_only_requested_slots_are_written() {
        let mut cfg = AcquisitionConfig::new(
            UltrasoundParams::default(),
            vec![TxRxSubConfig::new([0], [0]), TxRxSubConfig::new([1], [1])],
        );
        cfg.us.num_txrx_configs = 1;
        let header = ConfigPacketHeader::parse(&encode_config(&cfg).unwrap()).unwrap();
        assert_eq!(header.switch_masks.len(), 1);
    }

    #[test]
    fn test_eight_configs_fit() {
        let cfg = AcquisitionConfig::new(
            UltrasoundParams::default(),
            vec![TxRxSubConfig::new([0], [0]); 8],
        );
        let packet = encode_config(&cfg).unwrap();
        let b = packet.as_bytes();
        assert_eq!(b.len(), PACKET_LEN);
        // capt_timeout is the last field, at 32 + 4 * 8
        assert_eq!(u16::from_le_bytes([b[64], b[65]]), 3750);
        assert_eq!(&b[66..], &[0, 0]);
    }

    #[test]
    fn test_nine_configs_overflow() {
        let cfg = AcquisitionConfig::new(
            UltrasoundParams::default(),
            vec![TxRxSubConfig::new([0], [0]); 9],
        );
        assert_eq!(
            encode_config(&cfg).unwrap_err(),
            ConfigError::PacketOverflow { len: 70, max: PACKET_LEN }
        );
    }

    #[test]
    fn test_seventeen_configs_rejected_before_encoding() {
        let cfg = AcquisitionConfig::new(
            UltrasoundParams::default(),
            vec![TxRxSubConfig::new([0], [0]); 17],
        );
        assert!(matches!(
            encode_config(&cfg),
            Err(ConfigError::TooManyConfigs { count: 17, .. })
        ));
    }

    #[test]
    fn test_invalid_enum_values() {
        let mut cfg = sample_config();
        cfg.us.sampling_freq = 1234;
        assert!(matches!(
            encode_config(&cfg),
            Err(ConfigError::InvalidEnumValue { field: "sampling_freq", .. })
        ));

        let mut cfg = sample_config();
        cfg.us.rx_gain = 2.0;
        assert!(matches!(
            encode_config(&cfg),
            Err(ConfigError::InvalidEnumValue { field: "rx_gain", .. })
        ));
    }

    #[test]
    fn test_slot_count_mismatch() {
        let mut cfg = sample_config();
        cfg.us.num_txrx_configs = 3;
        assert_eq!(
            encode_config(&cfg).unwrap_err(),
            ConfigError::TxRxCountMismatch { requested: 3, defined: 1 }
        );
    }

    #[test]
    fn test_timing_out_of_range() {
        let mut cfg = sample_config();
        cfg.us.start_hvmuxrx = 10_000.0; // 80000 ticks
        assert!(matches!(
            encode_config(&cfg),
            Err(ConfigError::FieldOutOfRange { field: "start_hvmuxrx", .. })
        ));

        let mut cfg = sample_config();
        cfg.us.turnon_adc = -1.0;
        assert!(matches!(
            encode_config(&cfg),
            Err(ConfigError::FieldOutOfRange { field: "turnon_adc", .. })
        ));
    }

    #[test]
    fn test_ticks_truncate_toward_zero() {
        assert_eq!(ticks("x", 0.99, 1.0).unwrap(), 0);
        assert_eq!(ticks("x", 3000.0, 5.0 / 16.0).unwrap(), 937);
    }
}
