//! Acquisition configuration and register lookup tables
//!
//! [`AcquisitionConfig`] mirrors the JSON document the WULPUS service accepts:
//! an `us_config` block of timing/gain/sampling parameters and an ordered
//! `tx_rx_config` list of channel selections.

use crate::error::ConfigError;
use crate::switching::{self, SwitchMasks, TxRxSubConfig};

/// Supported ADC sampling rates in Hz, index-aligned with [`SAMPLING_FREQ_REG`]
pub const SAMPLING_FREQ_HZ: [u32; 5] = [8_000_000, 4_000_000, 2_000_000, 1_000_000, 500_000];

/// Capture oversampling register values (80 MHz / 10, 20, 40, 80, 160)
pub const SAMPLING_FREQ_REG: [u16; 5] = [0, 1, 2, 3, 4];

/// PGA gain steps in tenths of a dB, index-aligned with [`pga_gain_reg`]
pub const PGA_GAIN_TENTHS_DB: [i16; 47] = [
    -65, -55, -46, -41, -33, -23, -14, -8, 1, 10, 19, 26, 35, 44, 52, 60, 68, 77, 87, 90, 98, 107,
    117, 122, 130, 139, 149, 155, 163, 172, 182, 188, 196, 205, 215, 220, 228, 236, 246, 250, 258,
    267, 277, 281, 289, 298, 308,
];

/// First PGA gain register value; the steps are consecutive from here
const PGA_GAIN_REG_BASE: u8 = 0x11;

/// Register value for PGA gain step `index`, `None` past the end of the table
pub fn pga_gain_reg(index: usize) -> Option<u8> {
    if index >= PGA_GAIN_TENTHS_DB.len() {
        return None;
    }
    u8::try_from(index).ok()?.checked_add(PGA_GAIN_REG_BASE)
}

/// Look up the sampling-rate register for a frequency in Hz
pub fn sampling_freq_register(hz: u32) -> Result<u16, ConfigError> {
    SAMPLING_FREQ_HZ
        .iter()
        .position(|&f| f == hz)
        .map(|i| SAMPLING_FREQ_REG[i])
        .ok_or_else(|| ConfigError::InvalidEnumValue {
            field: "sampling_freq",
            value: hz.to_string(),
        })
}

/// Look up the PGA gain register for a gain in dB
///
/// Gains are matched to one decimal place, the resolution of the table.
pub fn rx_gain_register(db: f32) -> Result<u8, ConfigError> {
    let invalid = || ConfigError::InvalidEnumValue {
        field: "rx_gain",
        value: db.to_string(),
    };
    if !db.is_finite() {
        return Err(invalid());
    }
    let tenths = (db * 10.0).round();
    PGA_GAIN_TENTHS_DB
        .iter()
        .position(|&g| f32::from(g) == tenths)
        .and_then(pga_gain_reg)
        .ok_or_else(invalid)
}

/// Microsecond to device tick conversion factors
///
/// The low-frequency timer (LFXT) counts 65535 ticks per 2 s; the capture
/// timers derive from the 80 MHz HSPLL clock.
pub mod ticks_per_us {
    /// LFXT: 655 ticks = 20 ms, 65535 ticks = 2 s
    pub const DCDC_TURNON: f64 = 65535.0 / 2_000_000.0;
    pub const MEAS_PERIOD: f64 = 65535.0 / 2_000_000.0;
    /// 8 MHz
    pub const START_HVMUXRX: f64 = 8.0;
    /// HSPLL / 16
    pub const START_PPG: f64 = 5.0;
    pub const TURNON_ADC: f64 = 5.0;
    pub const START_PGAINBIAS: f64 = 5.0;
    pub const START_ADCSAMPL: f64 = 5.0;
    /// HSPLL / 256
    pub const RESTART_CAPT: f64 = 5.0 / 16.0;
    /// HSPLL / 64
    pub const CAPT_TIMEOUT: f64 = 5.0 / 4.0;
}

/// Timing, gain and sampling parameters of an acquisition
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct UltrasoundParams {
    /// Number of frames to acquire in one run
    pub num_acqs: u32,
    /// DC-DC converter turn-on time (µs)
    pub dcdc_turnon: f64,
    /// Measurement period (µs)
    pub meas_period: f64,
    /// Transducer frequency (Hz)
    pub trans_freq: u32,
    /// Pulse frequency (Hz)
    pub pulse_freq: u32,
    /// Pulses per excitation
    pub num_pulses: u8,
    /// ADC sampling rate (Hz), one of [`SAMPLING_FREQ_HZ`]
    pub sampling_freq: u32,
    /// Samples per frame
    pub num_samples: u16,
    /// Receive PGA gain (dB), one of the [`PGA_GAIN_TENTHS_DB`] steps
    pub rx_gain: f32,
    /// Number of TX/RX mask slots sent to the probe
    pub num_txrx_configs: u8,
    /// HV-mux RX start delay (µs)
    pub start_hvmuxrx: f64,
    /// Pulse generator start delay (µs)
    pub start_ppg: f64,
    /// ADC turn-on delay (µs)
    pub turnon_adc: f64,
    /// PGA bias start delay (µs)
    pub start_pgainbias: f64,
    /// ADC sampling start delay (µs)
    pub start_adcsampl: f64,
    /// Capture restart delay (µs)
    pub restart_capt: f64,
    /// Capture timeout (µs)
    pub capt_timeout: f64,
}

impl Default for UltrasoundParams {
    fn default() -> Self {
        Self {
            num_acqs: 400,
            dcdc_turnon: 100.0,
            meas_period: 321_965.0,
            trans_freq: 2_250_000,
            pulse_freq: 2_250_000,
            num_pulses: 1,
            sampling_freq: 8_000_000,
            num_samples: 400,
            rx_gain: 3.5,
            num_txrx_configs: 1,
            start_hvmuxrx: 500.0,
            start_ppg: 500.0,
            turnon_adc: 5.0,
            start_pgainbias: 5.0,
            start_adcsampl: 503.0,
            restart_capt: 3000.0,
            capt_timeout: 3000.0,
        }
    }
}

/// Full acquisition configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AcquisitionConfig {
    #[cfg_attr(feature = "serde", serde(rename = "us_config", default))]
    pub us: UltrasoundParams,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tx_rx_config: Vec<TxRxSubConfig>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            us: UltrasoundParams::default(),
            tx_rx_config: vec![TxRxSubConfig::new([0], [0]).with_optimized_switching(true)],
        }
    }
}

impl AcquisitionConfig {
    /// Create a configuration whose mask count matches `tx_rx_config`
    pub fn new(us: UltrasoundParams, tx_rx_config: Vec<TxRxSubConfig>) -> Self {
        let mut us = us;
        us.num_txrx_configs = tx_rx_config.len().min(u8::MAX as usize) as u8;
        Self { us, tx_rx_config }
    }

    /// Compile the channel selections to switch masks
    pub fn switch_masks(&self) -> Result<SwitchMasks, ConfigError> {
        switching::compile(&self.tx_rx_config)
    }

    /// Check everything the packet encoder would reject, without encoding
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::packet::encode_config(self).map(|_| ())
    }

    /// Total number of samples a full run produces
    pub fn total_samples(&self) -> usize {
        self.us.num_acqs as usize * self.us.num_samples as usize
    }
}
