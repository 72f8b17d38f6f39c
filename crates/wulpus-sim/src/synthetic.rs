//! Synthetic frame generator
//!
//! Produces frames of uniformly random samples in `1..=1000` with an
//! increasing sequence number, cycling the sub-config id through the
//! configured TX/RX slots.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use wulpus_protocol::{ConfigPacketHeader, Frame};

/// Samples per frame before a configuration has been received
pub const DEFAULT_NUM_SAMPLES: usize = 400;

/// Smallest and largest synthetic sample value
pub const SAMPLE_RANGE: (i16, i16) = (1, 1000);

#[derive(Debug)]
pub struct SyntheticSource {
    rng: StdRng,
    num_samples: usize,
    num_configs: u8,
    next_seq: u16,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible source for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            num_samples: DEFAULT_NUM_SAMPLES,
            num_configs: 1,
            next_seq: 0,
        }
    }

    /// Adopt the frame shape of a configuration packet and restart numbering
    pub fn configure(&mut self, header: &ConfigPacketHeader) {
        self.num_samples = header.num_samples as usize;
        self.num_configs = header.num_txrx_configs.max(1);
        self.next_seq = 0;
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn next_frame(&mut self) -> Frame {
        let (lo, hi) = SAMPLE_RANGE;
        let samples = (0..self.num_samples)
            .map(|_| self.rng.gen_range(lo..=hi))
            .collect();

        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let sub_config_id = (seq % u16::from(self.num_configs)) as u8;

        Frame::new(samples, seq, sub_config_id)
    }
}
