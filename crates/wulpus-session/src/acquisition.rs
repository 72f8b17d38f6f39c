//! Pre-sized acquisition buffers and the finished acquisition

use serde::{Deserialize, Serialize};
use tracing::warn;
use wulpus_protocol::{AcquisitionConfig, Frame};

use crate::error::SessionError;

/// Empty vector with room for exactly `len` items, `None` if that cannot be allocated
fn reserved<T>(len: usize) -> Option<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    Some(v)
}

/// Buffers for one run, with capacity for the configured number of frames
/// reserved up front
#[derive(Debug)]
pub(crate) struct AcquisitionBuffers {
    num_samples: usize,
    capacity: usize,
    samples: Vec<i16>,
    sequence_numbers: Vec<u16>,
    sub_config_ids: Vec<u8>,
    timestamps_us: Vec<u64>,
}

impl AcquisitionBuffers {
    /// Reserve room for `num_acqs` frames of `num_samples` samples
    ///
    /// Fails instead of aborting when the size overflows or the memory is
    /// not available.
    pub(crate) fn try_new(num_acqs: usize, num_samples: usize) -> Result<Self, SessionError> {
        let too_large = || SessionError::BufferAllocation {
            frames: num_acqs,
            samples_per_frame: num_samples,
        };
        let total = num_acqs.checked_mul(num_samples).ok_or_else(too_large)?;

        Ok(Self {
            num_samples,
            capacity: num_acqs,
            samples: reserved(total).ok_or_else(too_large)?,
            sequence_numbers: reserved(num_acqs).ok_or_else(too_large)?,
            sub_config_ids: reserved(num_acqs).ok_or_else(too_large)?,
            timestamps_us: reserved(num_acqs).ok_or_else(too_large)?,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.sequence_numbers.len()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Append a frame. `false` if the buffers are full.
    ///
    /// Frames with the wrong sample count are truncated or zero-padded.
    pub(crate) fn push(&mut self, frame: &Frame) -> bool {
        if self.is_full() {
            return false;
        }
        if frame.samples.len() != self.num_samples {
            warn!(
                "Frame {} has {} samples, expected {}",
                frame.sequence_number,
                frame.samples.len(),
                self.num_samples
            );
        }

        let n = frame.samples.len().min(self.num_samples);
        self.samples.extend_from_slice(&frame.samples[..n]);
        self.samples.extend(std::iter::repeat(0).take(self.num_samples - n));

        self.sequence_numbers.push(frame.sequence_number);
        self.sub_config_ids.push(frame.sub_config_id);
        self.timestamps_us.push(frame.timestamp_us);
        true
    }

    /// Hand over the frames written so far
    pub(crate) fn finish(self, config: AcquisitionConfig) -> Acquisition {
        Acquisition {
            config,
            num_samples: self.num_samples,
            samples: self.samples,
            sequence_numbers: self.sequence_numbers,
            sub_config_ids: self.sub_config_ids,
            timestamps_us: self.timestamps_us,
        }
    }
}

/// Result of a completed or stopped run
///
/// Samples are stored row-major, one row of `num_samples` per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    pub config: AcquisitionConfig,
    pub num_samples: usize,
    pub samples: Vec<i16>,
    pub sequence_numbers: Vec<u16>,
    pub sub_config_ids: Vec<u8>,
    pub timestamps_us: Vec<u64>,
}

impl Acquisition {
    /// Number of frames
    pub fn len(&self) -> usize {
        self.sequence_numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence_numbers.is_empty()
    }

    /// Samples of frame `index`
    pub fn samples_of(&self, index: usize) -> Option<&[i16]> {
        let start = index.checked_mul(self.num_samples)?;
        self.samples.get(start..start + self.num_samples)
    }

    /// Rebuild frame `index`
    pub fn frame(&self, index: usize) -> Option<Frame> {
        Some(Frame {
            samples: self.samples_of(index)?.to_vec(),
            sequence_number: *self.sequence_numbers.get(index)?,
            sub_config_id: *self.sub_config_ids.get(index)?,
            timestamp_us: *self.timestamps_us.get(index)?,
        })
    }

    pub fn frames(&self) -> impl Iterator<Item = Frame> + '_ {
        (0..self.len()).filter_map(|i| self.frame(i))
    }
}
