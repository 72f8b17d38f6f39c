//! Acquisition frames and the streaming decoder for the device link
//!
//! # Wire format
//! ```text
//! [AA 55 AA 55] [id] [seq lo] [seq hi] [s0 lo] [s0 hi] ... [sN-1 lo] [sN-1 hi]
//! ```
//!
//! - 4-byte sync marker
//! - TX/RX configuration id that produced the frame
//! - 16-bit little-endian acquisition sequence number
//! - `num_samples` signed 16-bit little-endian samples
//!
//! The sample count is not on the wire; the decoder takes it from the
//! configuration packet that started the run.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Sync marker preceding every frame
pub const FRAME_SYNC: [u8; 4] = [0xAA, 0x55, 0xAA, 0x55];

/// Bytes between the sync marker and the first sample
pub const FRAME_HEADER_LEN: usize = FRAME_SYNC.len() + 3;

/// One acquisition result
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Raw ADC samples
    pub samples: Vec<i16>,
    /// Acquisition sequence number reported by the probe
    pub sequence_number: u16,
    /// TX/RX configuration that produced this frame
    pub sub_config_id: u8,
    /// Receive time, microseconds since the Unix epoch
    pub timestamp_us: u64,
}

impl Frame {
    /// Create a frame stamped with the current time
    pub fn new(samples: Vec<i16>, sequence_number: u16, sub_config_id: u8) -> Self {
        Self {
            samples,
            sequence_number,
            sub_config_id,
            timestamp_us: now_us(),
        }
    }

    /// Encode to the wire format
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.samples.len() * 2);
        out.extend_from_slice(&FRAME_SYNC);
        out.push(self.sub_config_id);
        out.extend_from_slice(&self.sequence_number.to_le_bytes());
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }
}

/// Current time in microseconds since the Unix epoch
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Streaming frame decoder that handles partial reads
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    num_samples: usize,
}

impl FrameDecoder {
    /// Create a decoder for frames of `num_samples` samples
    pub fn new(num_samples: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(FRAME_HEADER_LEN + num_samples * 2),
            num_samples,
        }
    }

    /// Samples per frame this decoder expects
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Change the frame size and drop any partial frame
    pub fn set_num_samples(&mut self, num_samples: usize) {
        self.num_samples = num_samples;
        self.buffer.clear();
    }

    fn frame_len(&self) -> usize {
        FRAME_HEADER_LEN + self.num_samples * 2
    }

    /// Push raw bytes from the link
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete frame, if any
    pub fn next_frame(&mut self) -> Option<Frame> {
        let start = self
            .buffer
            .windows(FRAME_SYNC.len())
            .position(|w| w == FRAME_SYNC);

        let Some(start) = start else {
            // Keep a possible partial sync marker at the tail
            let keep = (FRAME_SYNC.len() - 1).min(self.buffer.len());
            let discard = self.buffer.len() - keep;
            if discard > 0 {
                debug!("Discarding {} bytes without frame sync", discard);
                self.buffer.drain(..discard);
            }
            return None;
        };

        if start > 0 {
            debug!("Discarding {} bytes before frame sync", start);
            self.buffer.drain(..start);
        }

        let len = self.frame_len();
        if self.buffer.len() < len {
            return None;
        }

        let frame_bytes: Vec<u8> = self.buffer.drain(..len).collect();
        let sub_config_id = frame_bytes[4];
        let sequence_number = u16::from_le_bytes([frame_bytes[5], frame_bytes[6]]);
        let samples = frame_bytes[FRAME_HEADER_LEN..]
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();

        Some(Frame::new(samples, sequence_number, sub_config_id))
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_single_frame() {
        let frame = Frame::new(vec![1, -2, 300, i16::MIN], 42, 3);
        let mut decoder = FrameDecoder::new(4);
        decoder.push_bytes(&frame.encode());

        let decoded = decoder.next_frame().unwrap();
        assert_eq!(decoded.samples, frame.samples);
        assert_eq!(decoded.sequence_number, 42);
        assert_eq!(decoded.sub_config_id, 3);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_partial_reads() {
        let bytes = Frame::new(vec![7; 16], 1, 0).encode();
        let mut decoder = FrameDecoder::new(16);

        decoder.push_bytes(&bytes[..10]);
        assert!(decoder.next_frame().is_none());
        decoder.push_bytes(&bytes[10..]);
        assert_eq!(decoder.next_frame().unwrap().samples, vec![7; 16]);
    }

    #[test]
    fn test_skips_garbage_before_sync() {
        let mut bytes = vec![0x00, 0x13, 0xAA];
        bytes.extend(Frame::new(vec![5, 6], 9, 1).encode());
        let mut decoder = FrameDecoder::new(2);
        decoder.push_bytes(&bytes);

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.sequence_number, 9);
        assert_eq!(frame.samples, vec![5, 6]);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut decoder = FrameDecoder::new(3);
        for seq in 0..3u16 {
            decoder.push_bytes(&Frame::new(vec![seq as i16; 3], seq, 0).encode());
        }
        let seqs: Vec<u16> = std::iter::from_fn(|| decoder.next_frame())
            .map(|f| f.sequence_number)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_noise_is_bounded() {
        let mut decoder = FrameDecoder::new(2);
        decoder.push_bytes(&[0x01; 100]);
        assert!(decoder.next_frame().is_none());
        decoder.push_bytes(&Frame::new(vec![1, 2], 5, 0).encode());
        assert_eq!(decoder.next_frame().unwrap().sequence_number, 5);
    }
}
