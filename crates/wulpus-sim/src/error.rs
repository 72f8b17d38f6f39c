//! Simulation error types

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed recording: {0}")]
    Json(#[from] serde_json::Error),

    #[error("recording {} contains no frames", .0.display())]
    EmptyRecording(PathBuf),

    /// A frame's length disagrees with the recording's sample count
    #[error("frame {index} has {actual} samples, expected {expected}")]
    FrameLength {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("recording has {0} samples per frame, more than a run supports")]
    TooManySamples(usize),
}
