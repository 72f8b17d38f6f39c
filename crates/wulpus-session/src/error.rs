//! Error types for the session and its transports

use std::path::PathBuf;

use thiserror::Error;
use wulpus_protocol::ConfigError;

/// Errors raised by a [`DeviceTransport`](crate::DeviceTransport) outside the
/// boolean open/send outcomes
#[derive(Debug, Error)]
pub enum TransportError {
    /// Replay source does not exist
    #[error("replay file not found: {}", .0.display())]
    ReplayFileNotFound(PathBuf),

    /// Replay source exists but cannot be used
    #[error("invalid replay file {}: {reason}", path.display())]
    InvalidReplay { path: PathBuf, reason: String },

    /// Capability not offered by this transport
    #[error("{0} is not supported by this transport")]
    Unsupported(&'static str),

    /// The transport is in use by a running acquisition
    #[error("transport is busy")]
    Busy,

    /// Device enumeration failed
    #[error("failed to enumerate devices: {0}")]
    EnumerationFailed(String),
}

/// Errors surfaced synchronously by [`AcquisitionSession`](crate::AcquisitionSession)
#[derive(Debug, Error)]
pub enum SessionError {
    /// `connect` without a device id and none remembered
    #[error("no device specified")]
    NoDeviceSpecified,

    /// `start` before `set_config`
    #[error("no configuration set")]
    NoConfigurationSet,

    /// Run buffers for the configured size cannot be allocated
    #[error("cannot allocate buffers for {frames} frames of {samples_per_frame} samples")]
    BufferAllocation {
        frames: usize,
        samples_per_frame: usize,
    },

    /// Configuration rejected by the compiler or encoder
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Transport capability error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
