//! Device transport abstraction
//!
//! A transport is a bidirectional byte link to one probe, or a stand-in for
//! one. The session only talks to this trait; the serial implementation lives
//! in [`crate::serial`] and the mock/replay one in `wulpus-sim`.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wulpus_protocol::{CommandPacket, Frame};

use crate::error::TransportError;
use crate::state::LinkStatus;

/// A device that can be opened by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Identifier passed to [`DeviceTransport::open`] (port name for serial)
    pub id: String,
    pub description: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            vid: None,
            pid: None,
        }
    }
}

/// Run parameters a transport imposes on the next acquisition
///
/// Replay sources know how many frames they hold and how long each is, which
/// overrides whatever the stored configuration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOverride {
    pub num_acqs: u32,
    pub num_samples: u16,
}

/// Bidirectional link to a probe
#[async_trait]
pub trait DeviceTransport: Send {
    /// Enumerate openable devices
    fn list_available(&self) -> Result<Vec<DeviceDescriptor>, TransportError>;

    /// Open the device, replacing any current link. `false` if unavailable.
    async fn open(&mut self, device: &str) -> bool;

    async fn close(&mut self);

    /// Write a command packet. `false` if the link is not open or the write failed.
    async fn send(&mut self, packet: &CommandPacket) -> bool;

    /// Wait briefly for the next frame; `None` when nothing arrived in time
    async fn receive(&mut self) -> Option<Frame>;

    fn link_status(&self) -> LinkStatus;

    /// Whether this transport produces synthetic or recorded data
    fn is_simulated(&self) -> bool {
        false
    }

    /// Parameters that must override the configuration for the next run
    fn run_override(&self) -> Option<RunOverride> {
        None
    }

    /// Called by the session once a run has ended
    fn run_finished(&mut self) {}

    /// Select a recording to replay, or `None` to go back to live/synthetic data
    fn set_replay_source(&mut self, _path: Option<&Path>) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("replay"))
    }
}
