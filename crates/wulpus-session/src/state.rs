//! Session and link status tracking

use std::fmt;

use serde::{Deserialize, Serialize};
use wulpus_protocol::AcquisitionConfig;

/// Lifecycle state of an acquisition session
///
/// `Ready` and `NotConnected` are rest states; `Connecting` and `Running` are
/// active. `Error` is left by the next successful `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    #[default]
    NotConnected,
    Connecting,
    Ready,
    Running,
    Error,
}

impl SessionStatus {
    /// Numeric code used by the WULPUS web clients
    pub fn code(&self) -> u8 {
        match self {
            Self::NotConnected => 0,
            Self::Connecting => 1,
            Self::Ready => 2,
            Self::Running => 3,
            Self::Error => 9,
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotConnected => "Not connected",
            Self::Connecting => "Connecting",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport-level link state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkStatus {
    #[default]
    Closed,
    Open {
        device: String,
    },
    /// The link failed while in use
    Faulted {
        reason: String,
    },
}

impl LinkStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, LinkStatus::Open { .. })
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, LinkStatus::Faulted { .. })
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Closed => f.write_str("closed"),
            LinkStatus::Open { device } => write!(f, "open ({})", device),
            LinkStatus::Faulted { reason } => write!(f, "faulted: {}", reason),
        }
    }
}

/// Point-in-time view of a session, as returned by `get_status` and
/// published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub link: LinkStatus,
    /// Whether the transport is a mock/replay source
    pub simulated: bool,
    pub config: Option<AcquisitionConfig>,
    pub frames_written: usize,
    pub total_expected: usize,
}

impl StatusSnapshot {
    /// Fraction of the run completed, 0 when nothing is expected
    pub fn progress(&self) -> f32 {
        if self.total_expected == 0 {
            0.0
        } else {
            (self.frames_written as f32 / self.total_expected as f32).min(1.0)
        }
    }
}
