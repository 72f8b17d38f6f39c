//! Mock device transport
//!
//! Stands in for a WULPUS dongle. With no replay source set it streams
//! synthetic frames; with one set it yields the recorded frames at a fixed
//! pace, then drops the replay source once the run ends.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};
use wulpus_protocol::{CommandPacket, ConfigPacketHeader, Frame, PacketKind};
use wulpus_session::{
    DeviceDescriptor, DeviceTransport, LinkStatus, RunOverride, SessionSettings, TransportError,
};

use crate::recording::Recording;
use crate::synthetic::SyntheticSource;

/// Id of the single device the mock lists
pub const MOCK_DEVICE_ID: &str = "wulpus-mock";

struct Replay {
    path: PathBuf,
    recording: Recording,
    index: usize,
    /// Created on the first receive so it ticks relative to the run
    pacing: Option<Interval>,
}

impl Replay {
    fn rewind(&mut self) {
        self.index = 0;
        self.pacing = None;
    }
}

pub struct MockTransport {
    link: LinkStatus,
    synthetic: SyntheticSource,
    replay: Option<Replay>,
    replay_interval: Duration,
}

impl MockTransport {
    pub fn new(settings: &SessionSettings) -> Self {
        Self::with_source(SyntheticSource::new(), settings)
    }

    pub fn with_source(synthetic: SyntheticSource, settings: &SessionSettings) -> Self {
        Self {
            link: LinkStatus::Closed,
            synthetic,
            replay: None,
            replay_interval: settings.replay_interval(),
        }
    }

    /// Path of the current replay source
    pub fn replay_path(&self) -> Option<&Path> {
        self.replay.as_ref().map(|r| r.path.as_path())
    }

    async fn next_replayed(replay: &mut Replay, period: Duration) -> Option<Frame> {
        let recorded = replay.recording.frames.get(replay.index)?;

        let pacing = replay.pacing.get_or_insert_with(|| {
            let mut pacing = interval(period);
            pacing.set_missed_tick_behavior(MissedTickBehavior::Delay);
            pacing
        });
        pacing.tick().await;

        // Keeps the recorded timestamp
        let frame = recorded.clone();
        replay.index += 1;
        Some(frame)
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    fn list_available(&self) -> Result<Vec<DeviceDescriptor>, TransportError> {
        Ok(vec![DeviceDescriptor::new(MOCK_DEVICE_ID, "WULPUS mock dongle")])
    }

    async fn open(&mut self, device: &str) -> bool {
        info!("Mock link opened ({})", device);
        self.link = LinkStatus::Open {
            device: device.to_string(),
        };
        true
    }

    async fn close(&mut self) {
        self.link = LinkStatus::Closed;
    }

    async fn send(&mut self, packet: &CommandPacket) -> bool {
        match packet.kind() {
            PacketKind::Config => {
                if let Some(header) = ConfigPacketHeader::parse(packet) {
                    debug!(
                        "Mock configured: {} samples, {} TX/RX configs",
                        header.num_samples, header.num_txrx_configs
                    );
                    self.synthetic.configure(&header);
                }
                if let Some(replay) = self.replay.as_mut() {
                    replay.rewind();
                }
            }
            PacketKind::Restart => debug!("Mock restarted"),
            PacketKind::Unknown(b) => debug!("Mock ignoring packet with start byte {}", b),
        }
        true
    }

    async fn receive(&mut self) -> Option<Frame> {
        match self.replay.as_mut() {
            Some(replay) => Self::next_replayed(replay, self.replay_interval).await,
            None => {
                // Synthetic frames are always available; let other tasks run
                tokio::task::yield_now().await;
                Some(self.synthetic.next_frame())
            }
        }
    }

    fn link_status(&self) -> LinkStatus {
        self.link.clone()
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn run_override(&self) -> Option<RunOverride> {
        let replay = self.replay.as_ref()?;
        Some(RunOverride {
            num_acqs: u32::try_from(replay.recording.len()).unwrap_or(u32::MAX),
            num_samples: u16::try_from(replay.recording.num_samples()).unwrap_or(u16::MAX),
        })
    }

    fn run_finished(&mut self) {
        if let Some(replay) = self.replay.take() {
            info!(
                "Replay of {} finished after {} frames",
                replay.path.display(),
                replay.index
            );
        }
    }

    fn set_replay_source(&mut self, path: Option<&Path>) -> Result<(), TransportError> {
        let Some(path) = path else {
            self.replay = None;
            return Ok(());
        };
        if !path.is_file() {
            return Err(TransportError::ReplayFileNotFound(path.to_path_buf()));
        }

        let recording = Recording::load(path).map_err(|e| TransportError::InvalidReplay {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Replay source set to {}", path.display());
        self.replay = Some(Replay {
            path: path.to_path_buf(),
            recording,
            index: 0,
            pacing: None,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wulpus_protocol::encode_restart;

    fn settings() -> SessionSettings {
        SessionSettings {
            replay_interval_ms: 1,
            ..Default::default()
        }
    }

    fn write_recording(dir: &Path, frames: u16, samples: usize) -> PathBuf {
        let path = dir.join("replay.json");
        let frames = (0..frames)
            .map(|i| Frame::new(vec![i as i16; samples], i, 0))
            .collect();
        Recording::new(None, frames).save(&path).unwrap();
        path
    }

    #[test]
    fn test_lists_one_virtual_device() {
        let mock = MockTransport::new(&settings());
        let devices = mock.list_available().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, MOCK_DEVICE_ID);
        assert!(mock.is_simulated());
        assert!(mock.run_override().is_none());
    }

    #[test]
    fn test_missing_replay_file() {
        let mut mock = MockTransport::new(&settings());
        let err = mock
            .set_replay_source(Some(Path::new("/nonexistent/replay.json")))
            .unwrap_err();
        assert!(matches!(err, TransportError::ReplayFileNotFound(_)));
        assert!(mock.replay_path().is_none());
    }

    #[tokio::test]
    async fn test_send_always_succeeds() {
        let mut mock = MockTransport::new(&settings());
        assert!(mock.send(&encode_restart()).await);
        assert_eq!(mock.receive().await.unwrap().samples.len(), 400);
    }

    #[tokio::test]
    async fn test_replay_yields_recording_then_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_recording(dir.path(), 3, 6);

        let mut mock = MockTransport::new(&settings());
        mock.set_replay_source(Some(&path)).unwrap();
        assert_eq!(
            mock.run_override(),
            Some(RunOverride {
                num_acqs: 3,
                num_samples: 6
            })
        );

        let mut replayed = Vec::new();
        while let Some(frame) = mock.receive().await {
            replayed.push(frame);
        }
        // Frames come back exactly as recorded, timestamps included
        assert_eq!(replayed, Recording::load(&path).unwrap().frames);
        let seqs: Vec<u16> = replayed.iter().map(|f| f.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        mock.run_finished();
        assert!(mock.replay_path().is_none());
        assert!(mock.run_override().is_none());
        // Back to synthetic data
        assert!(mock.receive().await.is_some());
    }
}
