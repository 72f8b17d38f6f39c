//! Persisted frame sets for replay
//!
//! A recording is a JSON document holding the configuration of the run that
//! produced it (if known) and its frames in order.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use wulpus_protocol::{AcquisitionConfig, Frame};
use wulpus_session::Acquisition;

use crate::error::SimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub config: Option<AcquisitionConfig>,
    pub frames: Vec<Frame>,
}

impl Recording {
    pub fn new(config: Option<AcquisitionConfig>, frames: Vec<Frame>) -> Self {
        Self { config, frames }
    }

    pub fn from_acquisition(acquisition: &Acquisition) -> Self {
        Self {
            config: Some(acquisition.config.clone()),
            frames: acquisition.frames().collect(),
        }
    }

    /// Load and check a recording
    ///
    /// Fails if it has no frames or the frames differ in length.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let data = fs::read_to_string(path)?;
        let recording: Recording = serde_json::from_str(&data)?;

        if recording.frames.is_empty() {
            return Err(SimError::EmptyRecording(path.to_path_buf()));
        }
        let expected = recording.num_samples();
        if expected > u16::MAX as usize {
            return Err(SimError::TooManySamples(expected));
        }
        if let Some((index, frame)) = recording
            .frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.samples.len() != expected)
        {
            return Err(SimError::FrameLength {
                index,
                expected,
                actual: frame.samples.len(),
            });
        }

        info!(
            "Loaded recording {}: {} frames of {} samples",
            path.display(),
            recording.frames.len(),
            expected
        );
        Ok(recording)
    }

    pub fn save(&self, path: &Path) -> Result<(), SimError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string(self)?;
        fs::write(path, data)?;
        info!("Saved {} frames to {}", self.frames.len(), path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Samples per frame, taken from the first frame
    pub fn num_samples(&self) -> usize {
        self.frames.first().map_or(0, |f| f.samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(n: u16, len: usize) -> Vec<Frame> {
        (0..n).map(|i| Frame::new(vec![i as i16; len], i, 0)).collect()
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");

        let recording = Recording::new(Some(AcquisitionConfig::default()), frames(3, 5));
        recording.save(&path).unwrap();

        let loaded = Recording::load(&path).unwrap();
        assert_eq!(loaded, recording);
        assert_eq!(loaded.num_samples(), 5);
    }

    #[test]
    fn test_reject_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        Recording::new(None, Vec::new()).save(&path).unwrap();

        assert!(matches!(
            Recording::load(&path),
            Err(SimError::EmptyRecording(_))
        ));
    }

    #[test]
    fn test_reject_ragged_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.json");
        let mut f = frames(3, 4);
        f[2].samples.pop();
        Recording::new(None, f).save(&path).unwrap();

        assert!(matches!(
            Recording::load(&path),
            Err(SimError::FrameLength {
                index: 2,
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_config_is_optional() {
        let json = r#"{"frames":[{"samples":[1,2],"sequence_number":0,"sub_config_id":0,"timestamp_us":0}]}"#;
        let recording: Recording = serde_json::from_str(json).unwrap();
        assert!(recording.config.is_none());
        assert_eq!(recording.len(), 1);
    }
}
