//! WULPUS Simulation Library
//!
//! This crate lets an [`AcquisitionSession`](wulpus_session::AcquisitionSession)
//! run without a probe attached. It includes:
//!
//! - **MockTransport**: a [`DeviceTransport`](wulpus_session::DeviceTransport)
//!   that streams synthetic frames or replays a recording
//! - **SyntheticSource**: random in-range frames with increasing sequence numbers
//! - **Recording**: JSON frame sets saved from a finished run and read back for replay
//!
//! # Example
//!
//! ```rust,no_run
//! use wulpus_protocol::AcquisitionConfig;
//! use wulpus_session::{AcquisitionSession, SessionSettings};
//! use wulpus_sim::{MockTransport, MOCK_DEVICE_ID};
//!
//! # async fn demo() -> Result<(), wulpus_session::SessionError> {
//! let settings = SessionSettings::default();
//! let session = AcquisitionSession::new(Box::new(MockTransport::new(&settings)), settings);
//! session.connect(Some(MOCK_DEVICE_ID)).await?;
//! session.set_config(AcquisitionConfig::default());
//! session.start().await?;
//! session.wait_until_idle().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod recording;
pub mod synthetic;
pub mod transport;

pub use error::SimError;
pub use recording::Recording;
pub use synthetic::SyntheticSource;
pub use transport::{MockTransport, MOCK_DEVICE_ID};
