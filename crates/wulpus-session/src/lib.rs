//! WULPUS Acquisition Session
//!
//! This crate drives one WULPUS probe through a run: it opens the link,
//! sends the restart and configuration packets, collects frames into
//! pre-sized buffers and fans them out to subscribers.
//!
//! # Architecture
//!
//! - [`DeviceTransport`]: the only seam between the session and a device.
//!   [`SerialTransport`] talks to real hardware; `wulpus-sim` provides a
//!   synthetic/replay stand-in.
//! - [`AcquisitionSession`]: the connection state machine and the spawned
//!   acquisition loop
//! - [`Broadcaster`]: non-blocking fan-out of frames and status snapshots,
//!   retaining the latest frame for late subscribers
//!
//! # Example
//!
//! ```rust,no_run
//! use wulpus_protocol::AcquisitionConfig;
//! use wulpus_session::{AcquisitionSession, SerialTransport, SessionSettings};
//!
//! # async fn demo() -> Result<(), wulpus_session::SessionError> {
//! let settings = SessionSettings::default();
//! let session = AcquisitionSession::new(Box::new(SerialTransport::new(&settings)), settings);
//!
//! session.connect(Some("/dev/ttyACM0")).await?;
//! session.set_config(AcquisitionConfig::default());
//! session.start().await?;
//!
//! let mut events = session.subscribe();
//! while let Some(event) = events.recv().await {
//!     if let Some(frame) = event.as_frame() {
//!         println!("frame {}", frame.sequence_number);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod error;
pub mod events;
pub mod serial;
pub mod session;
pub mod settings;
pub mod state;
pub mod transport;

pub use acquisition::Acquisition;
pub use error::{SessionError, TransportError};
pub use events::{Broadcaster, SessionEvent, Subscription};
pub use serial::SerialTransport;
pub use session::AcquisitionSession;
pub use settings::{SessionSettings, DEFAULT_BAUD_RATE};
pub use state::{LinkStatus, SessionStatus, StatusSnapshot};
pub use transport::{DeviceDescriptor, DeviceTransport, RunOverride};
