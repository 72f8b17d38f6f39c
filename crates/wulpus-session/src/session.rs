//! Acquisition session state machine
//!
//! ```text
//!                connect ok                start (packets sent)
//! NotConnected ────────────► Ready ───────────────────────────► Running
//!      ▲  │                    ▲                                  │
//!      │  └─► Connecting ──────┘        count reached / stop()    │
//!      │          │                  ◄────────────────────────────┘
//!      └──────────┘ open failed
//! ```
//!
//! A failed open or send goes to `NotConnected`, or to `Error` when the
//! transport reports a faulted link. The acquisition loop runs as a spawned
//! task that owns the transport for the duration of the run; `stop()` and
//! `get_status()` never wait on it.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, Notify, OwnedMutexGuard};
use tracing::{debug, info, warn};
use wulpus_protocol::{encode_config, encode_restart, AcquisitionConfig, Frame};

use crate::acquisition::{Acquisition, AcquisitionBuffers};
use crate::error::{SessionError, TransportError};
use crate::events::{Broadcaster, Subscription};
use crate::settings::SessionSettings;
use crate::state::{LinkStatus, SessionStatus, StatusSnapshot};
use crate::transport::{DeviceDescriptor, DeviceTransport};

type SharedTransport = Arc<AsyncMutex<Box<dyn DeviceTransport>>>;
type TransportGuard = OwnedMutexGuard<Box<dyn DeviceTransport>>;

#[derive(Debug, Default)]
struct SessionState {
    status: SessionStatus,
    link: LinkStatus,
    config: Option<AcquisitionConfig>,
    /// Configuration of the run in progress
    active: Option<AcquisitionConfig>,
    last_device: Option<String>,
    last_acquisition: Option<Arc<Acquisition>>,
}

struct Shared {
    state: Mutex<SessionState>,
    transport: SharedTransport,
    simulated: bool,
    /// Set from `start` until the loop has published its final status
    run_active: AtomicBool,
    /// Notified whenever `run_active` is cleared
    idle: Notify,
    stop_requested: AtomicBool,
    frames_written: AtomicUsize,
    broadcaster: Broadcaster,
    settings: SessionSettings,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot(&self) -> StatusSnapshot {
        let st = self.state();
        // A run keeps reporting its own configuration even if a new one is set
        let reported = st.active.as_ref().or(st.config.as_ref());
        StatusSnapshot {
            status: st.status,
            link: st.link.clone(),
            simulated: self.simulated,
            config: reported.cloned(),
            frames_written: self.frames_written.load(Ordering::Acquire),
            total_expected: reported.map_or(0, |c| c.us.num_acqs as usize),
        }
    }

    fn set_status(&self, status: SessionStatus, link: LinkStatus) {
        self.set_status_with(status, link, |_| {});
    }

    /// Change status and apply `update` under the same lock, then publish
    fn set_status_with(
        &self,
        status: SessionStatus,
        link: LinkStatus,
        update: impl FnOnce(&mut SessionState),
    ) {
        {
            let mut st = self.state();
            if st.status != status {
                info!("Session status: {} -> {}", st.status, status);
            }
            st.status = status;
            st.link = link;
            update(&mut st);
        }
        self.broadcaster.publish_status(self.snapshot());
    }
}

/// Status after an open or send failed
fn failure_status(link: &LinkStatus) -> SessionStatus {
    if link.is_faulted() {
        SessionStatus::Error
    } else {
        SessionStatus::NotConnected
    }
}

/// Exclusive claim on the session's run slot
///
/// Dropping it clears `run_active` and wakes `wait_until_idle`. If it is
/// dropped while the acquisition task unwinds, the session goes to `Error`.
struct RunClaim {
    shared: Arc<Shared>,
}

impl RunClaim {
    fn acquire(shared: &Arc<Shared>) -> Option<Self> {
        shared
            .run_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self {
            shared: shared.clone(),
        })
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("Acquisition task panicked, ending run");
            let link = self.shared.state().link.clone();
            self.shared.set_status_with(SessionStatus::Error, link, |st| st.active = None);
        }
        self.shared.run_active.store(false, Ordering::Release);
        self.shared.idle.notify_waiters();
    }
}

/// Everything a run needs, ready before the acquisition task is spawned
struct PreparedRun {
    transport: TransportGuard,
    config: AcquisitionConfig,
    buffers: AcquisitionBuffers,
}

/// One device session: connection lifecycle, run control and frame fan-out
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct AcquisitionSession {
    shared: Arc<Shared>,
}

impl AcquisitionSession {
    pub fn new(transport: Box<dyn DeviceTransport>, settings: SessionSettings) -> Self {
        let simulated = transport.is_simulated();
        let shared = Shared {
            state: Mutex::new(SessionState::default()),
            transport: Arc::new(AsyncMutex::new(transport)),
            simulated,
            run_active: AtomicBool::new(false),
            idle: Notify::new(),
            stop_requested: AtomicBool::new(false),
            frames_written: AtomicUsize::new(0),
            broadcaster: Broadcaster::new(settings.broadcast_capacity),
            settings,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Devices the transport can open. Fails with `Busy` during a run.
    pub fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, SessionError> {
        let transport = self
            .shared
            .transport
            .try_lock()
            .map_err(|_| TransportError::Busy)?;
        Ok(transport.list_available()?)
    }

    /// Open `device`, or the last device used when `None`
    ///
    /// A no-op while `Ready` or `Running`. Failure to open is reported
    /// through the status, not as an error.
    pub async fn connect(&self, device: Option<&str>) -> Result<(), SessionError> {
        let device = {
            let mut st = self.shared.state();
            if matches!(st.status, SessionStatus::Ready | SessionStatus::Running) {
                debug!("Already connected ({}), ignoring connect", st.status);
                return Ok(());
            }
            let device = match device.filter(|d| !d.is_empty()) {
                Some(d) => d.to_string(),
                None => st
                    .last_device
                    .clone()
                    .ok_or(SessionError::NoDeviceSpecified)?,
            };
            st.last_device = Some(device.clone());
            device
        };
        let link = self.shared.state().link.clone();
        self.shared.set_status(SessionStatus::Connecting, link);

        info!("Connecting to {}", device);
        let mut transport = self.shared.transport.lock().await;
        let opened = transport.open(&device).await;
        let link = transport.link_status();
        drop(transport);

        if opened {
            self.shared.set_status(SessionStatus::Ready, link);
        } else {
            warn!("Could not open {}", device);
            self.shared.set_status(failure_status(&link), link);
        }
        Ok(())
    }

    /// Stop any run and close the link
    pub async fn disconnect(&self) {
        self.stop();
        self.wait_until_idle().await;

        let mut transport = self.shared.transport.lock().await;
        transport.close().await;
        let link = transport.link_status();
        drop(transport);

        self.shared.set_status(SessionStatus::NotConnected, link);
    }

    /// Store the configuration for the next run
    ///
    /// A run in progress keeps the configuration it was started with.
    pub fn set_config(&self, config: AcquisitionConfig) {
        debug!(
            "Configuration set: {} acquisitions, {} sub-configs",
            config.us.num_acqs,
            config.tx_rx_config.len()
        );
        self.shared.state().config = Some(config);
    }

    /// Start an acquisition run
    ///
    /// Sends a restart packet, waits the settle delay, then sends the
    /// configuration packet and launches the acquisition loop. A no-op while
    /// a run is active. If the configuration packet cannot be sent the
    /// session goes to `NotConnected` (or `Error`) and `Ok` is returned.
    /// Nothing is sent when the configuration is invalid or its buffers
    /// cannot be allocated.
    pub async fn start(&self) -> Result<(), SessionError> {
        if self.shared.state().config.is_none() {
            return Err(SessionError::NoConfigurationSet);
        }
        let Some(claim) = RunClaim::acquire(&self.shared) else {
            debug!("Acquisition already running, ignoring start");
            return Ok(());
        };
        self.shared.stop_requested.store(false, Ordering::Release);

        let Some(run) = self.prepare_run().await? else {
            return Ok(());
        };

        self.shared.frames_written.store(0, Ordering::Release);
        let link = run.transport.link_status();
        let active = run.config.clone();
        self.shared.set_status_with(SessionStatus::Running, link, |st| st.active = Some(active));

        tokio::spawn(run_acquisition(claim, run));
        Ok(())
    }

    async fn prepare_run(&self) -> Result<Option<PreparedRun>, SessionError> {
        let mut transport = self.shared.transport.clone().lock_owned().await;

        let mut config = self
            .shared
            .state()
            .config
            .clone()
            .ok_or(SessionError::NoConfigurationSet)?;

        if let Some(ov) = transport.run_override() {
            info!(
                "Transport overrides run: {} acquisitions of {} samples",
                ov.num_acqs, ov.num_samples
            );
            config.us.num_acqs = ov.num_acqs;
            config.us.num_samples = ov.num_samples;
            self.shared.state().config = Some(config.clone());
        }

        let packet = encode_config(&config)?;
        debug!("Config packet: {}", packet.to_hex());

        let buffers = AcquisitionBuffers::try_new(
            config.us.num_acqs as usize,
            config.us.num_samples as usize,
        )?;

        if !transport.send(&encode_restart()).await {
            warn!("Restart packet not delivered");
        }
        tokio::time::sleep(self.shared.settings.settle_delay()).await;

        if !transport.send(&packet).await {
            let link = transport.link_status();
            warn!("Config packet not delivered ({})", link);
            drop(transport);
            self.shared.set_status(failure_status(&link), link);
            return Ok(None);
        }

        info!(
            "Starting acquisition: {} frames of {} samples",
            config.us.num_acqs, config.us.num_samples
        );
        Ok(Some(PreparedRun {
            transport,
            config,
            buffers,
        }))
    }

    /// Request the running loop to finish after its current receive
    pub fn stop(&self) {
        if self.shared.run_active.load(Ordering::Acquire) {
            info!("Stop requested");
        }
        self.shared.stop_requested.store(true, Ordering::Release);
    }

    /// Wait until no run is active
    ///
    /// Any number of callers may wait at once; all return once the run has
    /// published its final status.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.shared.run_active.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    pub fn get_status(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    /// Select a recording for the next run, or go back to live data
    pub fn set_replay_file(&self, path: Option<&Path>) -> Result<(), SessionError> {
        let mut transport = self
            .shared
            .transport
            .try_lock()
            .map_err(|_| TransportError::Busy)?;
        transport.set_replay_source(path)?;
        Ok(())
    }

    pub fn subscribe(&self) -> Subscription {
        self.shared.broadcaster.subscribe()
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared.broadcaster.latest_frame()
    }

    /// Frames of the most recent finished run
    pub fn last_acquisition(&self) -> Option<Arc<Acquisition>> {
        self.shared.state().last_acquisition.clone()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }
}

/// Receive frames until the configured count is reached, a stop is
/// requested or the link faults
async fn run_acquisition(claim: RunClaim, run: PreparedRun) {
    let PreparedRun {
        mut transport,
        config,
        mut buffers,
    } = run;
    let shared = claim.shared.clone();
    let total = config.us.num_acqs as usize;
    let idle = shared.settings.idle_delay();

    while !buffers.is_full() && !shared.stop_requested.load(Ordering::Acquire) {
        match transport.receive().await {
            Some(frame) => {
                debug!(
                    "Frame {} (config {}) -> index {}",
                    frame.sequence_number,
                    frame.sub_config_id,
                    buffers.len()
                );
                buffers.push(&frame);
                shared.frames_written.store(buffers.len(), Ordering::Release);
                shared.broadcaster.publish_frame(frame);
            }
            None => {
                if transport.link_status().is_faulted() {
                    warn!("Link faulted during acquisition, ending run");
                    break;
                }
                tokio::time::sleep(idle).await;
            }
        }
    }

    let link = transport.link_status();
    transport.run_finished();
    drop(transport);

    let written = buffers.len();
    let acquisition = Arc::new(buffers.finish(config));
    info!("Acquisition finished: {}/{} frames", written, total);

    let status = if link.is_faulted() {
        SessionStatus::Error
    } else {
        SessionStatus::Ready
    };
    shared.set_status_with(status, link, |st| {
        st.active = None;
        st.last_acquisition = Some(acquisition);
    });
    drop(claim);
}
