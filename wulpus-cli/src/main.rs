//! WULPUS Command-Line Controller
//!
//! Lists devices, encodes configuration packets and runs acquisitions
//! against a WULPUS probe or the built-in mock.

mod settings;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wulpus_protocol::{encode_config, AcquisitionConfig, ConfigPacketHeader};
use wulpus_session::{
    AcquisitionSession, DeviceTransport, SerialTransport, SessionEvent, SessionSettings,
    SessionStatus,
};
use wulpus_sim::{MockTransport, Recording, MOCK_DEVICE_ID};

use settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "wulpus")]
#[command(author, version, about = "WULPUS wearable ultrasound probe controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices that can be connected to
    Ports {
        /// List the mock device instead of serial ports
        #[arg(long)]
        mock: bool,
    },

    /// Print the configuration packet for a configuration file
    Encode {
        /// Acquisition configuration (JSON); defaults if omitted
        config: Option<PathBuf>,
    },

    /// Connect, run one acquisition and stream frames to the log
    Run {
        /// Serial port (defaults to the last one used)
        #[arg(short, long)]
        port: Option<String>,

        /// Use the mock transport instead of a serial port
        #[arg(long)]
        mock: bool,

        /// Acquisition configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Replay a recording through the mock transport
        #[arg(long, requires = "mock")]
        replay: Option<PathBuf>,

        /// Save the acquired frames as a recording
        #[arg(long)]
        record: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wulpus=info,wulpus_protocol=info,wulpus_session=info,wulpus_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load();

    match cli.command {
        Command::Ports { mock } => list_ports(mock, &settings.session),
        Command::Encode { config } => {
            let config = load_config(config.as_deref().or(settings.default_config.as_deref()))?;
            print_packet(&config)
        }
        Command::Run {
            port,
            mock,
            config,
            replay,
            record,
        } => {
            let config = load_config(config.as_deref().or(settings.default_config.as_deref()))?;
            let opts = RunOptions {
                port,
                mock,
                replay,
                record,
            };
            run(&mut settings, config, opts).await
        }
    }
}

fn make_transport(mock: bool, session: &SessionSettings) -> Box<dyn DeviceTransport> {
    if mock {
        Box::new(MockTransport::new(session))
    } else {
        Box::new(SerialTransport::new(session))
    }
}

fn list_ports(mock: bool, session: &SessionSettings) -> Result<()> {
    let devices = make_transport(mock, session).list_available()?;
    if devices.is_empty() {
        println!("No devices found");
    }
    for d in devices {
        match (d.vid, d.pid) {
            (Some(vid), Some(pid)) => {
                println!("{}\t{}\t{:04X}:{:04X}", d.id, d.description, vid, pid)
            }
            _ => println!("{}\t{}", d.id, d.description),
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AcquisitionConfig> {
    let Some(path) = path else {
        debug!("No configuration file given, using defaults");
        return Ok(AcquisitionConfig::default());
    };
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let config: AcquisitionConfig = serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse configuration {}", path.display()))?;
    info!(
        "Loaded configuration {} ({} TX/RX configs)",
        path.display(),
        config.tx_rx_config.len()
    );
    Ok(config)
}

fn print_packet(config: &AcquisitionConfig) -> Result<()> {
    let packet = encode_config(config)?;
    println!("{}", packet.to_hex());

    if let Some(header) = ConfigPacketHeader::parse(&packet) {
        println!(
            "samples/frame: {}  tx/rx configs: {}  gain reg: 0x{:02X}  sampling reg: {}",
            header.num_samples, header.num_txrx_configs, header.rx_gain_reg, header.sampling_freq_reg
        );
        for (i, (tx, rx)) in header.switch_masks.iter().enumerate() {
            println!("  config {}: tx 0x{:04X}  rx 0x{:04X}", i, tx, rx);
        }
    }
    Ok(())
}

struct RunOptions {
    port: Option<String>,
    mock: bool,
    replay: Option<PathBuf>,
    record: Option<PathBuf>,
}

async fn run(settings: &mut Settings, config: AcquisitionConfig, opts: RunOptions) -> Result<()> {
    let session = AcquisitionSession::new(
        make_transport(opts.mock, &settings.session),
        settings.session.clone(),
    );

    if let Some(path) = opts.replay.as_deref() {
        session.set_replay_file(Some(path))?;
    }

    let device = if opts.mock {
        Some(MOCK_DEVICE_ID.to_string())
    } else {
        opts.port.or_else(|| settings.last_port.clone())
    };
    session.connect(device.as_deref()).await?;

    let status = session.get_status();
    if status.status != SessionStatus::Ready {
        bail!("Could not connect ({}, link {})", status.status, status.link);
    }
    if !opts.mock && settings.last_port != device {
        settings.last_port = device;
        if let Err(e) = settings.save() {
            warn!("Failed to save settings: {:#}", e);
        }
    }

    let ctrl_c_session = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping acquisition");
            ctrl_c_session.stop();
        }
    });

    let mut events = session.subscribe();
    session.set_config(config);
    session.start().await?;

    // The first status event is Running, or the reason the run never started
    let total = session.get_status().total_expected;
    let step = (total / 10).max(1);
    let mut received = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Frame { frame, .. } => {
                received += 1;
                debug!(
                    "Frame {} config {} ({} samples)",
                    frame.sequence_number,
                    frame.sub_config_id,
                    frame.samples.len()
                );
                if received % step == 0 {
                    info!("{}/{} frames", received, total);
                }
            }
            SessionEvent::Status { status, .. } if status.status != SessionStatus::Running => break,
            SessionEvent::Status { .. } => {}
        }
    }
    if events.missed() > 0 {
        warn!("Log consumer fell behind, {} events skipped", events.missed());
    }
    session.wait_until_idle().await;

    let status = session.get_status();
    info!(
        "Acquisition ended: {} ({}/{} frames)",
        status.status, status.frames_written, status.total_expected
    );

    if let (Some(path), Some(acquisition)) = (opts.record.as_deref(), session.last_acquisition()) {
        Recording::from_acquisition(&acquisition)
            .save(path)
            .with_context(|| format!("Failed to save recording to {}", path.display()))?;
    }

    session.disconnect().await;
    match status.status {
        SessionStatus::Error => bail!("Acquisition ended with a link fault: {}", status.link),
        SessionStatus::NotConnected => bail!("Acquisition did not start, device not reachable"),
        _ => Ok(()),
    }
}
