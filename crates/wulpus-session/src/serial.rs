//! Serial link to a WULPUS dongle

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use serialport::{available_ports, SerialPortType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};
use wulpus_protocol::{CommandPacket, ConfigPacketHeader, Frame, FrameDecoder};

use crate::error::TransportError;
use crate::settings::SessionSettings;
use crate::state::LinkStatus;
use crate::transport::{DeviceDescriptor, DeviceTransport};

fn descriptor_from_port(name: String, port_type: &SerialPortType) -> DeviceDescriptor {
    match port_type {
        SerialPortType::UsbPort(usb) => DeviceDescriptor {
            id: name,
            description: usb
                .product
                .clone()
                .unwrap_or_else(|| "USB serial".to_string()),
            vid: Some(usb.vid),
            pid: Some(usb.pid),
        },
        SerialPortType::BluetoothPort => DeviceDescriptor::new(name, "Bluetooth serial"),
        _ => DeviceDescriptor::new(name, "Unknown"),
    }
}

/// Transport over a native serial port
pub struct SerialTransport {
    baud_rate: u32,
    read_timeout: Duration,
    stream: Option<SerialStream>,
    link: LinkStatus,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl SerialTransport {
    pub fn new(settings: &SessionSettings) -> Self {
        Self {
            baud_rate: settings.baud_rate,
            read_timeout: settings.read_timeout(),
            stream: None,
            link: LinkStatus::Closed,
            decoder: FrameDecoder::new(0),
            read_buf: vec![0u8; 4096],
        }
    }

    fn fault(&mut self, reason: String) {
        warn!("Serial link faulted: {}", reason);
        self.stream = None;
        self.link = LinkStatus::Faulted { reason };
    }
}

#[async_trait]
impl DeviceTransport for SerialTransport {
    fn list_available(&self) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let ports =
            available_ports().map_err(|e| TransportError::EnumerationFailed(e.to_string()))?;

        let mut devices: Vec<DeviceDescriptor> = ports
            .into_iter()
            .map(|p| descriptor_from_port(p.port_name, &p.port_type))
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));

        for d in &devices {
            debug!("Found port {} ({})", d.id, d.description);
        }
        Ok(devices)
    }

    async fn open(&mut self, device: &str) -> bool {
        self.close().await;

        match tokio_serial::new(device, self.baud_rate)
            .timeout(self.read_timeout)
            .open_native_async()
        {
            Ok(stream) => {
                info!("Opened {} at {} baud", device, self.baud_rate);
                self.stream = Some(stream);
                self.link = LinkStatus::Open {
                    device: device.to_string(),
                };
                true
            }
            Err(e) => {
                warn!("Failed to open {}: {}", device, e);
                false
            }
        }
    }

    async fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed serial link");
        }
        self.decoder.clear();
        self.link = LinkStatus::Closed;
    }

    async fn send(&mut self, packet: &CommandPacket) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };

        let result = async {
            stream.write_all(packet.as_bytes()).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = result {
            self.fault(format!("write error: {}", e));
            return false;
        }

        // Frame length follows the configuration that starts the run
        if let Some(header) = ConfigPacketHeader::parse(packet) {
            self.decoder.set_num_samples(header.num_samples as usize);
        }
        debug!("Sent {:?} packet", packet.kind());
        true
    }

    async fn receive(&mut self) -> Option<Frame> {
        if let Some(frame) = self.decoder.next_frame() {
            return Some(frame);
        }

        let stream = self.stream.as_mut()?;
        match tokio::time::timeout(self.read_timeout, stream.read(&mut self.read_buf)).await {
            Ok(Ok(n)) if n > 0 => {
                self.decoder.push_bytes(&self.read_buf[..n]);
                self.decoder.next_frame()
            }
            Ok(Ok(_)) => None,
            Ok(Err(e)) => {
                if e.kind() != ErrorKind::WouldBlock && e.kind() != ErrorKind::TimedOut {
                    self.fault(format!("read error: {}", e));
                }
                None
            }
            Err(_) => None, // Timeout
        }
    }

    fn link_status(&self) -> LinkStatus {
        self.link.clone()
    }
}
