// src/io/slcan/device.rs
//
// USBtin / Lawicel slcan adapter on a virtual serial port.
//
// Lifecycle:
//   connect()      open the port, force configuration mode, read versions
//   transmit()     synchronous command/response while the CAN channel is closed
//   open_channel() set bitrate + mode, start the reader thread and pipeline
//   send()         queue a frame on the running pipeline
//   close_channel()/disconnect()
//
// Protocol reference: http://www.can232.com/docs/can232_v3.pdf

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serialport::SerialPort;

use super::events::EventReceiver;
use super::frame::CanFrame;
use super::pipeline::{InboundFeed, PipelineConfig, SlcanPipeline};
use super::receive::BELL;
use crate::io::error::IoError;
use crate::io::serial::utils as serial_utils;
use crate::io::transport::{self, SharedTransport};
use crate::settings::DriverSettings;

// ============================================================================
// Constants
// ============================================================================

/// slcan bitrate commands (S0-S8)
const SLCAN_BITRATES: [(u32, &str); 9] = [
    (10_000, "S0"),    // 10 Kbit/s
    (20_000, "S1"),    // 20 Kbit/s
    (50_000, "S2"),    // 50 Kbit/s
    (100_000, "S3"),   // 100 Kbit/s
    (125_000, "S4"),   // 125 Kbit/s
    (250_000, "S5"),   // 250 Kbit/s
    (500_000, "S6"),   // 500 Kbit/s
    (800_000, "S7"),   // 800 Kbit/s
    (1_000_000, "S8"), // 1 Mbit/s
];

/// Settle time after opening the USB serial device
const USB_SETTLE: Duration = Duration::from_millis(200);
/// Pause after each configuration-mode command during connect
const COMMAND_PAUSE: Duration = Duration::from_millis(100);
/// Read timeout once the reader thread owns the port, so it can see the stop flag
const READER_POLL: Duration = Duration::from_millis(50);

/// Serial port handle shared by the transmit loop and the command helper.
pub type SerialHandle = Box<dyn SerialPort>;

// ============================================================================
// Types
// ============================================================================

/// CAN bus access mode used when opening the channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Normal operation, frames are acknowledged on the bus (O)
    #[default]
    Active,
    /// Receive only, no bus acknowledgement (L)
    ListenOnly,
    /// Internal loopback, nothing reaches the bus (l)
    Loopback,
}

impl OpenMode {
    /// slcan command that opens the channel in this mode
    pub fn command(self) -> &'static str {
        match self {
            OpenMode::Active => "O",
            OpenMode::ListenOnly => "L",
            OpenMode::Loopback => "l",
        }
    }
}

impl std::str::FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "active" => Ok(OpenMode::Active),
            "listen_only" | "listenonly" => Ok(OpenMode::ListenOnly),
            "loopback" => Ok(OpenMode::Loopback),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Running CAN channel: pipeline plus the serial reader thread feeding it
struct OpenChannel {
    pipeline: SlcanPipeline<SerialHandle>,
    reader_stop: Arc<AtomicBool>,
    reader_handle: Option<JoinHandle<()>>,
}

impl OpenChannel {
    fn stop(&mut self) {
        self.reader_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader_handle.take() {
            let _ = handle.join();
        }
        self.pipeline.shutdown();
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Find the slcan bitrate command for a given bitrate
pub fn find_bitrate_command(bitrate: u32) -> Result<&'static str, IoError> {
    SLCAN_BITRATES
        .iter()
        .find(|(rate, _)| *rate == bitrate)
        .map(|(_, cmd)| *cmd)
        .ok_or_else(|| {
            let valid: Vec<String> = SLCAN_BITRATES.iter().map(|(r, _)| format!("{}", r)).collect();
            IoError::configuration(format!(
                "Invalid CAN bitrate {}. Valid bitrates: {}",
                bitrate,
                valid.join(", ")
            ))
        })
}

/// Read one reply line, up to and excluding `\r`. BEL means the device
/// rejected the command.
fn read_response<P: Read + ?Sized>(port: &mut P, device: &str) -> Result<String, IoError> {
    let mut response = String::new();
    let mut byte = [0u8; 1];

    loop {
        match port.read(&mut byte) {
            Ok(0) => return Err(IoError::connection(device, "port closed")),
            Ok(_) => {}
            Err(e) => return Err(IoError::from_io(device, e)),
        }

        match byte[0] as char {
            '\r' => return Ok(response),
            BELL => return Err(IoError::protocol(device, "BELL signal")),
            c => response.push(c),
        }
    }
}

/// Write `cmd\r` and return the device's reply line.
pub fn send_and_read<P: Read + Write + ?Sized>(
    port: &mut P,
    device: &str,
    cmd: &str,
) -> Result<String, IoError> {
    port.write_all(format!("{}\r", cmd).as_bytes())
        .and_then(|_| port.flush())
        .map_err(|e| IoError::from_io(device, e))?;
    read_response(port, device)
}

/// Wait for the device to finish answering the close command: `\r` if the
/// channel was open, BEL if it already was closed.
fn wait_for_prompt<P: Read + ?Sized>(port: &mut P, device: &str) -> Result<(), IoError> {
    match read_response(port, device) {
        Ok(_) => Ok(()),
        Err(IoError::Protocol { .. }) => Ok(()),
        Err(IoError::Timeout { .. }) => Err(IoError::timeout(
            device,
            "device doesn't answer. Right port?",
        )),
        Err(e) => Err(e),
    }
}

/// Query firmware (`v`) and hardware (`V`) versions and clear the overflow
/// flags (`W2D00`). Version strings have their echo character stripped.
fn query_versions<P: Read + Write + ?Sized>(
    port: &mut P,
    device: &str,
) -> Result<(String, String), IoError> {
    let strip = |s: String| s.get(1..).unwrap_or_default().to_string();

    let firmware = strip(send_and_read(port, device, "v")?);
    let hardware = strip(send_and_read(port, device, "V")?);
    send_and_read(port, device, "W2D00")?;

    Ok((firmware, hardware))
}

/// Blocking read loop feeding the pipeline until stopped or the port fails.
///
/// End of stream counts as a failure: the feed is terminated so the receive
/// loop drains and stops.
fn run_reader<R: Read, T: transport::Transport>(
    mut reader: R,
    feed: InboundFeed<T>,
    stop: Arc<AtomicBool>,
    buffer_size: usize,
    device: String,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];

    while !stop.load(Ordering::SeqCst) {
        match reader.read(&mut buf) {
            Ok(0) => {
                tlog!("[slcan] {} port closed", device);
                feed.terminate("Port closed");
                return;
            }
            Ok(n) => {
                if !feed.push_bytes(&buf[..n]) {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Timeout - continue
            }
            Err(e) => {
                tlog!("[slcan] {} read error: {}", device, e);
                feed.terminate(&format!("Read error: {}", e));
                return;
            }
        }
    }

    tlog!("[slcan] {} reader stopped", device);
}

// ============================================================================
// Device
// ============================================================================

/// A connected slcan adapter.
pub struct SlcanDevice {
    settings: DriverSettings,
    device: String,
    port: SharedTransport<SerialHandle>,
    firmware_version: Option<String>,
    hardware_version: Option<String>,
    channel: Option<OpenChannel>,
}

impl SlcanDevice {
    /// Open the serial port and bring the adapter into configuration mode.
    pub fn connect(settings: &DriverSettings) -> Result<Self, IoError> {
        let device = format!("slcan({})", settings.port);

        let mut port = serialport::new(&settings.port, settings.baud_rate)
            .data_bits(serial_utils::to_serialport_data_bits(settings.data_bits))
            .stop_bits(serial_utils::to_serialport_stop_bits(settings.stop_bits))
            .parity(serial_utils::to_serialport_parity(settings.parity))
            .timeout(settings.read_timeout())
            .open()
            .map_err(|e| IoError::connection(&device, e.to_string()))?;

        // Wait for USB device to be ready
        thread::sleep(USB_SETTLE);

        // Flush any half-typed command, then close a possibly open channel
        send_raw(&mut port, &device, b"\rC\r")?;
        thread::sleep(COMMAND_PAUSE);
        port.clear(serialport::ClearBuffer::All)
            .map_err(|e| IoError::connection(&device, e.to_string()))?;

        send_raw(&mut port, &device, b"C\r")?;
        thread::sleep(COMMAND_PAUSE);
        wait_for_prompt(&mut *port, &device)?;

        let (firmware, hardware) = query_versions(&mut *port, &device)?;

        tlog!(
            "[slcan] Connected to {} (firmware: {}, hardware: {})",
            settings.port,
            firmware,
            hardware
        );

        Ok(Self {
            settings: settings.clone(),
            device,
            port: Arc::new(Mutex::new(port)),
            firmware_version: Some(firmware),
            hardware_version: Some(hardware),
            channel: None,
        })
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    pub fn hardware_version(&self) -> Option<&str> {
        self.hardware_version.as_deref()
    }

    pub fn is_channel_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Send a raw command and return the reply line (without `\r`).
    ///
    /// Only valid while the CAN channel is closed; afterwards the reader
    /// thread owns the inbound side of the port.
    pub fn transmit(&self, cmd: &str) -> Result<String, IoError> {
        if self.channel.is_some() {
            return Err(IoError::state(
                "commands cannot be sent while the CAN channel is open",
            ));
        }
        let mut port = self.port.lock().unwrap_or_else(|e| e.into_inner());
        send_and_read(&mut **port, &self.device, cmd)
    }

    /// Set the bitrate and open the CAN channel, starting the transmit and
    /// receive loops. Events arrive on the returned receiver.
    pub fn open_channel(&mut self, bitrate: u32, mode: OpenMode) -> Result<EventReceiver, IoError> {
        if self.channel.is_some() {
            return Err(IoError::state("CAN channel is already open"));
        }

        // Non-preset bitrates (custom bit timing registers) are not supported
        let bitrate_cmd = find_bitrate_command(bitrate)?;
        self.transmit(bitrate_cmd)?;
        self.transmit(mode.command())?;

        let mut reader = {
            let port = self.port.lock().unwrap_or_else(|e| e.into_inner());
            port.try_clone()
                .map_err(|e| IoError::connection(&self.device, e.to_string()))?
        };
        reader
            .set_timeout(READER_POLL)
            .map_err(|e| IoError::connection(&self.device, e.to_string()))?;

        let config = PipelineConfig {
            ack_timeout: self.settings.ack_timeout(),
            carry_partial_tokens: self.settings.carry_partial_tokens,
        };
        let (pipeline, events) = SlcanPipeline::start(self.port.clone(), config)?;

        let feed = pipeline.inbound_feed();
        let reader_stop = Arc::new(AtomicBool::new(false));
        let stop = reader_stop.clone();
        let buffer_size = self.settings.read_buffer_size;
        let device = self.device.clone();
        let reader_handle = thread::Builder::new()
            .name("slcan-reader".to_string())
            .spawn(move || run_reader(reader, feed, stop, buffer_size, device))
            .map_err(|e| IoError::state(format!("spawn reader: {}", e)))?;

        tlog!(
            "[slcan] {} channel open (bitrate: {}, mode: {:?})",
            self.device,
            bitrate,
            mode
        );

        self.channel = Some(OpenChannel {
            pipeline,
            reader_stop,
            reader_handle: Some(reader_handle),
        });
        Ok(events)
    }

    /// Open the channel with the bitrate and mode from the settings.
    pub fn open_default_channel(&mut self) -> Result<EventReceiver, IoError> {
        self.open_channel(self.settings.can_bitrate, self.settings.mode)
    }

    /// Queue a frame for transmission. The outcome arrives as an event.
    pub fn send(&self, frame: CanFrame) -> Result<(), IoError> {
        match &self.channel {
            Some(channel) => channel.pipeline.send(frame),
            None => Err(IoError::state("CAN channel is not open")),
        }
    }

    /// Frames queued but not yet written.
    pub fn pending(&self) -> usize {
        self.channel
            .as_ref()
            .map(|c| c.pipeline.pending())
            .unwrap_or(0)
    }

    /// Stop the loops and close the CAN channel. A no-op if it is not open.
    pub fn close_channel(&mut self) -> Result<(), IoError> {
        let Some(mut channel) = self.channel.take() else {
            return Ok(());
        };
        channel.stop();

        {
            let mut port = self.port.lock().unwrap_or_else(|e| e.into_inner());
            send_raw(&mut port, &self.device, b"C\r")?;
        }

        self.firmware_version = None;
        self.hardware_version = None;
        tlog!("[slcan] {} channel closed", self.device);
        Ok(())
    }

    /// Close the channel and release the port.
    pub fn disconnect(mut self) -> Result<(), IoError> {
        self.close_channel()
    }
}

impl Drop for SlcanDevice {
    fn drop(&mut self) {
        if self.channel.is_some() {
            let _ = self.close_channel();
        }
    }
}

fn send_raw(port: &mut SerialHandle, device: &str, bytes: &[u8]) -> Result<(), IoError> {
    port.write_all(bytes)
        .and_then(|_| port.flush())
        .map_err(|e| IoError::from_io(device, e))
}

// ============================================================================
// Tests
// ============================================================================
