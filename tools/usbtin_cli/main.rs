// tools/usbtin_cli/main.rs
//
// Command-line front end for the usbtin driver: list ports, watch the bus,
// or push frames onto it.

use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};

use usbtin_lib::io::serial::Parity;
use usbtin_lib::io::slcan::{parse_frame, CanFrame, OpenMode, SlcanDevice, SlcanEvent};
use usbtin_lib::logging::{init_file_logging, stop_file_logging};
use usbtin_lib::settings::{load_settings, DriverSettings};
use usbtin_lib::{list_serial_ports, tlog};

/// Extra time allowed past the ack timeout for each queued frame
const SEND_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "usbtin_cli", version, about = "USBtin / slcan USB-CAN adapter tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports present on this machine
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open the CAN channel and print every event until the device goes away
    Monitor {
        #[command(flatten)]
        device: DeviceArgs,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Send one or more frames given in slcan notation (e.g. t1232AABB)
    Send {
        #[command(flatten)]
        device: DeviceArgs,
        /// Frame lines, without the trailing carriage return
        #[arg(required = true)]
        lines: Vec<String>,
    },
}

#[derive(Args)]
struct DeviceArgs {
    /// TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial port, overrides the settings file
    #[arg(long)]
    port: Option<String>,
    /// CAN bitrate in bits/second, overrides the settings file
    #[arg(long)]
    bitrate: Option<u32>,
    /// active, listen-only or loopback
    #[arg(long)]
    mode: Option<OpenMode>,
    /// Serial parity: none, odd or even
    #[arg(long)]
    parity: Option<Parity>,
}

impl DeviceArgs {
    fn resolve(&self) -> Result<DriverSettings, String> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path)?,
            None => DriverSettings::default(),
        };
        if let Some(port) = &self.port {
            settings.port = port.clone();
        }
        if let Some(bitrate) = self.bitrate {
            settings.can_bitrate = bitrate;
        }
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if let Some(parity) = self.parity {
            settings.parity = parity;
        }
        if settings.port.is_empty() {
            return Err("no serial port given (use --port or set `port` in --config)".to_string());
        }
        Ok(settings)
    }
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Ports { json } => cmd_ports(json),
        Command::Monitor { device, json } => cmd_monitor(&device, json),
        Command::Send { device, lines } => cmd_send(&device, &lines),
    };
    stop_file_logging();
    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_ports(json: bool) -> Result<(), String> {
    let ports = list_serial_ports()?;
    if json {
        let text = serde_json::to_string_pretty(&ports).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}\t{}\t{:04X}:{:04X}\t{}",
                port.port_name,
                port.port_type,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}\t{}", port.port_name, port.port_type),
        }
    }
    Ok(())
}

fn connect(args: &DeviceArgs) -> Result<SlcanDevice, String> {
    let settings = args.resolve()?;
    if let Some(dir) = &settings.log_dir {
        init_file_logging(dir)?;
    }
    let device = SlcanDevice::connect(&settings)?;
    tlog!(
        "[usbtin_cli] {} firmware {} hardware {}",
        settings.port,
        device.firmware_version().unwrap_or("?"),
        device.hardware_version().unwrap_or("?")
    );
    Ok(device)
}

fn print_event(event: &SlcanEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tlog!("[usbtin_cli] Failed to encode event: {}", e),
        }
    } else {
        println!("{}", event.describe());
    }
}

fn cmd_monitor(args: &DeviceArgs, json: bool) -> Result<(), String> {
    let mut device = connect(args)?;
    let events = device.open_default_channel()?;

    // Runs until the reader reports the port gone or the process is killed
    for event in events.iter() {
        print_event(&event, json);
        if matches!(event, SlcanEvent::Terminated(_)) {
            break;
        }
    }

    device.disconnect()?;
    Ok(())
}

/// Strictly parse every line up front so a typo never reaches the bus.
fn parse_lines(lines: &[String]) -> Result<Vec<CanFrame>, String> {
    lines
        .iter()
        .map(|line| parse_frame(line).ok_or_else(|| format!("not a valid frame line: {}", line)))
        .collect()
}

fn cmd_send(args: &DeviceArgs, lines: &[String]) -> Result<(), String> {
    let frames = parse_lines(lines)?;

    let mut device = connect(args)?;
    let events = device.open_default_channel()?;
    let per_frame = device.settings().ack_timeout() + SEND_GRACE;

    for frame in &frames {
        device.send(frame.clone())?;
    }

    let mut outstanding = frames.len();
    let mut failed = 0usize;
    let mut deadline = Instant::now() + per_frame;
    while outstanding > 0 {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) => {
                print_event(&event, false);
                match event {
                    SlcanEvent::FrameWritten(_) => {
                        outstanding -= 1;
                        deadline = Instant::now() + per_frame;
                    }
                    SlcanEvent::WriteTimeout(_) => {
                        outstanding -= 1;
                        failed += 1;
                        deadline = Instant::now() + per_frame;
                    }
                    SlcanEvent::Terminated(reason) => {
                        return Err(format!("device stopped: {}", reason));
                    }
                    _ => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(format!("{} frame(s) never left the queue", outstanding));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err("event stream closed".to_string());
            }
        }
    }

    device.disconnect()?;
    if failed > 0 {
        return Err(format!("{} of {} frame(s) were not acknowledged", failed, frames.len()));
    }
    Ok(())
}
