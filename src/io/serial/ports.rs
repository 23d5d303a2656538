// src/io/serial/ports.rs
//
// Serial port enumeration.

use serde::Serialize;

use crate::io::error::IoError;

/// Information about an available serial port
#[derive(Clone, Debug, Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    fn from_serialport(p: serialport::SerialPortInfo) -> Self {
        let (port_type, manufacturer, product, serial_number, vid, pid) = match p.port_type {
            serialport::SerialPortType::UsbPort(info) => (
                "USB".to_string(),
                info.manufacturer,
                info.product,
                info.serial_number,
                Some(info.vid),
                Some(info.pid),
            ),
            serialport::SerialPortType::BluetoothPort => {
                ("Bluetooth".to_string(), None, None, None, None, None)
            }
            serialport::SerialPortType::PciPort => ("PCI".to_string(), None, None, None, None, None),
            serialport::SerialPortType::Unknown => {
                ("Unknown".to_string(), None, None, None, None, None)
            }
        };

        SerialPortInfo {
            port_name: p.port_name,
            port_type,
            manufacturer,
            product,
            serial_number,
            vid,
            pid,
        }
    }
}

/// List the serial ports present on this machine.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, IoError> {
    let ports = serialport::available_ports()
        .map_err(|e| IoError::connection("serial", format!("Failed to enumerate ports: {}", e)))?;

    Ok(ports
        .into_iter()
        // On macOS only the /dev/cu.* calling units are usable
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(SerialPortInfo::from_serialport)
        .collect())
}
