// src/io/serial/mod.rs
//
// Serial port helpers shared by the slcan device.

pub mod ports;
pub mod utils;

pub use ports::{list_serial_ports, SerialPortInfo};
pub use utils::Parity;
