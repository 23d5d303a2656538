// src/lib.rs
//
// Host-side driver for USBtin-style USB-CAN adapters (Lawicel/slcan ASCII
// protocol over a virtual serial port).

#[macro_use]
pub mod logging;

pub mod io;
pub mod settings;

pub use io::error::IoError;
pub use io::serial::{list_serial_ports, SerialPortInfo};
pub use io::slcan::{
    decode_frame, encode_frame, CanFrame, EventReceiver, OpenMode, SlcanDevice, SlcanEvent,
    SlcanPipeline,
};
pub use settings::{load_settings, DriverSettings};
