// src/io/transport.rs
//
// Write side of the byte transport the slcan pipeline runs over.
//
// The pipeline only ever writes whole lines; reads are pushed in from the
// transport's own thread through an InboundFeed. Writers share one
// `Arc<Mutex<T>>` so lines never interleave.

use std::io::Write;
use std::sync::{Arc, Mutex};

use super::error::IoError;

/// Byte sink for encoded command lines.
pub trait Transport: Send {
    /// Write all of `bytes` and flush them to the device.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), IoError>;
}

/// Transport handle shared between the transmit loop and setup helpers.
pub type SharedTransport<T> = Arc<Mutex<T>>;

impl Transport for Box<dyn serialport::SerialPort> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), IoError> {
        let device = format!("slcan({})", self.name().unwrap_or_default());
        Write::write_all(self, bytes).map_err(|e| IoError::from_io(&device, e))?;
        self.flush().map_err(|e| IoError::from_io(&device, e))
    }
}
