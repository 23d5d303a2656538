// src/io/mod.rs
//
// Device IO for USB-CAN adapters speaking the slcan ASCII protocol.
//
// Layers, bottom up:
// - transport: the byte sink the pipeline writes lines to
// - channel:   blocking FIFO handoff between threads
// - serial:    port enumeration and framing parameters
// - slcan:     frame codec, receive/transmit loops and the device driver

pub mod channel;
pub mod error;
pub mod serial;
pub mod slcan;
pub mod transport;

pub use channel::BlockingChannel;
pub use error::IoError;
pub use slcan::{CanFrame, OpenMode, SlcanDevice, SlcanEvent, SlcanPipeline};
pub use transport::{SharedTransport, Transport};
