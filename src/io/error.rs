// src/io/error.rs
//
// Error type shared by the transport, device and settings layers.
//
// Protocol noise on the receive/transmit hot path never becomes an IoError;
// those conditions are reported as SlcanEvent values instead.

use thiserror::Error;

/// Errors raised at the device/transport boundary.
#[derive(Debug, Error)]
pub enum IoError {
    /// The device answered with something we could not accept (BEL, bad reply).
    #[error("{device}: protocol error: {message}")]
    Protocol { device: String, message: String },

    /// The serial port could not be opened, written or read.
    #[error("{device}: connection error: {message}")]
    Connection { device: String, message: String },

    /// Invalid user configuration (bitrate, settings file, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The device did not answer in time.
    #[error("{device}: timeout: {message}")]
    Timeout { device: String, message: String },

    /// Operation not allowed in the current device state.
    #[error("invalid state: {0}")]
    State(String),
}

impl IoError {
    pub fn protocol(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Protocol {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn connection(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Connection {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        IoError::Configuration(message.into())
    }

    pub fn timeout(device: impl Into<String>, message: impl Into<String>) -> Self {
        IoError::Timeout {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        IoError::State(message.into())
    }

    /// Map a std::io error from the port into a connection or timeout error.
    pub fn from_io(device: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            IoError::timeout(device, err.to_string())
        } else {
            IoError::connection(device, err.to_string())
        }
    }
}

impl From<IoError> for String {
    fn from(err: IoError) -> Self {
        err.to_string()
    }
}
