// src/settings.rs
//
// Driver configuration, loaded from a TOML file. Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::io::error::IoError;
use crate::io::serial::utils::Parity;
use crate::io::slcan::OpenMode;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DriverSettings {
    /// Serial port path (e.g. "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Serial line speed
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    pub parity: Parity,
    /// Serial read timeout used while talking to the device synchronously
    pub read_timeout_ms: u64,
    /// Size of each inbound read once the CAN channel is open
    pub read_buffer_size: usize,
    /// CAN bus bitrate in bits/second, must be one of the device presets
    pub can_bitrate: u32,
    pub mode: OpenMode,
    /// How long the transmit loop waits for the device's ack
    pub ack_timeout_ms: u64,
    /// Keep an unterminated tail across reads instead of dropping it
    pub carry_partial_tokens: bool,
    /// Directory for log files; stderr only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            read_timeout_ms: 1000,
            read_buffer_size: 8192,
            can_bitrate: 500_000,
            mode: OpenMode::Active,
            ack_timeout_ms: 100,
            carry_partial_tokens: false,
            log_dir: None,
        }
    }
}

impl DriverSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, IoError> {
        toml::from_str(content)
            .map_err(|e| IoError::configuration(format!("Failed to parse settings: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String, IoError> {
        toml::to_string_pretty(self)
            .map_err(|e| IoError::configuration(format!("Failed to serialize settings: {}", e)))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<DriverSettings, IoError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        IoError::configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    DriverSettings::from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let settings = DriverSettings::from_toml_str("").unwrap();
        assert_eq!(settings, DriverSettings::default());
        assert_eq!(settings.ack_timeout(), Duration::from_millis(100));
        assert_eq!(settings.read_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_file() {
        let settings = DriverSettings::from_toml_str(
            r#"
            port = "/dev/ttyACM0"
            can_bitrate = 125000
            mode = "listen_only"
            parity = "even"
            carry_partial_tokens = true
            log_dir = "/tmp/usbtin"
            "#,
        )
        .unwrap();

        assert_eq!(settings.port, "/dev/ttyACM0");
        assert_eq!(settings.can_bitrate, 125_000);
        assert_eq!(settings.mode, OpenMode::ListenOnly);
        assert_eq!(settings.parity, Parity::Even);
        assert!(settings.carry_partial_tokens);
        assert_eq!(settings.log_dir, Some(PathBuf::from("/tmp/usbtin")));
        assert_eq!(settings.baud_rate, 115_200);
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = DriverSettings::from_toml_str("baud_rate = \"fast\"").unwrap_err();
        assert!(matches!(err, IoError::Configuration(_)));

        let err = DriverSettings::from_toml_str("mode = \"turbo\"").unwrap_err();
        assert!(matches!(err, IoError::Configuration(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut settings = DriverSettings::default();
        settings.port = "COM3".to_string();
        settings.mode = OpenMode::Loopback;
        let text = settings.to_toml_string().unwrap();
        assert_eq!(DriverSettings::from_toml_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_missing_file() {
        let err = load_settings(Path::new("/nonexistent/usbtin.toml")).unwrap_err();
        assert!(matches!(err, IoError::Configuration(_)));
    }
}
