// src/logging.rs
//
// Timestamped logging to stderr, optionally mirrored into a log file.

use std::path::Path;
use std::sync::Mutex;

use crate::io::error::IoError;

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
pub static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

const LOG_LINK_NAME: &str = "usbtin.log";

fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    now.format("%Y%m%d-%H%M%S-usbtin.log").to_string()
}

/// Initialise file logging to the given directory.
/// Creates a timestamped log file and a `usbtin.log` symlink (Unix only).
pub fn init_file_logging(log_dir: &Path) -> Result<(), IoError> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| IoError::configuration(format!("Failed to create log dir: {}", e)))?;

    let filename = log_file_name(chrono::Local::now());
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| IoError::configuration(format!("Failed to create log file: {}", e)))?;

    #[cfg(unix)]
    {
        let symlink_path = log_dir.join(LOG_LINK_NAME);
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            eprintln!(
                "{} [logging] Failed to create {} symlink: {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                LOG_LINK_NAME,
                e
            );
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    // tlog! would lock LOG_FILE again
    eprintln!(
        "{} [logging] File logging started: {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        log_path.display()
    );

    Ok(())
}

/// Stop file logging and close the log file.
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            eprintln!(
                "{} [logging] File logging stopped",
                chrono::Local::now().format("%H:%M:%S%.3f")
            );
        }
    }
}

/// Timestamped logging macro.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
#[macro_export]
macro_rules! tlog {
    ($($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), format_args!($($arg)*));
        eprintln!("{}", msg);
        if let Ok(mut guard) = $crate::logging::LOG_FILE.lock() {
            if let Some(ref mut f) = *guard {
                let _ = writeln!(f, "{}", msg);
            }
        }
    }};
}
