//! Debug log file sink
//!
//! A `MakeWriter` that appends tracing output to
//! `<data dir>/barblocks/barblocks-debug.log` while file logging is on.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing_subscriber::fmt::MakeWriter;

const APP_DIR_NAME: &str = "barblocks";
const DEBUG_LOG_FILENAME: &str = "barblocks-debug.log";

static FILE_LOGGING_ENABLED: AtomicBool = AtomicBool::new(false);

static DEBUG_LOG_FILE: Lazy<Arc<Mutex<Option<std::fs::File>>>> = Lazy::new(|| {
    let file = open_debug_log_file().or_else(|_| open_fallback_log_file()).ok();
    Arc::new(Mutex::new(file))
});

/// Turn writes to the debug log file on or off
pub fn set_file_logging(enabled: bool) {
    FILE_LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Writer for a tracing fmt layer targeting the debug log file
pub fn file_writer() -> DebugFileWriter {
    DebugFileWriter {
        file: DEBUG_LOG_FILE.clone(),
    }
}

/// Mask a secret for logging, keeping a short prefix for correlation.
pub fn redact_value(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    if value.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

/// Redact the values of a `Cookie` header while keeping the names.
pub fn redact_cookie_header(header: &str) -> String {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => format!("{}={}", name, redact_value(value)),
            None => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn open_debug_log_file() -> io::Result<std::fs::File> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Missing data directory"))?;
    let log_dir = data_dir.join(APP_DIR_NAME);
    std::fs::create_dir_all(&log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(DEBUG_LOG_FILENAME))
}

fn open_fallback_log_file() -> io::Result<std::fs::File> {
    let path = std::env::temp_dir().join(DEBUG_LOG_FILENAME);
    OpenOptions::new().create(true).append(true).open(path)
}

/// Shares one file handle across every writer the fmt layer makes
#[derive(Clone)]
pub struct DebugFileWriter {
    file: Arc<Mutex<Option<std::fs::File>>>,
}

impl<'a> MakeWriter<'a> for DebugFileWriter {
    type Writer = DebugFileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        DebugFileWriterGuard {
            file: self.file.clone(),
        }
    }
}

/// Drops writes silently while file logging is off or the file is missing
pub struct DebugFileWriterGuard {
    file: Arc<Mutex<Option<std::fs::File>>>,
}

impl Write for DebugFileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !FILE_LOGGING_ENABLED.load(Ordering::Relaxed) {
            return Ok(buf.len());
        }

        match self.file.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.write(buf),
                None => Ok(buf.len()),
            },
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if !FILE_LOGGING_ENABLED.load(Ordering::Relaxed) {
            return Ok(());
        }
        match self.file.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(file) => file.flush(),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}
