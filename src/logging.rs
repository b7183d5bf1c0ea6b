//! Logging setup
//!
//! CLI commands and `run --foreground` log to stderr. The background daemon logs
//! to a size-rotated file in the data directory. File writes are synchronous: the
//! panic hook aborts right after logging, so a queued line would be lost.
//!
//! `RUST_LOG` overrides the configured level.

use color_eyre::eyre::{self, Result};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Rotate the daemon log once it reaches this size
const MAX_LOG_BYTES: u64 = 1_000_000;

const LOG_FILE_NAME: &str = "masw.log";

/// Filter for our crate at `level`, unless `RUST_LOG` is set
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("masw={level}")))
}

/// Log warnings and errors to stderr for one-shot CLI commands
pub fn init_cli() {
    // Ignore "already set": tests and repeated init are harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Initialize daemon logging
///
/// # Errors
/// Returns an error if the log directory cannot be determined or a global
/// subscriber is already installed.
pub fn init_daemon(level: &str, foreground: bool) -> Result<()> {
    if foreground {
        tracing_subscriber::fmt()
            .with_env_filter(filter(level))
            .with_writer(io::stderr)
            .try_init()
            .map_err(|e| eyre::eyre!("Failed to initialize logging: {e}"))?;
        return Ok(());
    }

    let appender = RotatingFileAppender::new(log_dir()?, LOG_FILE_NAME, MAX_LOG_BYTES);
    file_subscriber(appender, level)
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to initialize logging: {e}"))
}

/// Subscriber writing plain lines straight into `appender`
fn file_subscriber(
    appender: RotatingFileAppender,
    level: &str,
) -> impl Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(Mutex::new(appender))
        .with_ansi(false)
        .finish()
}

/// `<data_local_dir>/masw`
///
/// # Errors
/// Returns an error if the platform has no data directory.
pub fn log_dir() -> Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or_else(|| eyre::eyre!("Could not determine data directory"))?
        .join("masw"))
}

/// A file appender that rotates logs based on size.
///
/// Keeps exactly two files:
/// - `current`: The active log file.
/// - `backup`: The previous log file (rotated when `current` exceeds limit).
///
/// Re-creates the file if it is deleted externally. Created files are
/// owner-only on Unix.
pub struct RotatingFileAppender {
    path: PathBuf,
    backup_path: PathBuf,
    max_size_bytes: u64,
    file: Mutex<Option<File>>,
}

impl RotatingFileAppender {
    /// Create a new rotating file appender.
    ///
    /// # Arguments
    /// * `dir` - Directory to store logs in.
    /// * `filename` - Base filename (e.g., "masw.log").
    /// * `max_size_bytes` - Maximum size before rotation (e.g., `1_000_000` for 1MB).
    pub fn new(dir: impl Into<PathBuf>, filename: &str, max_size_bytes: u64) -> Self {
        let dir = dir.into();
        let path = dir.join(filename);
        let backup_path = dir.join(format!("{filename}.old"));

        Self {
            path,
            backup_path,
            max_size_bytes,
            file: Mutex::new(None),
        }
    }

    fn open_secure(path: &std::path::Path, append: bool) -> io::Result<File> {
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true);

        if append {
            options.append(true);
        } else {
            options.truncate(true);
        }

        #[cfg(unix)]
        {
            options.mode(0o600);
        }

        options.open(path)
    }

    /// Open the file if not open, or re-open if deleted.
    fn get_file<'a>(&self, guard: &'a mut Option<File>) -> io::Result<&'a mut File> {
        if !self.path.exists() {
            *guard = None;
        }

        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            *guard = Some(Self::open_secure(&self.path, true)?);
        }

        guard
            .as_mut()
            .ok_or_else(|| io::Error::other("log file not open"))
    }

    /// Rotate the log file: current -> backup, create new current.
    fn rotate(&self, guard: &mut Option<File>) -> io::Result<()> {
        *guard = None;

        // Overwrites the previous backup
        if self.path.exists() {
            fs::rename(&self.path, &self.backup_path)?;
        }

        *guard = Some(Self::open_secure(&self.path, false)?);
        Ok(())
    }
}

impl Write for RotatingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        let current_size = match self.get_file(&mut guard) {
            Ok(f) => f.metadata()?.len(),
            Err(_) => 0,
        };

        if current_size >= self.max_size_bytes
            && let Err(e) = self.rotate(&mut guard)
        {
            // Keep writing to the current file
            eprintln!("Failed to rotate log file: {e}");
        }

        let file = self.get_file(&mut guard)?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(format!("Log mutex poisoned: {e}")))?;

        if let Some(file) = guard.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rotates_when_limit_reached() {
        let dir = tempfile::tempdir().unwrap();
        let mut appender = RotatingFileAppender::new(dir.path(), "masw.log", 10);

        appender.write_all(b"0123456789").unwrap();
        appender.write_all(b"next").unwrap();
        appender.flush().unwrap();

        let current = fs::read_to_string(dir.path().join("masw.log")).unwrap();
        let backup = fs::read_to_string(dir.path().join("masw.log.old")).unwrap();
        assert_eq!(current, "next");
        assert_eq!(backup, "0123456789");
    }

    #[test]
    fn test_recreates_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masw.log");
        let mut appender = RotatingFileAppender::new(dir.path(), "masw.log", 1_000);

        appender.write_all(b"first\n").unwrap();
        fs::remove_file(&path).unwrap();
        appender.write_all(b"second\n").unwrap();
        appender.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn test_logged_line_is_on_disk_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let appender = RotatingFileAppender::new(dir.path(), LOG_FILE_NAME, MAX_LOG_BYTES);

        tracing::subscriber::with_default(file_subscriber(appender, "error"), || {
            tracing::error!("fatal: event loop panicked");
        });

        // No flush and no guard: the line must already be written
        let contents = fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert!(contents.contains("fatal: event loop panicked"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("masw").join("logs");
        let mut appender = RotatingFileAppender::new(&nested, "masw.log", 1_000);

        appender.write_all(b"hello").unwrap();

        assert!(nested.join("masw.log").exists());
    }
}
