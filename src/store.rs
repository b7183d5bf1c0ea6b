//! Mapping store
//!
//! Owns the in-memory configuration (monitor mapping + settings), persists it on
//! every mutation and publishes each new value to subscribers.
//!
//! All mutations run under one mutex, and with a backing file also under a
//! `<config>.lock` file lock shared with other masw processes. Each one re-reads
//! the file, applies its change and saves, so the daemon's auto-registration and
//! a concurrent `masw set` never overwrite each other. A failed save is reported
//! but the change stays applied in memory.

use color_eyre::eyre::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;

pub struct MappingStore {
    path: Option<PathBuf>,
    current: Mutex<Config>,
    tx: watch::Sender<Config>,
}

impl MappingStore {
    /// Open the store backed by `path`, creating a default config file if missing
    ///
    /// # Errors
    /// Returns an error if the file cannot be created, read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = Config::load_from_path(&path)?;
        Ok(Self::with_path(Some(path), config))
    }

    /// Store without a backing file (saves only update memory)
    #[must_use]
    pub fn in_memory(config: Config) -> Self {
        Self::with_path(None, config)
    }

    fn with_path(path: Option<PathBuf>, config: Config) -> Self {
        let (tx, _) = watch::channel(config.clone());
        Self {
            path,
            current: Mutex::new(config),
            tx,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current configuration
    #[must_use]
    pub fn current(&self) -> Config {
        self.lock().clone()
    }

    /// Live sequence of configurations. The receiver starts with the current value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Replace the whole configuration
    ///
    /// # Errors
    /// Returns an error if the config is invalid or cannot be written. An invalid
    /// config is rejected without touching memory; a write failure keeps it in memory.
    pub fn save(&self, config: Config) -> Result<()> {
        config.validate()?;
        self.update(|current| {
            if *current == config {
                return false;
            }
            *current = config;
            true
        })
        .map(|_| ())
    }

    /// Map `monitor` to `device` (empty device = don't switch)
    ///
    /// # Errors
    /// Returns an error if the change cannot be written.
    pub fn set_device(&self, monitor: &str, device: &str) -> Result<bool> {
        self.update(|config| {
            if config.device_for(monitor) == Some(device) {
                return false;
            }
            config
                .monitors
                .insert(monitor.to_string(), device.to_string());
            true
        })
    }

    /// Turn auto-switching on or off
    ///
    /// # Errors
    /// Returns an error if the change cannot be written.
    pub fn set_enabled(&self, enabled: bool) -> Result<bool> {
        self.update(|config| {
            if config.settings.enabled == enabled {
                return false;
            }
            config.settings.enabled = enabled;
            true
        })
    }

    /// Add monitors missing from the mapping with an empty device
    ///
    /// Existing keys are never touched, including ones explicitly set to "".
    /// Returns the names that were added.
    ///
    /// # Errors
    /// Returns an error if the change cannot be written.
    pub fn register_monitors<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<String>> {
        let mut added = Vec::new();
        self.update(|config| {
            for name in names {
                if !config.monitors.contains_key(name) {
                    config.monitors.insert(name.to_string(), String::new());
                    added.push(name.to_string());
                }
            }
            !added.is_empty()
        })?;
        Ok(added)
    }

    /// Re-read the backing file (after an external edit) and publish it if it differs
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed; memory is left untouched.
    pub fn reload(&self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let Some(config) = read_config(path)? else {
            return Ok(false);
        };

        let mut current = self.lock();
        if *current == config {
            return Ok(false);
        }
        info!("Config reloaded from {}", path.display());
        *current = config.clone();
        self.tx.send_replace(config);
        Ok(true)
    }

    /// Apply `mutate` to the latest config; if it reports a change, publish and save
    ///
    /// With a backing file the whole step runs under the config lock file: the
    /// file is re-read first so an edit made by another process (a CLI command
    /// while the daemon runs) is merged instead of overwritten.
    fn update(&self, mutate: impl FnOnce(&mut Config) -> bool) -> Result<bool> {
        let mut current = self.lock();
        let Some(path) = &self.path else {
            if !mutate(&mut current) {
                return Ok(false);
            }
            self.tx.send_replace(current.clone());
            return Ok(true);
        };

        let _file_lock = lock_config_file(path)?;

        let mut reloaded = false;
        let unreadable = match read_config(path) {
            Ok(Some(on_disk)) => {
                if *current != on_disk {
                    *current = on_disk;
                    reloaded = true;
                }
                None
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };

        let changed = mutate(&mut current);
        if reloaded || changed {
            self.tx.send_replace(current.clone());
        }
        if !changed {
            return Ok(false);
        }

        // A half-finished manual edit is not clobbered
        if let Some(e) = unreadable {
            return Err(e.wrap_err("Settings change kept in memory but not saved"));
        }
        current
            .save_to_path(path)
            .wrap_err("Settings change kept in memory but not saved")?;
        debug!("Saved config to {}", path.display());
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, Config> {
        // A panic while holding the lock aborts the process, so poisoning is not recoverable state
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Watch the backing file and reload it on external edits
    ///
    /// The returned watcher must be kept alive for as long as reloading is wanted.
    ///
    /// # Errors
    /// Returns an error if the store has no backing file or the watcher cannot be created.
    pub fn watch_file(self: &Arc<Self>) -> Result<notify::RecommendedWatcher> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| color_eyre::eyre::eyre!("Store has no backing file to watch"))?;
        let watch_dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| color_eyre::eyre::eyre!("Config file has no parent directory"))?;

        let store = Arc::clone(self);
        let file_name = path.file_name().map(ToOwned::to_owned);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Config watcher error: {}", e);
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            // Watching the directory (editors replace files), so filter to our file
            if !event
                .paths
                .iter()
                .any(|p| p.file_name().map(ToOwned::to_owned) == file_name)
            {
                return;
            }
            if let Err(e) = store.reload() {
                warn!("Ignoring config change: {:#}", e);
            }
        })
        .context("Failed to create config file watcher")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", watch_dir.display()))?;

        Ok(watcher)
    }
}

/// Exclusive lock shared by every process editing `path`, released on drop
fn lock_config_file(path: &Path) -> Result<File> {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".lock");
    let lock_path = path.with_file_name(name);
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open config lock: {}", lock_path.display()))?;
    file.lock()
        .with_context(|| format!("Failed to lock config: {}", lock_path.display()))?;
    Ok(file)
}

/// Current file contents; `None` when the file does not exist
fn read_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config =
        Config::parse(&contents).with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(Some(config))
}
