//! CLI commands
//!
//! Query commands enumerate monitors and devices directly through the OS
//! backends. Mapping commands go through the [`MappingStore`] so they write the
//! file atomically; a running daemon picks the change up from its file watcher.

use color_eyre::eyre::{self, Result};
use crossterm::style::Stylize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::audio::{DeviceRegistry, normalize_device_names};
use crate::config::Config;
use crate::display::Monitor;
use crate::instance::InstanceLock;
use crate::notification;
use crate::platform;
use crate::store::MappingStore;
use crate::style::MaswStyle;

/// Config path from `--config`, or the default location
///
/// # Errors
/// Returns an error if the default config directory cannot be determined.
pub fn resolve_config_path(arg: Option<PathBuf>) -> Result<PathBuf> {
    match arg {
        Some(path) => Ok(path),
        None => Config::get_config_path(),
    }
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusReport {
    pub config_path: String,
    pub daemon_running: bool,
    pub enabled: bool,
    pub mapping: Vec<MappingEntry>,
    /// `None` when monitors cannot be enumerated on this platform
    pub connected_monitors: Option<Vec<Monitor>>,
    pub devices: Option<Vec<String>>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MappingEntry {
    pub monitor: String,
    /// Empty means "don't switch"
    pub device: String,
    pub connected: Option<bool>,
    pub device_available: Option<bool>,
}

/// Combine the mapping with whatever the OS could tell us
#[must_use]
pub fn build_status(
    config: &Config,
    config_path: &Path,
    daemon_running: bool,
    monitors: Option<Vec<Monitor>>,
    devices: Option<Vec<String>>,
) -> StatusReport {
    let mapping = config
        .monitors
        .iter()
        .map(|(monitor, device)| MappingEntry {
            monitor: monitor.clone(),
            device: device.clone(),
            connected: monitors
                .as_ref()
                .map(|m| m.iter().any(|m| m.friendly_name == *monitor)),
            device_available: devices
                .as_ref()
                .filter(|_| !device.is_empty())
                .map(|d| d.contains(device)),
        })
        .collect();

    StatusReport {
        config_path: config_path.display().to_string(),
        daemon_running,
        enabled: config.settings.enabled,
        mapping,
        connected_monitors: monitors,
        devices,
    }
}

/// Show the mapping alongside connected monitors and playback devices
///
/// Works without OS backends; the live parts are then left out.
///
/// # Errors
/// Returns an error if the config cannot be loaded or JSON serialization fails.
pub fn status(config_path: &Path, json_output: bool) -> Result<()> {
    let config = Config::load_from_path(config_path)?;

    let (monitors, devices) = match platform::backends() {
        Ok((displays, audio)) => (
            Some(displays.list_monitors()),
            Some(normalize_device_names(audio.list_playback_devices())),
        ),
        Err(e) => {
            warn!("{:#}", e);
            (None, None)
        }
    };

    let report = build_status(
        &config,
        config_path,
        InstanceLock::is_held(),
        monitors,
        devices,
    );

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Daemon".header());
    println!("{}", "-".repeat(6));
    if report.daemon_running {
        println!("{}", "running".success());
    } else {
        println!("{}", "not running".warning());
    }

    println!("\n{}", "Switching".header());
    println!("{}", "-".repeat(9));
    if report.enabled {
        println!("{}", "enabled".success());
    } else {
        println!("{}", "disabled".warning());
    }

    println!("\n{}", "MAPPING:".header());
    println!("{}", "-".repeat(8));
    if report.mapping.is_empty() {
        println!("  {}", "(none yet, monitors are added when the daemon sees them)".dim());
    }
    for entry in &report.mapping {
        let device = if entry.device.is_empty() {
            "(don't switch)".dim().to_string()
        } else {
            match entry.device_available {
                Some(false) => format!("{} {}", entry.device, "(not connected)".error()),
                _ => entry.device.clone(),
            }
        };
        let marker = if entry.connected == Some(true) { "* " } else { "  " };
        println!("{}{} → {}", marker, entry.monitor.as_str().bold(), device);
    }

    if let Some(monitors) = &report.connected_monitors {
        println!("\n{}", "CONNECTED MONITORS:".header());
        println!("{}", "-".repeat(19));
        print_monitors(monitors);
        println!("\n  {} = connected", "*".dim());
    }

    if let Some(devices) = &report.devices {
        println!("\n{}", "PLAYBACK DEVICES:".header());
        println!("{}", "-".repeat(17));
        print_devices(devices);
    }

    println!("\n{} {}", "Config:".dim(), report.config_path);
    Ok(())
}

fn print_monitors(monitors: &[Monitor]) {
    if monitors.is_empty() {
        println!("  {}", "(none)".dim());
    }
    for monitor in monitors {
        println!(
            "  {} {}",
            monitor.friendly_name.as_str().bold(),
            monitor.stable_id.as_str().technical()
        );
    }
}

fn print_devices(devices: &[String]) {
    if devices.is_empty() {
        println!("  {}", "(none)".dim());
    }
    for device in devices {
        println!("  {}", device.as_str().bold());
    }
}

/// Stop the running daemon
///
/// # Errors
/// Returns an error if no daemon is running, the platform is unsupported or the
/// request cannot be delivered.
pub fn stop() -> Result<()> {
    if !platform::request_shutdown()? {
        eyre::bail!("Daemon is not running");
    }
    println!("{}", "Daemon is shutting down".success());
    Ok(())
}

// ============================================================================
// Enumeration
// ============================================================================

/// List connected monitors
///
/// # Errors
/// Returns an error on unsupported platforms or if JSON serialization fails.
pub fn list_monitors(json_output: bool) -> Result<()> {
    let (displays, _) = platform::backends()?;
    let monitors = displays.list_monitors();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&monitors)?);
    } else {
        println!("{}", "CONNECTED MONITORS:".header());
        println!("{}", "-".repeat(19));
        print_monitors(&monitors);
    }
    Ok(())
}

/// List active playback devices
///
/// # Errors
/// Returns an error on unsupported platforms or if JSON serialization fails.
pub fn list_devices(json_output: bool) -> Result<()> {
    let (_, audio) = platform::backends()?;
    let devices = normalize_device_names(audio.list_playback_devices());

    if json_output {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        println!("{}", "PLAYBACK DEVICES:".header());
        println!("{}", "-".repeat(17));
        print_devices(&devices);
    }
    Ok(())
}

// ============================================================================
// Mapping
// ============================================================================

/// Map `monitor` to `device`; `None` means never switch for it
///
/// # Errors
/// Returns an error if the monitor name is empty or the config cannot be saved.
pub fn set(config_path: &Path, monitor: &str, device: Option<&str>) -> Result<()> {
    let monitor = monitor.trim();
    if monitor.is_empty() {
        eyre::bail!("Monitor name must not be empty");
    }
    let device = device.map(str::trim).unwrap_or_default();

    let store = MappingStore::open(config_path)?;

    // Only a hint: the device may simply be unplugged right now
    if !device.is_empty()
        && let Ok((_, audio)) = platform::backends()
        && !audio.list_playback_devices().iter().any(|d| d == device)
    {
        println!(
            "{} '{}' is not an active playback device right now",
            "Note:".warning(),
            device
        );
    }

    if !store.set_device(monitor, device)? {
        println!("Unchanged: {}", describe_mapping(monitor, device));
        return Ok(());
    }
    println!("{} {}", "Saved:".success(), describe_mapping(monitor, device));
    Ok(())
}

fn describe_mapping(monitor: &str, device: &str) -> String {
    if device.is_empty() {
        format!("{monitor} → (don't switch)")
    } else {
        format!("{monitor} → {device}")
    }
}

/// Turn switching on or off
///
/// # Errors
/// Returns an error if the config cannot be loaded or saved.
pub fn set_enabled(config_path: &Path, enabled: bool) -> Result<()> {
    let store = MappingStore::open(config_path)?;
    store.set_enabled(enabled)?;
    print_enabled(enabled);
    Ok(())
}

/// Flip switching on/off
///
/// # Errors
/// Returns an error if the config cannot be loaded or saved.
pub fn toggle(config_path: &Path) -> Result<()> {
    let store = MappingStore::open(config_path)?;
    let enabled = !store.current().settings.enabled;
    store.set_enabled(enabled)?;
    print_enabled(enabled);
    Ok(())
}

fn print_enabled(enabled: bool) {
    if enabled {
        println!("Switching {}", "enabled".success());
    } else {
        println!("Switching {}", "disabled".warning());
    }
}

/// Set the default playback device once, regardless of focus
///
/// # Errors
/// Returns an error on unsupported platforms, or if the device is unknown or the
/// switch fails.
pub fn switch(config_path: &Path, device: &str) -> Result<()> {
    let config = Config::load_from_path(config_path)?;
    let (_, audio) = platform::backends()?;
    let registry = DeviceRegistry::new(audio);

    if let Err(e) = registry.switch_to(device) {
        eyre::bail!("{e}. Available: {}", registry.current().join(", "));
    }
    println!("{} {}", "Switched to:".success(), device.bold());

    if config.settings.notify_switch
        && let Err(e) = notification::send_notification(
            "Audio Output",
            device,
            Some(notification::device_icon(device)),
        )
    {
        warn!("Notification failed: {:#}", e);
    }
    Ok(())
}

/// Validate the config file and print a summary
///
/// # Errors
/// Returns an error if the config cannot be read, parsed or validated.
pub fn validate(config_path: &Path) -> Result<()> {
    let config = Config::load_from_path(config_path)?;
    config.print_summary();
    println!("\n{} {}", "Config:".dim(), config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::monitor;
    use pretty_assertions::assert_eq;

    fn config() -> Config {
        let mut config = Config::default();
        config.monitors.insert("A".to_string(), "Speakers".to_string());
        config.monitors.insert("B".to_string(), String::new());
        config.monitors.insert("C".to_string(), "Headphones".to_string());
        config
    }

    #[test]
    fn test_build_status_marks_connection_and_availability() {
        let report = build_status(
            &config(),
            Path::new("config.toml"),
            true,
            Some(vec![monitor(1, "A"), monitor(2, "B")]),
            Some(vec!["Speakers".to_string()]),
        );

        assert!(report.daemon_running);
        assert_eq!(
            report.mapping,
            vec![
                MappingEntry {
                    monitor: "A".to_string(),
                    device: "Speakers".to_string(),
                    connected: Some(true),
                    device_available: Some(true),
                },
                MappingEntry {
                    monitor: "B".to_string(),
                    device: String::new(),
                    connected: Some(true),
                    device_available: None,
                },
                MappingEntry {
                    monitor: "C".to_string(),
                    device: "Headphones".to_string(),
                    connected: Some(false),
                    device_available: Some(false),
                },
            ]
        );
    }

    #[test]
    fn test_build_status_without_backends() {
        let report = build_status(&config(), Path::new("config.toml"), false, None, None);

        assert!(report.connected_monitors.is_none());
        assert!(report.mapping.iter().all(|e| e.connected.is_none()));
        assert!(report.mapping.iter().all(|e| e.device_available.is_none()));
    }

    #[test]
    fn test_set_writes_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        set(&path, " LG TV ", Some("TV")).unwrap();
        set(&path, "Projector", None).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.device_for("LG TV"), Some("TV"));
        assert_eq!(config.device_for("Projector"), Some(""));
    }

    #[test]
    fn test_set_rejects_blank_monitor() {
        let dir = tempfile::tempdir().unwrap();
        assert!(set(&dir.path().join("config.toml"), "  ", Some("TV")).is_err());
    }

    #[test]
    fn test_toggle_flips_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        toggle(&path).unwrap();
        assert!(!Config::load_from_path(&path).unwrap().settings.enabled);
        toggle(&path).unwrap();
        assert!(Config::load_from_path(&path).unwrap().settings.enabled);
    }
}
