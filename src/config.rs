//! Configuration management
//!
//! Handles loading, parsing, validating and saving the TOML configuration file.
//! Holds the global settings and the monitor → playback device mapping.

use color_eyre::eyre::{self, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Upper bound for the debounce settings. Anything longer makes switching feel broken.
const MAX_DEBOUNCE_MS: u64 = 5_000;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

// ============================================================================
// Public Configuration Types
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub settings: Settings,
    /// Monitor friendly name → playback device name. An empty device means "don't switch".
    pub monitors: BTreeMap<String, String>,
}

/// Global settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// If false, the daemon keeps running but never switches devices
    pub enabled: bool,
    /// Re-apply the focused monitor's device as soon as switching is re-enabled
    pub reapply_on_enable: bool,
    pub focus_debounce_ms: u64,
    pub topology_debounce_ms: u64,
    pub notify_switch: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            reapply_on_enable: false,
            focus_debounce_ms: 50,
            topology_debounce_ms: 50,
            notify_switch: false,
            log_level: "info".to_string(),
        }
    }
}

// ============================================================================
// Config File (De)serialization (TOML)
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
struct ConfigFile {
    #[serde(default)]
    settings: SettingsFile,
    #[serde(default)]
    monitors: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SettingsFile {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    reapply_on_enable: bool,
    #[serde(default = "default_debounce_ms")]
    focus_debounce_ms: u64,
    #[serde(default = "default_debounce_ms")]
    topology_debounce_ms: u64,
    #[serde(default)]
    notify_switch: bool,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SettingsFile {
    fn from(settings: &Settings) -> Self {
        Self {
            enabled: settings.enabled,
            reapply_on_enable: settings.reapply_on_enable,
            focus_debounce_ms: settings.focus_debounce_ms,
            topology_debounce_ms: settings.topology_debounce_ms,
            notify_switch: settings.notify_switch,
            log_level: settings.log_level.clone(),
        }
    }
}

// ============================================================================
// Config Implementation
// ============================================================================

impl Config {
    /// Load configuration from the default config path, creating it if missing
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined, or the file
    /// cannot be read, parsed or validated.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from an explicit path, creating a default file if missing
    ///
    /// # Errors
    /// Returns an error if the file cannot be created, read, parsed or validated.
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Creating default config at {}", config_path.display());
            Self::create_default_config(config_path)?;
        }

        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Invalid config: {}", config_path.display()))
    }

    /// Parse and validate TOML config contents
    ///
    /// # Errors
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn parse(contents: &str) -> Result<Self> {
        let config_file: ConfigFile =
            toml::from_str(contents).context("Failed to parse config TOML")?;
        Self::from_config_file(config_file)
    }

    fn from_config_file(config_file: ConfigFile) -> Result<Self> {
        let settings = Settings {
            enabled: config_file.settings.enabled,
            reapply_on_enable: config_file.settings.reapply_on_enable,
            focus_debounce_ms: config_file.settings.focus_debounce_ms,
            topology_debounce_ms: config_file.settings.topology_debounce_ms,
            notify_switch: config_file.settings.notify_switch,
            log_level: config_file.settings.log_level,
        };

        let config = Config {
            settings,
            monitors: config_file.monitors,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check settings ranges and mapping keys
    ///
    /// # Errors
    /// Returns a descriptive error for the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        let level = self.settings.log_level.as_str();
        if !VALID_LOG_LEVELS.contains(&level) {
            eyre::bail!("Invalid log_level '{level}'. Must be: error, warn, info, debug, or trace");
        }

        for (name, value) in [
            ("focus_debounce_ms", self.settings.focus_debounce_ms),
            ("topology_debounce_ms", self.settings.topology_debounce_ms),
        ] {
            if value > MAX_DEBOUNCE_MS {
                eyre::bail!("{name} = {value} is too large (maximum {MAX_DEBOUNCE_MS})");
            }
        }

        if self.monitors.keys().any(|k| k.trim().is_empty()) {
            eyre::bail!("Monitor names in [monitors] must not be empty");
        }

        Ok(())
    }

    /// Serialize to TOML
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        let file = ConfigFile {
            settings: SettingsFile::from(&self.settings),
            monitors: self.monitors.clone(),
        };
        toml::to_string_pretty(&file).context("Failed to serialize config")
    }

    /// Write the config to `path` atomically (temp file in the same directory, then rename)
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the file cannot be written.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let contents = self.to_toml()?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write config contents")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Get the config path (`<config_dir>/masw/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the platform config directory is unknown or cannot be created.
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre::eyre!("Could not determine config directory"))?
            .join("masw");
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;
        Ok(config_dir.join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<()> {
        let default_config = r#"# MASW (Monitor Audio Switcher) Configuration
#
# Switches the default playback device to follow the monitor that holds
# the focused window.

[settings]
enabled = true              # Set to false to pause switching without quitting
reapply_on_enable = false   # When re-enabled, switch right away instead of on the next focus change
focus_debounce_ms = 50      # Settle time for focus changes (plugging in a display can briefly steal focus)
topology_debounce_ms = 50   # Settle time before newly connected monitors are added below
notify_switch = false       # Desktop notification on every switch
log_level = "info"          # error, warn, info, debug, trace

# Monitor name -> playback device name
#
# Monitor names are the ones shown in the display settings. Newly connected
# monitors are added here automatically with an empty device ("don't switch").
# Device names are the ones shown in the Sound control panel.
# Find both with: masw status
[monitors]
"#;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config dir: {}", parent.display()))?;
        }
        fs::write(path, default_config)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        eprintln!("Created default config at: {}", path.display());
        eprintln!();
        eprintln!("Next steps:");
        eprintln!("  1. Run 'masw status' to see connected monitors and playback devices");
        eprintln!("  2. Map monitors with 'masw set <MONITOR> <DEVICE>' or edit the file");
        eprintln!("  3. Run 'masw' to start switching");
        eprintln!();

        Ok(())
    }

    /// Device configured for a monitor: `None` if unmapped, `Some("")` if explicitly "don't switch"
    #[must_use]
    pub fn device_for(&self, monitor: &str) -> Option<&str> {
        self.monitors.get(monitor).map(String::as_str)
    }

    /// Print a human-readable summary of the configuration
    pub fn print_summary(&self) {
        println!("✓ Configuration valid\n");

        println!("Settings:");
        println!("  enabled: {}", self.settings.enabled);
        println!("  reapply_on_enable: {}", self.settings.reapply_on_enable);
        println!("  focus_debounce_ms: {}", self.settings.focus_debounce_ms);
        println!("  topology_debounce_ms: {}", self.settings.topology_debounce_ms);
        println!("  notify_switch: {}", self.settings.notify_switch);
        println!("  log_level: {}", self.settings.log_level);

        if self.monitors.is_empty() {
            println!("\nNo monitors configured.");
        } else {
            println!("\nMonitors ({}):", self.monitors.len());
            for (monitor, device) in &self.monitors {
                let device = if device.is_empty() { "(don't switch)" } else { device };
                println!("  {monitor} → {device}");
            }
        }
    }
}
