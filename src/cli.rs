//! Command-line interface definitions
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MASW - Monitor Audio Switcher
///
/// Switch the default playback device to follow the monitor holding the focused window.
#[derive(Parser)]
#[command(name = "masw")]
#[command(version)]
#[command(
    about = "Monitor Audio Switcher - Switch the default playback device to follow the focused monitor"
)]
#[command(after_help = "\
BEHAVIOR:
  - The daemon watches which monitor holds the foreground window
  - When focus settles on a monitor, the playback device mapped to it becomes the default
  - Monitors mapped to \"\" (the default for newly connected monitors) never switch
  - Newly connected monitors are added to the config automatically

DAEMON:
  masw                    Run the daemon (same as: masw run)
  masw run --foreground   Run with logs to stderr instead of the log file
  masw stop               Stop the running daemon

QUERY COMMANDS:
  masw status             Show daemon state, mapping, monitors and devices
  masw list-monitors      List connected monitors
  masw list-devices       List active playback devices
  masw validate           Validate the config file

MAPPING COMMANDS:
  masw set MONITOR DEVICE Map a monitor to a playback device
  masw set MONITOR        Never switch for this monitor
  masw enable | disable | toggle
                          Turn switching on or off (a running daemon picks it up)
  masw switch DEVICE      Set the default playback device once

NAMES:
  Monitor names are the ones shown in the display settings.
  Device names are the ones shown in the Sound control panel.")]
pub struct Args {
    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run the daemon (watches focus and switches audio)
    Run {
        /// Log to stderr instead of the log file
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon state, mapping, connected monitors and playback devices
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List connected monitors
    ListMonitors {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List active playback devices
    ListDevices {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Map a monitor to a playback device (omit DEVICE to never switch for it)
    Set {
        /// Monitor name as shown in the display settings
        monitor: String,

        /// Playback device name as shown in the Sound control panel
        device: Option<String>,
    },

    /// Turn automatic switching on
    Enable,

    /// Turn automatic switching off (the daemon keeps running)
    Disable,

    /// Flip automatic switching on/off
    Toggle,

    /// Set the default playback device once
    Switch {
        /// Playback device name
        device: String,
    },

    /// Validate the config file
    Validate,
}
