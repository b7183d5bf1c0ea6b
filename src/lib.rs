//! `MASW` - Monitor Audio Switcher
//!
//! Switches the default playback device to follow the monitor that holds the
//! foreground window. Each monitor (by the name shown in the display settings) is
//! mapped to a playback device (by the name shown in the Sound control panel).
//!
//! # Features
//! - Debounced focus tracking (plugging in a display briefly steals focus)
//! - Automatic registration of newly connected monitors in the config
//! - Live config reload, enable/disable without restarting
//! - JSON output for scripting
//!
//! OS integration is implemented for Windows. On other platforms only the
//! config commands work.

pub mod audio;
pub mod cli;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod debounce;
pub mod display;
pub mod engine;
pub mod focus;
pub mod instance;
pub mod logging;
pub mod notification;
pub mod platform;
pub mod store;
pub mod style;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types for convenience
pub use cli::Args;
pub use config::Config;
pub use engine::{RoutingEngine, RoutingState, SwitchRequest};
pub use store::MappingStore;
