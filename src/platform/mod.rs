//! OS integration
//!
//! Everything the daemon needs from the OS comes through here: the display and
//! audio backends, and one channel carrying OS notifications. Callbacks fire on
//! OS-owned threads and are forwarded as [`PlatformEvent`]s, so only the daemon
//! loop ever touches routing state.
//!
//! Only Windows has backends. Elsewhere [`start`] and [`backends`] fail, which
//! keeps the config-only commands usable for editing a mapping by hand.

#[cfg(windows)]
pub(crate) mod windows;

use color_eyre::eyre::Result;
use tokio::sync::mpsc;

use crate::audio::AudioEndpoints;
use crate::display::DisplayTopology;

/// Notification from an OS callback thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The foreground window changed or moved; it sits on the monitor with this GDI device name
    Foreground { device_name: String },
    /// Display settings changed (monitor plugged, unplugged, rearranged)
    DisplaysChanged,
    /// A playback endpoint was added, removed, changed state or was renamed
    DevicesChanged,
    /// The session is ending or the listener window was closed
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<PlatformEvent>;

/// Running OS integration
pub struct Platform {
    pub displays: Box<dyn DisplayTopology>,
    pub audio: Box<dyn AudioEndpoints>,
    pub events: mpsc::UnboundedReceiver<PlatformEvent>,
    /// Hooks, listener window and endpoint callback. Dropping this tears them all down.
    pub registrations: Box<dyn Send>,
}

/// Install the OS hooks and start forwarding notifications
///
/// # Errors
/// Returns an error if any registration fails (nothing stays registered in that
/// case) or the platform is unsupported.
pub fn start() -> Result<Platform> {
    #[cfg(windows)]
    {
        let (tx, events) = mpsc::unbounded_channel();
        let thread = windows::MessageThread::spawn(tx)?;
        let (displays, audio) = backends()?;
        Ok(Platform {
            displays,
            audio,
            events,
            registrations: Box::new(thread),
        })
    }

    #[cfg(not(windows))]
    {
        Err(unsupported())
    }
}

/// Display and audio backends for one-shot queries (no hooks)
///
/// # Errors
/// Returns an error on unsupported platforms.
pub fn backends() -> Result<(Box<dyn DisplayTopology>, Box<dyn AudioEndpoints>)> {
    #[cfg(windows)]
    {
        Ok((
            Box::new(crate::display::windows::DisplayConfig),
            Box::new(crate::audio::windows::CoreAudio),
        ))
    }

    #[cfg(not(windows))]
    {
        Err(unsupported())
    }
}

/// Ask the running daemon to shut down
///
/// Returns `false` if no daemon is running.
///
/// # Errors
/// Returns an error on unsupported platforms or if the request cannot be delivered.
pub fn request_shutdown() -> Result<bool> {
    #[cfg(windows)]
    {
        crate::display::windows::close_listener_window()
    }

    #[cfg(not(windows))]
    {
        Err(unsupported())
    }
}

#[cfg(not(windows))]
fn unsupported() -> color_eyre::eyre::Report {
    color_eyre::eyre::eyre!(
        "unsupported platform: monitor and audio device access is only implemented for Windows"
    )
}
