//! Display topology
//!
//! Enumerates the active display outputs and republishes the list whenever the OS
//! reports a display configuration change. Only value changes reach subscribers.

#[cfg(windows)]
pub(crate) mod windows;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

/// Name used when neither EDID nor the device registry yields a display name
pub const UNKNOWN_MONITOR_NAME: &str = "Unknown";

/// A connected display output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Monitor {
    /// OS source identifier (GDI device name such as `\\.\DISPLAY1`), stable while connected
    pub stable_id: String,
    /// Name shown in the display settings, used as the mapping key
    pub friendly_name: String,
}

impl Monitor {
    #[must_use]
    pub fn new(stable_id: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            stable_id: stable_id.into(),
            friendly_name: friendly_name.into(),
        }
    }
}

/// Source of the current display topology
pub trait DisplayTopology: Send {
    /// List active displays. OS failures are logged by the implementation and yield
    /// an empty list; callers treat that as "no known monitors", never as a retry signal.
    fn list_monitors(&self) -> Vec<Monitor>;
}

/// Pick a monitor's display name: EDID name, then the device registry name, then `"Unknown"`
///
/// The registry lookup only runs when the EDID name is missing or blank.
pub fn resolve_friendly_name(
    edid_name: Option<&str>,
    registry_name: impl FnOnce() -> Option<String>,
) -> String {
    if let Some(name) = edid_name.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    registry_name()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN_MONITOR_NAME.to_string())
}

/// Live list of connected monitors
///
/// Enumerates once on construction so subscribers always see a defined value.
pub struct ConnectedMonitors {
    topology: Box<dyn DisplayTopology>,
    tx: watch::Sender<Vec<Monitor>>,
}

impl ConnectedMonitors {
    pub fn new(topology: Box<dyn DisplayTopology>) -> Self {
        let initial = topology.list_monitors();
        info!("Connected monitors: {}", describe(&initial));
        let (tx, _) = watch::channel(initial);
        Self { topology, tx }
    }

    /// Re-enumerate and publish if the list differs from the last published one
    ///
    /// Returns whether a new value was published.
    pub fn refresh(&self) -> bool {
        let monitors = self.topology.list_monitors();
        let changed = self.tx.send_if_modified(|current| {
            if *current == monitors {
                false
            } else {
                *current = monitors;
                true
            }
        });

        if changed {
            info!("Connected monitors: {}", describe(&self.tx.borrow()));
        } else {
            debug!("Display change reported, monitor list unchanged");
        }
        changed
    }

    #[must_use]
    pub fn current(&self) -> Vec<Monitor> {
        self.tx.borrow().clone()
    }

    /// Subscribe to monitor list changes. The receiver starts with the current list.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Monitor>> {
        self.tx.subscribe()
    }
}

fn describe(monitors: &[Monitor]) -> String {
    if monitors.is_empty() {
        return "(none)".to_string();
    }
    monitors
        .iter()
        .map(|m| format!("{} ({})", m.friendly_name, m.stable_id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeDisplays;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resolve_friendly_name_prefers_edid() {
        let name = resolve_friendly_name(Some("DELL U2720Q"), || {
            panic!("registry should not be queried when EDID has a name")
        });
        assert_eq!(name, "DELL U2720Q");
    }

    #[test]
    fn test_resolve_friendly_name_blank_edid_falls_back_to_registry() {
        let name = resolve_friendly_name(Some("   "), || Some("Generic PnP Monitor".to_string()));
        assert_eq!(name, "Generic PnP Monitor");
    }

    #[test]
    fn test_resolve_friendly_name_unknown_sentinel() {
        assert_eq!(resolve_friendly_name(None, || None), UNKNOWN_MONITOR_NAME);
        assert_eq!(
            resolve_friendly_name(None, || Some(String::new())),
            UNKNOWN_MONITOR_NAME
        );
    }

    #[test]
    fn test_connected_monitors_initial_value_published() {
        let displays = FakeDisplays::new(vec![Monitor::new(r"\\.\DISPLAY1", "A")]);
        let monitors = ConnectedMonitors::new(Box::new(displays));

        let rx = monitors.subscribe();
        assert_eq!(*rx.borrow(), vec![Monitor::new(r"\\.\DISPLAY1", "A")]);
    }

    #[test]
    fn test_connected_monitors_refresh_only_publishes_changes() {
        let displays = FakeDisplays::new(vec![Monitor::new(r"\\.\DISPLAY1", "A")]);
        let monitors = ConnectedMonitors::new(Box::new(displays.clone()));
        let mut rx = monitors.subscribe();
        rx.mark_unchanged();

        assert!(!monitors.refresh());
        assert!(!rx.has_changed().unwrap());

        displays.set(vec![
            Monitor::new(r"\\.\DISPLAY1", "A"),
            Monitor::new(r"\\.\DISPLAY2", "B"),
        ]);
        assert!(monitors.refresh());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 2);
    }

    #[test]
    fn test_connected_monitors_failed_enumeration_publishes_empty() {
        let displays = FakeDisplays::new(vec![Monitor::new(r"\\.\DISPLAY1", "A")]);
        let monitors = ConnectedMonitors::new(Box::new(displays.clone()));

        displays.set(Vec::new());
        assert!(monitors.refresh());
        assert!(monitors.current().is_empty());
    }
}
