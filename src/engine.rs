//! Routing decision engine
//!
//! Single owner of [`RoutingState`]. The daemon loop feeds it every change from the
//! four live inputs (connected monitors, playback devices, settings, focus reports)
//! and it answers with what to do: register newly seen monitors in the store, and
//! whether the default playback device should change.
//!
//! The engine never talks to the OS. Switch requests are returned to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::debounce::Debounced;
use crate::display::Monitor;
use crate::focus::FocusTracker;
use crate::store::MappingStore;

/// Latest known value of every input the switch decision depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingState {
    pub connected_monitors: Vec<Monitor>,
    pub available_devices: Vec<String>,
    pub current_monitor: Option<Monitor>,
    pub enabled: bool,
    /// Monitor friendly name → device name ("" = don't switch)
    pub mapping: BTreeMap<String, String>,
}

/// Make `device` the default playback device because focus settled on `monitor`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRequest {
    pub monitor: Monitor,
    pub device: String,
}

pub struct RoutingEngine {
    store: Arc<MappingStore>,
    state: RoutingState,
    focus: FocusTracker,
    topology: Debounced<Vec<Monitor>>,
    reapply_on_enable: bool,
}

impl RoutingEngine {
    #[must_use]
    pub fn new(store: Arc<MappingStore>, config: &Config) -> Self {
        let settings = &config.settings;
        Self {
            store,
            state: RoutingState {
                enabled: settings.enabled,
                mapping: config.monitors.clone(),
                ..RoutingState::default()
            },
            focus: FocusTracker::new(Duration::from_millis(settings.focus_debounce_ms)),
            topology: Debounced::new(Duration::from_millis(settings.topology_debounce_ms)),
            reapply_on_enable: settings.reapply_on_enable,
        }
    }

    #[must_use]
    pub fn state(&self) -> &RoutingState {
        &self.state
    }

    /// New connected-monitor list
    ///
    /// Focus lookups use it right away. Registration of unknown monitors waits for
    /// the topology to settle (hot-plugging reports several intermediate states).
    pub fn on_monitors(&mut self, monitors: Vec<Monitor>, now: Instant) {
        self.state.connected_monitors.clone_from(&monitors);
        self.topology.push(monitors, now);
    }

    /// New playback device list
    pub fn on_devices(&mut self, devices: Vec<String>) {
        for (monitor, device) in &self.state.mapping {
            if !device.is_empty() && !devices.contains(device) {
                debug!("Device '{}' mapped to '{}' is not available", device, monitor);
            }
        }
        self.state.available_devices = devices;
    }

    /// New settings/mapping snapshot from the store
    ///
    /// Returns a switch request only when switching was just re-enabled and
    /// `reapply_on_enable` is set.
    pub fn on_settings(&mut self, config: Config) -> Option<SwitchRequest> {
        let settings = config.settings;
        let was_enabled = self.state.enabled;

        self.state.enabled = settings.enabled;
        self.state.mapping = config.monitors;
        self.reapply_on_enable = settings.reapply_on_enable;
        self.focus
            .set_debounce(Duration::from_millis(settings.focus_debounce_ms));
        self.topology
            .set_window(Duration::from_millis(settings.topology_debounce_ms));

        if was_enabled != settings.enabled {
            info!(
                "Switching {}",
                if settings.enabled { "enabled" } else { "disabled" }
            );
        }

        // Unknown monitors are normally registered once per topology change; an
        // external edit may have dropped some, so re-check against the new mapping.
        self.register_unknown();

        if !was_enabled && settings.enabled && self.reapply_on_enable {
            let monitor = self.state.current_monitor.clone()?;
            return self.decide(&monitor);
        }
        None
    }

    /// Raw focus report: the foreground window now sits on the monitor with this GDI device name
    pub fn on_focus(&mut self, device_name: &str, now: Instant) {
        self.focus
            .report(device_name, &self.state.connected_monitors, now);
    }

    /// Earliest pending debounce deadline, if anything is waiting to settle
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.focus.deadline(), self.topology.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Settle whatever is due at `now`
    pub fn on_timer(&mut self, now: Instant) -> Option<SwitchRequest> {
        if let Some(monitors) = self.topology.poll(now) {
            debug!("Topology settled: {} monitor(s)", monitors.len());
            self.register(&monitors);
        }

        let monitor = self.focus.poll(now)?;
        info!("Focused monitor: {} ({})", monitor.friendly_name, monitor.stable_id);
        self.state.current_monitor = Some(monitor.clone());
        self.decide(&monitor)
    }

    fn register_unknown(&mut self) {
        let Some(monitors) = self.topology.last_emitted().cloned() else {
            return;
        };
        self.register(&monitors);
    }

    fn register(&mut self, monitors: &[Monitor]) {
        let unknown: Vec<&str> = monitors
            .iter()
            .map(|m| m.friendly_name.as_str())
            .filter(|name| !self.state.mapping.contains_key(*name))
            .collect();
        if unknown.is_empty() {
            return;
        }

        // The store merges against its own copy, so a stale local mapping cannot clobber entries
        match self.store.register_monitors(unknown.iter().copied()) {
            Ok(added) => {
                for name in &added {
                    info!("New monitor '{}' added to the mapping", name);
                }
            }
            Err(e) => error!("Failed to save new monitors: {:#}", e),
        }
        // Mirror locally so the next decision sees them even before the store update arrives
        for name in unknown {
            self.state
                .mapping
                .entry(name.to_string())
                .or_default();
        }
    }

    fn decide(&self, monitor: &Monitor) -> Option<SwitchRequest> {
        if !self.state.enabled {
            debug!("Switching disabled, staying put for '{}'", monitor.friendly_name);
            return None;
        }

        match self.state.mapping.get(&monitor.friendly_name) {
            None => {
                info!("No device mapped for monitor '{}'", monitor.friendly_name);
                None
            }
            Some(device) if device.is_empty() => {
                debug!("Monitor '{}' is set to not switch", monitor.friendly_name);
                None
            }
            Some(device) => Some(SwitchRequest {
                monitor: monitor.clone(),
                device: device.clone(),
            }),
        }
    }
}
