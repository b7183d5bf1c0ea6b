//! Daemon mode
//!
//! Wires the OS backends, the mapping store and the routing engine together and
//! runs the single event loop. OS callbacks, live-sequence updates and debounce
//! deadlines all funnel into one `select!`, so routing state has one owner.

use color_eyre::eyre::Result;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::{DeviceRegistry, SwitchError};
use crate::display::ConnectedMonitors;
use crate::engine::{RoutingEngine, SwitchRequest};
use crate::instance::InstanceLock;
use crate::logging;
use crate::notification;
use crate::platform::{self, PlatformEvent};
use crate::store::MappingStore;

/// Run the daemon until Ctrl+C or the session ends
///
/// A second instance exits immediately with success and without output.
///
/// # Errors
/// Returns an error if the config cannot be loaded, logging cannot be set up or
/// the OS hooks cannot be installed.
pub async fn run(config_path: PathBuf, foreground: bool) -> Result<()> {
    let Some(_instance) = InstanceLock::acquire()? else {
        return Ok(());
    };

    let store = Arc::new(MappingStore::open(config_path)?);
    let config = store.current();
    logging::init_daemon(&config.settings.log_level, foreground)?;

    info!("Starting MASW daemon v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = store.path() {
        info!("Config: {}", path.display());
    }
    info!(
        "{} monitor(s) mapped, switching {}",
        config.monitors.len(),
        if config.settings.enabled { "enabled" } else { "disabled" }
    );

    let platform = platform::start()?;
    let monitors = ConnectedMonitors::new(platform.displays);
    let devices = DeviceRegistry::new(platform.audio);

    let _config_watcher = match store.watch_file() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Config file changes won't be picked up: {:#}", e);
            None
        }
    };

    let result = run_loop(store, &monitors, &devices, platform.events, ctrl_c()).await;

    // Unhook and join the OS thread before logging the final line
    drop(platform.registrations);
    info!("Stopped");
    result
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// The event loop
///
/// Watch receivers are polled before OS events so a focus report is always
/// resolved against the latest monitor list and settings.
///
/// # Errors
/// Currently always returns `Ok` once `shutdown` resolves or the OS asks to stop.
pub async fn run_loop(
    store: Arc<MappingStore>,
    monitors: &ConnectedMonitors,
    devices: &DeviceRegistry,
    mut events: UnboundedReceiver<PlatformEvent>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut monitors_rx = monitors.subscribe();
    let mut devices_rx = devices.subscribe();
    let mut settings_rx = store.subscribe();

    let config = settings_rx.borrow_and_update().clone();
    let mut notify_switch = config.settings.notify_switch;
    let mut engine = RoutingEngine::new(Arc::clone(&store), &config);
    engine.on_monitors(monitors_rx.borrow_and_update().clone(), Instant::now());
    engine.on_devices(devices_rx.borrow_and_update().clone());

    tokio::pin!(shutdown);
    info!("Watching focus...");

    loop {
        let deadline = engine.next_deadline();

        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!("Shutting down");
                break;
            }

            Ok(()) = monitors_rx.changed() => {
                let current = monitors_rx.borrow_and_update().clone();
                engine.on_monitors(current, Instant::now());
            }

            Ok(()) = devices_rx.changed() => {
                let current = devices_rx.borrow_and_update().clone();
                engine.on_devices(current);
            }

            Ok(()) = settings_rx.changed() => {
                let config = settings_rx.borrow_and_update().clone();
                notify_switch = config.settings.notify_switch;
                if let Some(request) = engine.on_settings(config) {
                    apply(devices, &request, notify_switch);
                }
            }

            event = events.recv() => match event {
                Some(PlatformEvent::Foreground { device_name }) => {
                    engine.on_focus(&device_name, Instant::now());
                }
                Some(PlatformEvent::DisplaysChanged) => {
                    monitors.refresh();
                }
                Some(PlatformEvent::DevicesChanged) => {
                    devices.refresh();
                }
                Some(PlatformEvent::Shutdown) => {
                    info!("Session ending");
                    break;
                }
                None => {
                    error!("OS event channel closed");
                    break;
                }
            },

            () = sleep_until(deadline) => {
                if let Some(request) = engine.on_timer(Instant::now()) {
                    apply(devices, &request, notify_switch);
                }
            }
        }
    }

    Ok(())
}

/// Sleep until `deadline`, or forever if there is none
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn apply(devices: &DeviceRegistry, request: &SwitchRequest, notify: bool) {
    let monitor = &request.monitor.friendly_name;
    match devices.switch_to(&request.device) {
        Ok(()) => {
            info!("Switched to '{}' for monitor '{}'", request.device, monitor);
            if notify && let Err(e) = notification::notify_switch(&request.device, monitor) {
                warn!("Notification failed: {:#}", e);
            }
        }
        Err(SwitchError::DeviceNotFound(device)) => {
            error!(
                "Monitor '{}' is mapped to '{}', but the available devices are {:?}",
                monitor,
                device,
                devices.current()
            );
        }
        Err(e) => error!("{}", e),
    }
    debug!("Switch for '{}' handled", monitor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_utils::{FakeAudio, FakeDisplays, monitor};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        store: Arc<MappingStore>,
        displays: FakeDisplays,
        audio: FakeAudio,
        monitors: ConnectedMonitors,
        devices: DeviceRegistry,
    }

    impl Harness {
        fn new(mapping: &[(&str, &str)], connected: Vec<crate::display::Monitor>, devices: &[&str]) -> Self {
            let mut config = Config::default();
            for (monitor, device) in mapping {
                config
                    .monitors
                    .insert((*monitor).to_string(), (*device).to_string());
            }
            let displays = FakeDisplays::new(connected);
            let audio = FakeAudio::new(devices);
            Self {
                store: Arc::new(MappingStore::in_memory(config)),
                monitors: ConnectedMonitors::new(Box::new(displays.clone())),
                devices: DeviceRegistry::new(Box::new(audio.clone())),
                displays,
                audio,
            }
        }

        /// Run the loop while `script` drives it; the loop stops when the script finishes
        async fn run<F: Future<Output = ()>>(&self, script: impl FnOnce(mpsc::UnboundedSender<PlatformEvent>) -> F) {
            let (tx, rx) = mpsc::unbounded_channel();
            let stop = tx.clone();
            let driver = async move {
                script(tx).await;
                settle().await;
                let _ = stop.send(PlatformEvent::Shutdown);
            };
            let (result, ()) = tokio::join!(
                run_loop(
                    Arc::clone(&self.store),
                    &self.monitors,
                    &self.devices,
                    rx,
                    std::future::pending()
                ),
                driver
            );
            result.unwrap();
        }
    }

    /// Longer than every default debounce window
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    fn focus(device_name: &str) -> PlatformEvent {
        PlatformEvent::Foreground {
            device_name: device_name.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_switches_to_mapped_device() {
        let h = Harness::new(
            &[("A", "Speakers"), ("B", "TV")],
            vec![monitor(1, "A"), monitor(2, "B")],
            &["Speakers", "TV"],
        );

        h.run(|tx| async move {
            tx.send(focus(r"\\.\DISPLAY2")).unwrap();
            settle().await;
            tx.send(focus(r"\\.\DISPLAY1")).unwrap();
        })
        .await;

        assert_eq!(h.audio.switched(), vec!["TV", "Speakers"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmapped_monitor_is_registered_and_not_switched() {
        let h = Harness::new(
            &[("A", "Speakers")],
            vec![monitor(1, "A"), monitor(2, "B")],
            &["Speakers"],
        );

        h.run(|tx| async move {
            tx.send(focus(r"\\.\DISPLAY2")).unwrap();
        })
        .await;

        assert!(h.audio.switched().is_empty());
        let mapping = h.store.current().monitors;
        assert_eq!(mapping.get("A").map(String::as_str), Some("Speakers"));
        assert_eq!(mapping.get("B").map(String::as_str), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hotplugged_monitor_is_registered() {
        let h = Harness::new(&[("A", "Speakers")], vec![monitor(1, "A")], &["Speakers"]);
        let displays = h.displays.clone();

        h.run(|tx| async move {
            settle().await;
            displays.set(vec![monitor(1, "A"), monitor(2, "LG TV")]);
            tx.send(PlatformEvent::DisplaysChanged).unwrap();
        })
        .await;

        assert_eq!(h.store.current().device_for("LG TV"), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_stops_switching() {
        let h = Harness::new(&[("A", "Speakers")], vec![monitor(1, "A")], &["Speakers"]);
        let store = Arc::clone(&h.store);

        h.run(|tx| async move {
            store.set_enabled(false).unwrap();
            tx.send(focus(r"\\.\DISPLAY1")).unwrap();
        })
        .await;

        assert!(h.audio.switched().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_device_is_skipped() {
        let h = Harness::new(
            &[("A", "Headphones"), ("B", "Speakers")],
            vec![monitor(1, "A"), monitor(2, "B")],
            &["Speakers"],
        );

        h.run(|tx| async move {
            tx.send(focus(r"\\.\DISPLAY1")).unwrap();
            settle().await;
            tx.send(focus(r"\\.\DISPLAY2")).unwrap();
        })
        .await;

        assert_eq!(h.audio.switched(), vec!["Speakers"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_arriving_later_can_be_switched_to() {
        let h = Harness::new(
            &[("A", "Speakers"), ("B", "Headphones")],
            vec![monitor(1, "A"), monitor(2, "B")],
            &["Speakers"],
        );
        let audio = h.audio.clone();

        h.run(|tx| async move {
            audio.set_devices(&["Headphones", "Speakers"]);
            tx.send(PlatformEvent::DevicesChanged).unwrap();
            tx.send(focus(r"\\.\DISPLAY2")).unwrap();
        })
        .await;

        assert_eq!(h.devices.current(), vec!["Headphones", "Speakers"]);
        assert_eq!(h.audio.switched(), vec!["Headphones"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_brief_focus_steal_does_not_switch() {
        let h = Harness::new(
            &[("A", "Speakers"), ("B", "TV")],
            vec![monitor(1, "A"), monitor(2, "B")],
            &["Speakers", "TV"],
        );

        h.run(|tx| async move {
            tx.send(focus(r"\\.\DISPLAY1")).unwrap();
            settle().await;
            tx.send(focus(r"\\.\DISPLAY2")).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(focus(r"\\.\DISPLAY1")).unwrap();
        })
        .await;

        assert_eq!(h.audio.switched(), vec!["Speakers"]);
    }
}
