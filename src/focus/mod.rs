//! Focus-to-monitor resolution
//!
//! The OS hook thread reports the GDI device name of the monitor hosting the
//! foreground window whenever focus changes or a window moves. This module maps
//! that name onto the connected-monitor list and runs the result through the
//! distinct/debounce/distinct filter, yielding "the monitor holding focus".

#[cfg(windows)]
pub(crate) mod windows;

use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, trace};

use crate::debounce::Debounced;
use crate::display::Monitor;

/// Find the connected monitor with the given stable id (GDI device name)
#[must_use]
pub fn resolve_monitor<'a>(device_name: &str, connected: &'a [Monitor]) -> Option<&'a Monitor> {
    connected.iter().find(|m| m.stable_id == device_name)
}

/// Which hook fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Foreground,
    LocationChange,
}

/// The window whose monitor a hook callback should report, if any
///
/// Only window objects count (location changes also fire for the cursor and the
/// caret), and a location change only when it moves the foreground window.
/// `foreground` is asked last and may be `None` while activation is changing.
#[must_use]
pub fn tracked_window<W: PartialEq>(
    event: HookEvent,
    is_window_object: bool,
    hwnd: &W,
    foreground: impl FnOnce() -> Option<W>,
) -> Option<W> {
    if !is_window_object {
        return None;
    }
    let foreground = foreground()?;
    match event {
        HookEvent::Foreground => Some(foreground),
        HookEvent::LocationChange => (*hwnd == foreground).then_some(foreground),
    }
}

/// Debounced "current monitor" tracker
#[derive(Debug)]
pub struct FocusTracker {
    pipeline: Debounced<Monitor>,
}

impl FocusTracker {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            pipeline: Debounced::new(debounce),
        }
    }

    pub fn set_debounce(&mut self, debounce: Duration) {
        self.pipeline.set_window(debounce);
    }

    /// Feed a raw focus report
    ///
    /// A device name missing from `connected` means the monitor cache is stale
    /// relative to what the OS just reported. That is logged and dropped; the next
    /// topology refresh reconciles it.
    pub fn report(&mut self, device_name: &str, connected: &[Monitor], now: Instant) {
        let Some(monitor) = resolve_monitor(device_name, connected) else {
            error!(
                "Foreground window is on {}, but the connected monitors are {:?}",
                device_name, connected
            );
            return;
        };

        if self.pipeline.push(monitor.clone(), now) {
            trace!("Focus moved to {} ({})", monitor.friendly_name, monitor.stable_id);
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.pipeline.deadline()
    }

    /// Emit the settled monitor if the quiet period has passed and it actually changed
    pub fn poll(&mut self, now: Instant) -> Option<Monitor> {
        self.pipeline.poll(now)
    }

    /// The monitor most recently emitted as holding focus
    #[must_use]
    pub fn current(&self) -> Option<&Monitor> {
        self.pipeline.last_emitted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::monitor;
    use test_case::test_case;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test_case(HookEvent::Foreground, true, 7, Some(1) => Some(1); "foreground switch reports new foreground")]
    #[test_case(HookEvent::LocationChange, true, 1, Some(1) => Some(1); "foreground window moved")]
    #[test_case(HookEvent::LocationChange, true, 7, Some(1) => None; "background window moved")]
    #[test_case(HookEvent::LocationChange, false, 1, Some(1) => None; "cursor or caret moved")]
    #[test_case(HookEvent::Foreground, false, 1, Some(1) => None; "non window object")]
    #[test_case(HookEvent::Foreground, true, 1, None => None; "no foreground window")]
    fn test_tracked_window(
        event: HookEvent,
        is_window_object: bool,
        hwnd: u32,
        foreground: Option<u32>,
    ) -> Option<u32> {
        tracked_window(event, is_window_object, &hwnd, || foreground)
    }

    #[test]
    fn test_tracked_window_skips_foreground_lookup_for_other_objects() {
        let mut asked = false;
        let tracked = tracked_window(HookEvent::LocationChange, false, &1, || {
            asked = true;
            Some(1)
        });

        assert_eq!(tracked, None);
        assert!(!asked);
    }

    #[test]
    fn test_report_resolves_by_stable_id() {
        let connected = vec![monitor(1, "A"), monitor(2, "B")];
        let start = Instant::now();
        let mut tracker = FocusTracker::new(WINDOW);

        tracker.report(r"\\.\DISPLAY2", &connected, start);

        assert_eq!(tracker.poll(start + WINDOW), Some(monitor(2, "B")));
        assert_eq!(tracker.current(), Some(&monitor(2, "B")));
    }

    #[test]
    fn test_unknown_device_is_dropped() {
        let connected = vec![monitor(1, "A")];
        let start = Instant::now();
        let mut tracker = FocusTracker::new(WINDOW);

        tracker.report(r"\\.\DISPLAY9", &connected, start);

        assert_eq!(tracker.deadline(), None);
        assert_eq!(tracker.poll(start + WINDOW), None);
    }

    #[test]
    fn test_bursty_reports_collapse_to_one_emission() {
        let connected = vec![monitor(1, "A"), monitor(2, "B")];
        let start = Instant::now();
        let mut tracker = FocusTracker::new(WINDOW);

        // Location-change events fire continuously while a window is dragged
        for i in 0..20 {
            let device = if i < 10 { r"\\.\DISPLAY1" } else { r"\\.\DISPLAY2" };
            tracker.report(device, &connected, start + Duration::from_millis(i * 2));
        }

        assert_eq!(tracker.poll(start + Duration::from_millis(100)), Some(monitor(2, "B")));
        assert_eq!(tracker.poll(start + Duration::from_millis(500)), None);
    }

    #[test]
    fn test_resolve_monitor_misses_return_none() {
        assert!(resolve_monitor(r"\\.\DISPLAY1", &[]).is_none());
    }
}
