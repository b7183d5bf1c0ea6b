//! Audio endpoint registry
//!
//! Lists active playback (render) endpoints by display name, republishes the list
//! when endpoints are added, removed, change state or get renamed, and switches the
//! OS default playback device.
//!
//! Devices are identified by their display name only, the same name the Sound
//! control panel shows. Two endpoints sharing a name are treated as one device.

#[cfg(windows)]
pub(crate) mod windows;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

/// Display name used when an endpoint's description cannot be read
pub const UNKNOWN_DEVICE_NAME: &str = "<Unknown>";

/// Why a default device switch did not happen
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwitchError {
    /// No active playback endpoint has the requested display name. Nothing was changed.
    #[error("no active playback device named '{0}'")]
    DeviceNotFound(String),
    /// The OS rejected the change or the endpoint could not be queried
    #[error("failed to set default playback device '{device}': {message}")]
    Os { device: String, message: String },
}

/// OS audio endpoint access
pub trait AudioEndpoints: Send {
    /// Display names of the active playback endpoints, in enumeration order.
    /// OS failures are logged by the implementation and yield an empty list.
    fn list_playback_devices(&self) -> Vec<String>;

    /// Make the first active endpoint named `name` the default playback device
    ///
    /// # Errors
    /// [`SwitchError::DeviceNotFound`] if no active endpoint has that name (no OS
    /// state is touched), [`SwitchError::Os`] if the OS call fails.
    fn set_default_playback_device(&self, name: &str) -> Result<(), SwitchError>;
}

/// Sort and de-duplicate device names for publishing
#[must_use]
pub fn normalize_device_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort();
    names.dedup();
    names
}

/// Live, sorted list of playback device names plus the switch operation
///
/// Enumerates once on construction so subscribers always see a defined value.
pub struct DeviceRegistry {
    endpoints: Box<dyn AudioEndpoints>,
    tx: watch::Sender<Vec<String>>,
}

impl DeviceRegistry {
    pub fn new(endpoints: Box<dyn AudioEndpoints>) -> Self {
        let initial = normalize_device_names(endpoints.list_playback_devices());
        info!("Playback devices: {:?}", initial);
        let (tx, _) = watch::channel(initial);
        Self { endpoints, tx }
    }

    /// Re-enumerate and publish if the ordered list differs from the last published one
    ///
    /// Sequence equality, so a rename that changes the sort order is a change.
    /// Returns whether a new value was published.
    pub fn refresh(&self) -> bool {
        let devices = normalize_device_names(self.endpoints.list_playback_devices());
        let changed = self.tx.send_if_modified(|current| {
            if *current == devices {
                false
            } else {
                *current = devices;
                true
            }
        });

        if changed {
            info!("Playback devices: {:?}", *self.tx.borrow());
        } else {
            debug!("Endpoint change reported, device list unchanged");
        }
        changed
    }

    #[must_use]
    pub fn current(&self) -> Vec<String> {
        self.tx.borrow().clone()
    }

    /// Subscribe to device list changes. The receiver starts with the current list.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.tx.subscribe()
    }

    /// Switch the OS default playback device by display name
    ///
    /// # Errors
    /// See [`AudioEndpoints::set_default_playback_device`].
    pub fn switch_to(&self, name: &str) -> Result<(), SwitchError> {
        info!("Switching to {}", name);
        self.endpoints.set_default_playback_device(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeAudio;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(vec!["Speakers", "Speakers"], vec!["Speakers"])]
    #[case(vec!["TV", "Headphones", "Speakers"], vec!["Headphones", "Speakers", "TV"])]
    #[case(vec!["b", "a", "b", "a"], vec!["a", "b"])]
    #[case(vec![], vec![])]
    fn test_normalize_device_names(#[case] input: Vec<&str>, #[case] expected: Vec<&str>) {
        let normalized = normalize_device_names(input.into_iter().map(String::from));
        assert_eq!(normalized, expected);
    }

    #[test]
    fn test_duplicate_endpoints_published_once() {
        let audio = FakeAudio::new(&["Speakers", "Speakers"]);
        let registry = DeviceRegistry::new(Box::new(audio.clone()));
        let mut rx = registry.subscribe();

        assert_eq!(*rx.borrow_and_update(), vec!["Speakers".to_string()]);

        // Same duplicate set again: nothing new to publish
        assert!(!registry.refresh());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_rename_that_reorders_is_a_change() {
        let audio = FakeAudio::new(&["Headphones", "Speakers"]);
        let registry = DeviceRegistry::new(Box::new(audio.clone()));

        audio.set_devices(&["Speakers", "Another Headphones"]);
        assert!(registry.refresh());
        assert_eq!(
            registry.current(),
            vec!["Another Headphones".to_string(), "Speakers".to_string()]
        );
    }

    #[test]
    fn test_switch_to_unknown_device_reports_not_found() {
        let audio = FakeAudio::new(&["Speakers"]);
        let registry = DeviceRegistry::new(Box::new(audio.clone()));

        let result = registry.switch_to("TV");

        assert_eq!(result, Err(SwitchError::DeviceNotFound("TV".to_string())));
        assert!(audio.switched().is_empty());
    }

    #[test]
    fn test_switch_to_known_device() {
        let audio = FakeAudio::new(&["Speakers", "TV"]);
        let registry = DeviceRegistry::new(Box::new(audio.clone()));

        registry.switch_to("TV").unwrap();
        assert_eq!(audio.switched(), vec!["TV".to_string()]);
    }
}
