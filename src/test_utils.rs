//! In-memory OS backends for unit tests

use std::sync::{Arc, Mutex};

use crate::audio::{AudioEndpoints, SwitchError};
use crate::display::{DisplayTopology, Monitor};

/// Display topology whose monitor list tests can swap at will
#[derive(Clone, Default)]
pub(crate) struct FakeDisplays {
    monitors: Arc<Mutex<Vec<Monitor>>>,
}

impl FakeDisplays {
    pub fn new(monitors: Vec<Monitor>) -> Self {
        Self {
            monitors: Arc::new(Mutex::new(monitors)),
        }
    }

    pub fn set(&self, monitors: Vec<Monitor>) {
        *self.monitors.lock().unwrap() = monitors;
    }
}

impl DisplayTopology for FakeDisplays {
    fn list_monitors(&self) -> Vec<Monitor> {
        self.monitors.lock().unwrap().clone()
    }
}

/// Audio endpoints that record every successful switch
#[derive(Clone, Default)]
pub(crate) struct FakeAudio {
    devices: Arc<Mutex<Vec<String>>>,
    switched: Arc<Mutex<Vec<String>>>,
}

impl FakeAudio {
    pub fn new(devices: &[&str]) -> Self {
        let fake = Self::default();
        fake.set_devices(devices);
        fake
    }

    pub fn set_devices(&self, devices: &[&str]) {
        *self.devices.lock().unwrap() = devices.iter().map(|d| (*d).to_string()).collect();
    }

    /// Device names passed to successful switches, oldest first
    pub fn switched(&self) -> Vec<String> {
        self.switched.lock().unwrap().clone()
    }
}

impl AudioEndpoints for FakeAudio {
    fn list_playback_devices(&self) -> Vec<String> {
        self.devices.lock().unwrap().clone()
    }

    fn set_default_playback_device(&self, name: &str) -> Result<(), SwitchError> {
        if !self.devices.lock().unwrap().iter().any(|d| d == name) {
            return Err(SwitchError::DeviceNotFound(name.to_string()));
        }
        self.switched.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Shorthand for a monitor whose stable id is derived from its position
pub(crate) fn monitor(index: usize, name: &str) -> Monitor {
    Monitor::new(format!(r"\\.\DISPLAY{index}"), name)
}
