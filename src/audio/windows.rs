//! Core Audio endpoint access
//!
//! Enumeration and notifications use the public MMDevice API. Changing the default
//! endpoint has no public API; it goes through the undocumented `IPolicyConfig`
//! interface the Sound control panel itself uses.

// COM method names keep their ABI spelling
#![allow(non_snake_case)]

use color_eyre::eyre::{Context, Result};
use std::ffi::c_void;
use tracing::{debug, error, trace};
use windows::Win32::Devices::FunctionDiscovery::PKEY_Device_DeviceDesc;
use windows::Win32::Media::Audio::{
    DEVICE_STATE, DEVICE_STATE_ACTIVE, EDataFlow, ERole, IMMDevice, IMMDeviceEnumerator,
    IMMNotificationClient, IMMNotificationClient_Impl, MMDeviceEnumerator, eConsole,
    eMultimedia, eRender,
};
use windows::Win32::System::Com::{CLSCTX_ALL, CoCreateInstance, CoTaskMemFree, STGM_READ};
use windows::Win32::UI::Shell::PropertiesSystem::PROPERTYKEY;
use windows::core::{
    GUID, HRESULT, IUnknown, IUnknown_Vtbl, PCWSTR, PROPVARIANT, implement, interface,
};

use super::{AudioEndpoints, SwitchError, UNKNOWN_DEVICE_NAME};
use crate::platform::windows::ensure_com;
use crate::platform::{EventSender, PlatformEvent};

const CLSID_POLICY_CONFIG: GUID = GUID::from_u128(0x870af99c_171d_4f9e_af0d_e63df40c2bc9);

/// Undocumented audio policy interface (Windows 7 and later)
///
/// Only `SetDefaultEndpoint` is called; the rest are declared to keep the vtable layout.
#[interface("f8679f50-850a-41cf-9c72-430f290290c8")]
unsafe trait IPolicyConfig: IUnknown {
    fn GetMixFormat(&self, device_id: PCWSTR, format: *mut *mut c_void) -> HRESULT;
    fn GetDeviceFormat(&self, device_id: PCWSTR, default: i32, format: *mut *mut c_void)
    -> HRESULT;
    fn ResetDeviceFormat(&self, device_id: PCWSTR) -> HRESULT;
    fn SetDeviceFormat(
        &self,
        device_id: PCWSTR,
        endpoint_format: *const c_void,
        mix_format: *const c_void,
    ) -> HRESULT;
    fn GetProcessingPeriod(
        &self,
        device_id: PCWSTR,
        default: i32,
        default_period: *mut i64,
        min_period: *mut i64,
    ) -> HRESULT;
    fn SetProcessingPeriod(&self, device_id: PCWSTR, period: *const i64) -> HRESULT;
    fn GetShareMode(&self, device_id: PCWSTR, mode: *mut c_void) -> HRESULT;
    fn SetShareMode(&self, device_id: PCWSTR, mode: *const c_void) -> HRESULT;
    fn GetPropertyValue(
        &self,
        device_id: PCWSTR,
        key: *const PROPERTYKEY,
        value: *mut PROPVARIANT,
    ) -> HRESULT;
    fn SetPropertyValue(
        &self,
        device_id: PCWSTR,
        key: *const PROPERTYKEY,
        value: *const PROPVARIANT,
    ) -> HRESULT;
    fn SetDefaultEndpoint(&self, device_id: PCWSTR, role: ERole) -> HRESULT;
    fn SetEndpointVisibility(&self, device_id: PCWSTR, visible: i32) -> HRESULT;
}

/// Playback endpoints through `IMMDeviceEnumerator`
///
/// Holds no COM pointers; each call creates its own enumerator so the backend
/// can be used from whichever runtime thread the daemon loop is on.
pub(crate) struct CoreAudio;

impl AudioEndpoints for CoreAudio {
    fn list_playback_devices(&self) -> Vec<String> {
        match active_render_endpoints() {
            Ok(endpoints) => endpoints.iter().map(display_name).collect(),
            Err(e) => {
                error!("Failed to enumerate playback devices: {:#}", e);
                Vec::new()
            }
        }
    }

    fn set_default_playback_device(&self, name: &str) -> Result<(), SwitchError> {
        let os_error = |e: color_eyre::eyre::Report| SwitchError::Os {
            device: name.to_string(),
            message: format!("{e:#}"),
        };

        let endpoints = active_render_endpoints().map_err(os_error)?;
        let device = endpoints
            .iter()
            .find(|device| display_name(device) == name)
            .ok_or_else(|| SwitchError::DeviceNotFound(name.to_string()))?;

        set_default_endpoint(device).map_err(os_error)
    }
}

fn enumerator() -> Result<IMMDeviceEnumerator> {
    ensure_com()?;
    unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
        .context("Failed to create MMDeviceEnumerator")
}

fn active_render_endpoints() -> Result<Vec<IMMDevice>> {
    let collection = unsafe { enumerator()?.EnumAudioEndpoints(eRender, DEVICE_STATE_ACTIVE) }
        .context("EnumAudioEndpoints failed")?;
    let count = unsafe { collection.GetCount() }.context("IMMDeviceCollection::GetCount failed")?;

    (0..count)
        .map(|i| unsafe { collection.Item(i) }.context("IMMDeviceCollection::Item failed"))
        .collect()
}

/// The name shown in the Sound control panel, e.g. "Speakers"
fn display_name(device: &IMMDevice) -> String {
    let name = unsafe { device.OpenPropertyStore(STGM_READ) }
        .and_then(|store| unsafe { store.GetValue(&PKEY_Device_DeviceDesc) })
        .map(|value| value.to_string());

    match name {
        Ok(name) if !name.is_empty() => name,
        Ok(_) => UNKNOWN_DEVICE_NAME.to_string(),
        Err(e) => {
            debug!("Failed to read endpoint description: {}", e);
            UNKNOWN_DEVICE_NAME.to_string()
        }
    }
}

fn set_default_endpoint(device: &IMMDevice) -> Result<()> {
    let id = unsafe { device.GetId() }.context("IMMDevice::GetId failed")?;
    let policy: Result<IPolicyConfig> =
        unsafe { CoCreateInstance(&CLSID_POLICY_CONFIG, None, CLSCTX_ALL) }
            .context("Failed to create PolicyConfig");

    let result = policy.and_then(|policy| {
        for role in [eConsole, eMultimedia] {
            unsafe { policy.SetDefaultEndpoint(PCWSTR(id.0), role) }
                .ok()
                .with_context(|| format!("SetDefaultEndpoint failed for role {}", role.0))?;
        }
        Ok(())
    });

    unsafe { CoTaskMemFree(Some(id.0 as *const c_void)) };
    result
}

#[implement(IMMNotificationClient)]
struct EndpointNotifications {
    tx: EventSender,
}

impl EndpointNotifications {
    fn changed(&self, reason: &str) {
        trace!("Endpoint notification: {}", reason);
        // Receiver gone means the daemon is shutting down
        let _ = self.tx.send(PlatformEvent::DevicesChanged);
    }
}

impl IMMNotificationClient_Impl for EndpointNotifications_Impl {
    fn OnDeviceStateChanged(&self, _device_id: &PCWSTR, _state: DEVICE_STATE) -> windows::core::Result<()> {
        self.changed("state changed");
        Ok(())
    }

    fn OnDeviceAdded(&self, _device_id: &PCWSTR) -> windows::core::Result<()> {
        self.changed("added");
        Ok(())
    }

    fn OnDeviceRemoved(&self, _device_id: &PCWSTR) -> windows::core::Result<()> {
        self.changed("removed");
        Ok(())
    }

    fn OnDefaultDeviceChanged(
        &self,
        _flow: EDataFlow,
        _role: ERole,
        _default_device_id: &PCWSTR,
    ) -> windows::core::Result<()> {
        Ok(())
    }

    fn OnPropertyValueChanged(&self, _device_id: &PCWSTR, key: &PROPERTYKEY) -> windows::core::Result<()> {
        // Renames only; endpoints fire property changes constantly for volume, formats, etc.
        if *key == PKEY_Device_DeviceDesc {
            self.changed("renamed");
        }
        Ok(())
    }
}

/// Endpoint notification registration, unregistered on drop
pub(crate) struct EndpointWatcher {
    enumerator: IMMDeviceEnumerator,
    client: IMMNotificationClient,
}

impl EndpointWatcher {
    /// # Errors
    /// Returns an error if the enumerator cannot be created or the callback cannot be registered.
    pub fn register(tx: EventSender) -> Result<Self> {
        let enumerator = enumerator()?;
        let client: IMMNotificationClient = EndpointNotifications { tx }.into();
        unsafe { enumerator.RegisterEndpointNotificationCallback(&client) }
            .context("RegisterEndpointNotificationCallback failed")?;
        debug!("Endpoint notifications registered");
        Ok(Self { enumerator, client })
    }
}

impl Drop for EndpointWatcher {
    fn drop(&mut self) {
        if let Err(e) = unsafe {
            self.enumerator
                .UnregisterEndpointNotificationCallback(&self.client)
        } {
            error!("UnregisterEndpointNotificationCallback failed: {}", e);
        }
    }
}
