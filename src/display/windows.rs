//! Display enumeration (CCD API) and the hidden listener window

use color_eyre::eyre::{Context, Result};
use windows::Win32::Devices::Display::{
    DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME, DISPLAYCONFIG_DEVICE_INFO_GET_TARGET_NAME,
    DISPLAYCONFIG_DEVICE_INFO_HEADER, DISPLAYCONFIG_MODE_INFO, DISPLAYCONFIG_PATH_INFO,
    DISPLAYCONFIG_SOURCE_DEVICE_NAME, DISPLAYCONFIG_TARGET_DEVICE_NAME,
    DisplayConfigGetDeviceInfo, GetDisplayConfigBufferSizes, QDC_ONLY_ACTIVE_PATHS,
    QDC_VIRTUAL_MODE_AWARE, QueryDisplayConfig,
};
use windows::Win32::Foundation::{
    ERROR_INSUFFICIENT_BUFFER, ERROR_SUCCESS, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::Graphics::Gdi::{DISPLAY_DEVICEW, EnumDisplayDevicesW};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, FindWindowW, PostMessageW, RegisterClassW,
    UnregisterClassW,
    WINDOW_EX_STYLE, WINDOW_STYLE, WM_CLOSE, WM_DISPLAYCHANGE, WM_ENDSESSION,
    WM_QUERYENDSESSION, WNDCLASSW,
};
use windows::core::{PCWSTR, w};

use super::{DisplayTopology, Monitor, resolve_friendly_name};
use crate::platform::PlatformEvent;
use crate::platform::windows::emit;
use tracing::{debug, error, trace};

/// Active display paths via `QueryDisplayConfig`
pub(crate) struct DisplayConfig;

impl DisplayTopology for DisplayConfig {
    fn list_monitors(&self) -> Vec<Monitor> {
        match query_active_paths() {
            Ok(paths) => paths.iter().filter_map(monitor_for_path).collect(),
            Err(e) => {
                error!("Failed to enumerate displays: {:#}", e);
                Vec::new()
            }
        }
    }
}

fn query_active_paths() -> Result<Vec<DISPLAYCONFIG_PATH_INFO>> {
    let flags = QDC_ONLY_ACTIVE_PATHS | QDC_VIRTUAL_MODE_AWARE;
    loop {
        let mut path_count = 0u32;
        let mut mode_count = 0u32;
        unsafe { GetDisplayConfigBufferSizes(flags, &mut path_count, &mut mode_count) }
            .ok()
            .context("GetDisplayConfigBufferSizes failed")?;

        let mut paths = vec![DISPLAYCONFIG_PATH_INFO::default(); path_count as usize];
        let mut modes = vec![DISPLAYCONFIG_MODE_INFO::default(); mode_count as usize];
        let status = unsafe {
            QueryDisplayConfig(
                flags,
                &mut path_count,
                paths.as_mut_ptr(),
                &mut mode_count,
                modes.as_mut_ptr(),
                None,
            )
        };

        // Topology changed between the two calls
        if status == ERROR_INSUFFICIENT_BUFFER {
            continue;
        }
        status.ok().context("QueryDisplayConfig failed")?;

        paths.truncate(path_count as usize);
        return Ok(paths);
    }
}

fn monitor_for_path(path: &DISPLAYCONFIG_PATH_INFO) -> Option<Monitor> {
    let gdi_name = match source_gdi_name(path) {
        Ok(name) => name,
        Err(e) => {
            error!("Failed to read display source name: {:#}", e);
            return None;
        }
    };

    let edid_name = match target_friendly_name(path) {
        Ok(name) => name,
        Err(e) => {
            error!("Failed to read display target name for {}: {:#}", gdi_name, e);
            None
        }
    };

    let friendly_name =
        resolve_friendly_name(edid_name.as_deref(), || registry_monitor_name(&gdi_name));
    Some(Monitor::new(gdi_name, friendly_name))
}

fn source_gdi_name(path: &DISPLAYCONFIG_PATH_INFO) -> Result<String> {
    let mut source = DISPLAYCONFIG_SOURCE_DEVICE_NAME {
        header: DISPLAYCONFIG_DEVICE_INFO_HEADER {
            r#type: DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME,
            size: size_of::<DISPLAYCONFIG_SOURCE_DEVICE_NAME>() as u32,
            adapterId: path.sourceInfo.adapterId,
            id: path.sourceInfo.id,
        },
        ..Default::default()
    };
    let status = unsafe { DisplayConfigGetDeviceInfo(&mut source.header) };
    if status != ERROR_SUCCESS.0 as i32 {
        color_eyre::eyre::bail!("DisplayConfigGetDeviceInfo returned {}", status);
    }
    Ok(from_wide(&source.viewGdiDeviceName))
}

/// EDID name, or `None` when the target doesn't report one
fn target_friendly_name(path: &DISPLAYCONFIG_PATH_INFO) -> Result<Option<String>> {
    let mut target = DISPLAYCONFIG_TARGET_DEVICE_NAME {
        header: DISPLAYCONFIG_DEVICE_INFO_HEADER {
            r#type: DISPLAYCONFIG_DEVICE_INFO_GET_TARGET_NAME,
            size: size_of::<DISPLAYCONFIG_TARGET_DEVICE_NAME>() as u32,
            adapterId: path.targetInfo.adapterId,
            id: path.targetInfo.id,
        },
        ..Default::default()
    };
    let status = unsafe { DisplayConfigGetDeviceInfo(&mut target.header) };
    if status != ERROR_SUCCESS.0 as i32 {
        color_eyre::eyre::bail!("DisplayConfigGetDeviceInfo returned {}", status);
    }

    // friendlyNameFromEdid is bit 0; without it the name field is a placeholder
    let from_edid = unsafe { target.flags.Anonymous.value } & 1 != 0;
    if !from_edid {
        return Ok(None);
    }
    Ok(Some(from_wide(&target.monitorFriendlyDeviceName)))
}

/// Device manager name of the monitor attached to a GDI source ("Generic PnP Monitor" etc.)
fn registry_monitor_name(gdi_name: &str) -> Option<String> {
    let wide: Vec<u16> = gdi_name.encode_utf16().chain(Some(0)).collect();
    let mut device = DISPLAY_DEVICEW {
        cb: size_of::<DISPLAY_DEVICEW>() as u32,
        ..Default::default()
    };
    let found = unsafe { EnumDisplayDevicesW(PCWSTR(wide.as_ptr()), 0, &mut device, 0) };
    if !found.as_bool() {
        debug!("No monitor device registered under {}", gdi_name);
        return None;
    }
    Some(from_wide(&device.DeviceString))
}

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

const LISTENER_CLASS: PCWSTR = w!("masw-listener");

/// Hidden top-level window receiving display change and session end broadcasts
///
/// Message-only windows don't get broadcasts, hence a real (never shown) window.
pub(crate) struct ListenerWindow {
    hwnd: HWND,
    instance: HINSTANCE,
}

impl ListenerWindow {
    /// # Errors
    /// Returns an error if the window class or window cannot be created.
    pub fn create() -> Result<Self> {
        let instance: HINSTANCE = unsafe { GetModuleHandleW(None) }
            .context("GetModuleHandleW failed")?
            .into();

        let class = WNDCLASSW {
            lpfnWndProc: Some(wndproc),
            hInstance: instance,
            lpszClassName: LISTENER_CLASS,
            ..Default::default()
        };
        if unsafe { RegisterClassW(&class) } == 0 {
            return Err(windows::core::Error::from_win32()).context("RegisterClassW failed");
        }

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                LISTENER_CLASS,
                w!("masw"),
                WINDOW_STYLE::default(),
                0,
                0,
                0,
                0,
                None,
                None,
                instance,
                None,
            )
        };
        let hwnd = match hwnd {
            Ok(hwnd) => hwnd,
            Err(e) => {
                let _ = unsafe { UnregisterClassW(LISTENER_CLASS, instance) };
                return Err(e).context("CreateWindowExW failed");
            }
        };

        debug!("Listener window created");
        Ok(Self { hwnd, instance })
    }
}

impl Drop for ListenerWindow {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = DestroyWindow(self.hwnd) {
                error!("DestroyWindow failed: {}", e);
            }
            let _ = UnregisterClassW(LISTENER_CLASS, self.instance);
        }
    }
}

/// Ask a running daemon to exit by closing its listener window
///
/// Returns `false` when no listener window exists in this session.
///
/// # Errors
/// Returns an error if the close message cannot be posted.
pub(crate) fn close_listener_window() -> Result<bool> {
    let Ok(hwnd) = (unsafe { FindWindowW(LISTENER_CLASS, PCWSTR::null()) }) else {
        return Ok(false);
    };
    unsafe { PostMessageW(hwnd, WM_CLOSE, WPARAM(0), LPARAM(0)) }
        .context("Failed to post WM_CLOSE to the daemon")?;
    Ok(true)
}

unsafe extern "system" fn wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_DISPLAYCHANGE => {
            trace!("WM_DISPLAYCHANGE");
            emit(PlatformEvent::DisplaysChanged);
        }
        // Don't block logoff or installer restarts
        WM_QUERYENDSESSION => {
            debug!("WM_QUERYENDSESSION");
            return LRESULT(1);
        }
        WM_ENDSESSION => {
            debug!("WM_ENDSESSION");
            emit(PlatformEvent::Shutdown);
        }
        // Closed externally (e.g. by an installer). The window itself is destroyed at teardown.
        WM_CLOSE => {
            debug!("WM_CLOSE");
            emit(PlatformEvent::Shutdown);
            return LRESULT(0);
        }
        _ => {}
    }
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}
