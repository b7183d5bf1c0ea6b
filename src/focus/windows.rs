//! Foreground window WinEvent hooks

use color_eyre::eyre::{self, Result};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MONITOR_DEFAULTTONULL, MONITORINFO, MONITORINFOEXW, MonitorFromWindow,
};
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent};
use windows::Win32::UI::WindowsAndMessaging::{
    EVENT_OBJECT_LOCATIONCHANGE, EVENT_SYSTEM_FOREGROUND, GetForegroundWindow, OBJID_WINDOW,
    WINEVENT_OUTOFCONTEXT,
};
use tracing::{debug, error, trace};

use super::{HookEvent, tracked_window};
use crate::platform::PlatformEvent;
use crate::platform::windows::emit;

/// Foreground and location-change hooks, unhooked on drop
///
/// Must be created and dropped on the thread running the message loop.
pub(crate) struct FocusHooks {
    hooks: Vec<HWINEVENTHOOK>,
}

impl FocusHooks {
    /// # Errors
    /// Returns an error if either hook cannot be installed.
    pub fn install() -> Result<Self> {
        let mut installed = Self { hooks: Vec::new() };
        for event in [EVENT_SYSTEM_FOREGROUND, EVENT_OBJECT_LOCATIONCHANGE] {
            let hook = unsafe {
                SetWinEventHook(
                    event,
                    event,
                    None,
                    Some(win_event_proc),
                    0,
                    0,
                    WINEVENT_OUTOFCONTEXT,
                )
            };
            if hook.is_invalid() {
                // Already installed hooks are released by `installed` dropping
                eyre::bail!("SetWinEventHook failed for event {:#x}", event);
            }
            installed.hooks.push(hook);
        }
        debug!("Focus hooks installed");
        Ok(installed)
    }
}

impl Drop for FocusHooks {
    fn drop(&mut self) {
        for hook in self.hooks.drain(..) {
            if !unsafe { UnhookWinEvent(hook) }.as_bool() {
                error!("UnhookWinEvent failed");
            }
        }
    }
}

unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    _id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    let kind = if event == EVENT_OBJECT_LOCATIONCHANGE {
        HookEvent::LocationChange
    } else {
        HookEvent::Foreground
    };
    let Some(foreground) = tracked_window(kind, id_object == OBJID_WINDOW.0, &hwnd, || {
        let foreground = unsafe { GetForegroundWindow() };
        // Can be null while a window is losing activation
        (!foreground.is_invalid()).then_some(foreground)
    }) else {
        return;
    };

    let monitor = unsafe { MonitorFromWindow(foreground, MONITOR_DEFAULTTONULL) };
    // The window doesn't intersect any display
    if monitor.is_invalid() {
        return;
    }

    let mut info = MONITORINFOEXW {
        monitorInfo: MONITORINFO {
            cbSize: size_of::<MONITORINFOEXW>() as u32,
            ..Default::default()
        },
        ..Default::default()
    };
    if !unsafe { GetMonitorInfoW(monitor, std::ptr::from_mut(&mut info).cast()) }.as_bool() {
        error!("GetMonitorInfoW failed: {}", windows::core::Error::from_win32());
        return;
    }

    let len = info.szDevice.iter().position(|&c| c == 0).unwrap_or(info.szDevice.len());
    let device_name = String::from_utf16_lossy(&info.szDevice[..len]);
    trace!("WinEvent {:#x} on {}", event, device_name);
    emit(PlatformEvent::Foreground { device_name });
}
