//! Desktop notifications
//!
//! Sends switch notifications via notify-rust, with an icon guessed from the
//! device name using `FreeDesktop` standard icon names.

use color_eyre::eyre::{Context, Result};
use notify_rust::Notification;

/// Send a desktop notification
///
/// # Errors
/// Returns an error if the notification cannot be shown.
pub fn send_notification(summary: &str, body: &str, icon: Option<&str>) -> Result<()> {
    let icon = icon.unwrap_or("audio-card");

    Notification::new()
        .summary(summary)
        .body(body)
        .appname("MASW")
        .icon(icon)
        .timeout(3000)
        .show()
        .context("Failed to show notification")?;

    Ok(())
}

/// Notify that `device` became the default because `monitor` has focus
///
/// # Errors
/// Returns an error if the notification cannot be shown.
pub fn notify_switch(device: &str, monitor: &str) -> Result<()> {
    let icon = device_icon(device);
    send_notification("Audio Output", &switch_body(device, monitor), Some(icon))
}

fn switch_body(device: &str, monitor: &str) -> String {
    format!("{device} ({monitor})")
}

/// Icon name guessed from a playback device's display name
#[must_use]
pub fn device_icon(device: &str) -> &'static str {
    let name = device.to_lowercase();

    if name.contains("hdmi") || name.contains("tv") || name.contains("display") {
        "video-display"
    } else if name.contains("headphone") || name.contains("headset") {
        "audio-headphones"
    } else {
        "audio-speakers"
    }
}
