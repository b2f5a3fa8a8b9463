//! Change detection and message rendering
//!
//! A change is worth a notification when any of these hold:
//! - the device count or a device's capacity changed
//! - the set of users on some device changed
//! - some device's occupied memory moved by more than half its capacity
//!
//! Everything else is treated as routine fluctuation.

use crate::directory::UserDirectory;
use crate::metrics::{ClusterStatus, DeviceStatus};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Relative change in occupied memory above which a device counts as changed.
pub const MEMORY_CHANGE_THRESHOLD: f64 = 0.5;

const HEADER: &str = "Status changed!";
const INDENT: &str = "    ";

/// Whether going from `previous` to `current` merits a notification.
pub fn is_significant(previous: &ClusterStatus, current: &ClusterStatus) -> bool {
    topology_changed(previous, current)
        || users_changed(previous, current)
        || memory_changed(previous, current)
}

fn topology_changed(previous: &ClusterStatus, current: &ClusterStatus) -> bool {
    previous.len() != current.len()
        || previous
            .devices
            .iter()
            .zip(&current.devices)
            .any(|(p, c)| p.total_memory_mb != c.total_memory_mb)
}

fn users_changed(previous: &ClusterStatus, current: &ClusterStatus) -> bool {
    previous
        .devices
        .iter()
        .zip(&current.devices)
        .any(|(p, c)| user_set(p) != user_set(c))
}

fn user_set(device: &DeviceStatus) -> BTreeSet<&str> {
    device.users.keys().map(String::as_str).collect()
}

fn memory_changed(previous: &ClusterStatus, current: &ClusterStatus) -> bool {
    previous
        .devices
        .iter()
        .zip(&current.devices)
        .any(|(p, c)| relative_memory_change(p, c).abs() > MEMORY_CHANGE_THRESHOLD)
}

/// Change in occupied memory as a fraction of the previous capacity.
///
/// A device without capacity has no meaningful ratio; any movement there is
/// reported as a full change.
pub fn relative_memory_change(previous: &DeviceStatus, current: &DeviceStatus) -> f64 {
    let before = previous.occupied_mb() as f64;
    let after = current.occupied_mb() as f64;

    if previous.total_memory_mb == 0 {
        return if before == after { 0.0 } else { (after - before).signum() };
    }
    (after - before) / previous.total_memory_mb as f64
}

/// Human-readable summary of `status` using Telegram's HTML subset.
pub fn render(status: &ClusterStatus, directory: &dyn UserDirectory) -> String {
    let mut msg = String::from(HEADER);

    for (index, device) in status.devices.iter().enumerate() {
        // Writing into a String cannot fail.
        let _ = write!(
            msg,
            "\n\n<b>GPU{}</b> <code>{}/{}</code> Mb ({:.2}%):",
            index,
            device.occupied_mb(),
            device.total_memory_mb,
            device.utilization_percent()
        );

        if device.is_vacant() {
            msg.push('\n');
            msg.push_str(INDENT);
            msg.push_str("vacant!");
            continue;
        }

        for (username, memory_mb) in &device.users {
            let name = escape_html(username);
            let _ = match directory.display_name(username) {
                Some(description) => write!(
                    msg,
                    "\n{}{} ({}), <code>{}</code> Mb",
                    INDENT,
                    name,
                    escape_html(&description),
                    memory_mb
                ),
                None => write!(msg, "\n{}{}, <code>{}</code> Mb", INDENT, name, memory_mb),
            };
        }
    }

    msg
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
