use crate::middleware::DeviceSignals;
use crate::models::device::{DeviceDescriptor, DeviceHints, UNKNOWN};
use regex::Regex;
use std::sync::LazyLock;

static MACOS_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Mac OS X [0-9_.]+").expect("invalid macOS version regex"));

/// Translate raw request signals plus optional client hints into a
/// structured descriptor and a short display name ("Chrome on Windows").
///
/// Pure function of its inputs and idempotent, so it is safe to re-derive
/// on every login: parsing the same inputs twice yields the same descriptor
/// and display name. Missing signals fall back to "Unknown" per field
/// rather than failing.
pub fn parse_device(signals: &DeviceSignals, hints: Option<&DeviceHints>) -> (DeviceDescriptor, String) {
    let user_agent = signals.user_agent.as_deref().map(str::trim).filter(|ua| !ua.is_empty());
    let additional = hints.and_then(|h| h.additional_info.as_ref());

    let browser = additional
        .and_then(|a| a.browser.clone())
        .filter(|b| !b.trim().is_empty())
        .or_else(|| user_agent.and_then(detect_browser).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let os = additional
        .and_then(|a| a.os.clone())
        .filter(|o| !o.trim().is_empty())
        .or_else(|| user_agent.and_then(detect_os).map(str::to_string))
        .unwrap_or_else(|| UNKNOWN.to_string());

    let platform = hints
        .and_then(|h| h.platform.clone())
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| os.clone());

    let descriptor = DeviceDescriptor {
        platform,
        os: os.clone(),
        browser: browser.clone(),
        user_agent: user_agent.map_or_else(|| UNKNOWN.to_string(), str::to_string),
        ip_address: non_empty_or_unknown(signals.client_ip.as_deref()),
        screen_resolution: non_empty_or_unknown(hints.and_then(|h| h.screen_resolution.as_deref())),
        timezone: non_empty_or_unknown(hints.and_then(|h| h.timezone.as_deref())),
    };

    let display_name = display_name(&browser, &os);
    (descriptor, display_name)
}

fn display_name(browser: &str, os: &str) -> String {
    match (browser == UNKNOWN, os == UNKNOWN) {
        (true, true) => "Unknown device".to_string(),
        (true, false) => format!("Browser on {}", os),
        (false, true) => browser.to_string(),
        (false, false) => format!("{} on {}", browser, os),
    }
}

/// Token order matters: Edge and Opera embed "Chrome", and Chrome embeds
/// "Safari".
fn detect_browser(ua: &str) -> Option<&'static str> {
    if ua.contains("Edg/") || ua.contains("Edge/") {
        Some("Edge")
    } else if ua.contains("OPR/") || ua.contains("Opera") {
        Some("Opera")
    } else if ua.contains("Firefox/") || ua.contains("FxiOS") {
        Some("Firefox")
    } else if ua.contains("Chrome/") || ua.contains("CriOS") {
        Some("Chrome")
    } else if ua.contains("Safari/") {
        Some("Safari")
    } else {
        None
    }
}

fn detect_os(ua: &str) -> Option<&'static str> {
    if ua.contains("Windows NT") || ua.contains("Windows") {
        Some("Windows")
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
        Some("iOS")
    } else if MACOS_VERSION.is_match(ua) || ua.contains("Macintosh") {
        Some("macOS")
    } else if ua.contains("Android") {
        Some("Android")
    } else if ua.contains("Linux") {
        Some("Linux")
    } else {
        None
    }
}

fn non_empty_or_unknown(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}
