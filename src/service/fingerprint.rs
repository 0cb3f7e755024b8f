use crate::middleware::DeviceSignals;
use crate::models::device::DeviceHints;
use sha2::{Digest, Sha256};

/// Derive the device fingerprint from header signals plus optional
/// client-supplied hints.
///
/// The output is a 64-char lowercase hex Sha256 digest over a canonical
/// `key=value` line set, so identical inputs always produce the identical
/// string. Absent signals are encoded as `-` rather than skipped, keeping
/// the digest stable under partial input: a request with no hints hashes
/// the same lines as one with empty hints.
///
/// This is an identification heuristic, not a security boundary. The client
/// supplies several of the inputs and can evade it; it only needs to be
/// good enough to deter casual account sharing.
pub fn derive_fingerprint(signals: &DeviceSignals, hints: Option<&DeviceHints>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in canonical_signals(signals, hints) {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn canonical_signals(signals: &DeviceSignals, hints: Option<&DeviceHints>) -> Vec<(&'static str, String)> {
    let additional = hints.and_then(|h| h.additional_info.as_ref());

    vec![
        ("ua", normalize(signals.user_agent.as_deref())),
        ("lang", normalize(signals.accept_language.as_deref())),
        ("ip", normalize(signals.client_ip.as_deref())),
        ("platform", normalize(hints.and_then(|h| h.platform.as_deref()))),
        ("screen", normalize(hints.and_then(|h| h.screen_resolution.as_deref()))),
        ("tz", normalize(hints.and_then(|h| h.timezone.as_deref()))),
        ("browser", normalize(additional.and_then(|a| a.browser.as_deref()))),
        ("browser_version", normalize(additional.and_then(|a| a.browser_version.as_deref()))),
        ("os", normalize(additional.and_then(|a| a.os.as_deref()))),
        ("hint_lang", normalize(additional.and_then(|a| a.language.as_deref()))),
        ("color_depth", additional.and_then(|a| a.color_depth).map_or_else(|| "-".to_string(), |d| d.to_string())),
        ("touch", additional.and_then(|a| a.touch_support).map_or_else(|| "-".to_string(), |t| t.to_string())),
    ]
}

fn normalize(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_lowercase(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::AdditionalHints;
    use proptest::prelude::*;

    fn signals(ua: &str, lang: &str, ip: &str) -> DeviceSignals {
        DeviceSignals {
            user_agent: Some(ua.to_string()),
            accept_language: Some(lang.to_string()),
            client_ip: Some(ip.to_string()),
        }
    }

    #[test]
    fn identical_inputs_yield_identical_fingerprints() {
        let s = signals("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0", "en-US", "203.0.113.9");
        let hints = DeviceHints {
            platform: Some("Win32".to_string()),
            screen_resolution: Some("1920x1080".to_string()),
            ..DeviceHints::default()
        };

        assert_eq!(derive_fingerprint(&s, Some(&hints)), derive_fingerprint(&s, Some(&hints)));
    }

    #[test]
    fn distinct_user_agents_yield_distinct_fingerprints() {
        let a = signals("Mozilla/5.0 Chrome/120.0", "en-US", "203.0.113.9");
        let b = signals("Mozilla/5.0 Firefox/121.0", "en-US", "203.0.113.9");
        assert_ne!(derive_fingerprint(&a, None), derive_fingerprint(&b, None));
    }

    #[test]
    fn absent_hints_equal_empty_hints() {
        let s = signals("Mozilla/5.0", "en", "10.0.0.1");
        assert_eq!(derive_fingerprint(&s, None), derive_fingerprint(&s, Some(&DeviceHints::default())));
    }

    #[test]
    fn fully_blank_request_still_fingerprints() {
        let fingerprint = derive_fingerprint(&DeviceSignals::default(), None);
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn whitespace_and_case_are_normalized() {
        let a = signals("  Mozilla/5.0  ", "EN-us", "10.0.0.1");
        let b = signals("mozilla/5.0", "en-US", "10.0.0.1");
        assert_eq!(derive_fingerprint(&a, None), derive_fingerprint(&b, None));
    }

    #[test]
    fn nested_hints_change_the_fingerprint() {
        let s = signals("Mozilla/5.0", "en", "10.0.0.1");
        let with_browser = DeviceHints {
            additional_info: Some(AdditionalHints {
                browser: Some("Firefox".to_string()),
                ..AdditionalHints::default()
            }),
            ..DeviceHints::default()
        };
        assert_ne!(derive_fingerprint(&s, None), derive_fingerprint(&s, Some(&with_browser)));
    }

    proptest! {
        #[test]
        fn fingerprint_is_deterministic(ua in ".*", lang in ".*", ip in ".*") {
            let s = DeviceSignals {
                user_agent: Some(ua),
                accept_language: Some(lang),
                client_ip: Some(ip),
            };
            prop_assert_eq!(derive_fingerprint(&s, None), derive_fingerprint(&s, None));
        }

        #[test]
        fn fingerprint_is_always_hex_sha256(ua in ".*") {
            let s = DeviceSignals {
                user_agent: Some(ua),
                ..DeviceSignals::default()
            };
            let fingerprint = derive_fingerprint(&s, None);
            prop_assert_eq!(fingerprint.len(), 64);
            prop_assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
