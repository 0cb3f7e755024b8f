use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Placeholder used for every descriptor field the request did not reveal.
pub const UNKNOWN: &str = "Unknown";

/// One row per (owner, fingerprint) pair ever seen. Rows are deactivated by
/// admin action only; they never expire and are never deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub fingerprint: String,
    pub platform: String,
    pub os: String,
    pub browser: String,
    pub user_agent: String,
    pub ip_address: String,
    pub screen_resolution: String,
    pub timezone: String,
    pub display_name: String,
    pub is_active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub login_count: i32,
}

/// Structured device info derived from request signals. Informational only;
/// the admission decision never reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub platform: String,
    pub os: String,
    pub browser: String,
    pub user_agent: String,
    pub ip_address: String,
    pub screen_resolution: String,
    pub timezone: String,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            platform: UNKNOWN.to_string(),
            os: UNKNOWN.to_string(),
            browser: UNKNOWN.to_string(),
            user_agent: UNKNOWN.to_string(),
            ip_address: UNKNOWN.to_string(),
            screen_resolution: UNKNOWN.to_string(),
            timezone: UNKNOWN.to_string(),
        }
    }
}

/// Client-supplied device hints. Every field is optional: a client that
/// sends nothing still gets fingerprinted from headers alone.
#[derive(Deserialize, Serialize, Debug, Default, Clone, Validate, JsonSchema)]
pub struct DeviceHints {
    pub platform: Option<String>,
    pub screen_resolution: Option<String>,
    #[validate(custom(function = "validate_timezone_hint"))]
    pub timezone: Option<String>,
    #[validate(nested)]
    pub additional_info: Option<AdditionalHints>,
}

#[derive(Deserialize, Serialize, Debug, Default, Clone, Validate, JsonSchema)]
pub struct AdditionalHints {
    pub browser: Option<String>,
    pub browser_version: Option<String>,
    pub os: Option<String>,
    pub language: Option<String>,
    pub color_depth: Option<i32>,
    pub touch_support: Option<bool>,
}

fn validate_timezone_hint(tz: &str) -> Result<(), ValidationError> {
    if tz.parse::<chrono_tz::Tz>().is_ok() {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_timezone"))
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub platform: String,
    pub os: String,
    pub browser: String,
    pub display_name: String,
    pub is_active: bool,
    pub first_seen_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub login_count: i32,
}

impl From<&DeviceRecord> for DeviceResponse {
    fn from(record: &DeviceRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            platform: record.platform.clone(),
            os: record.os.clone(),
            browser: record.browser.clone(),
            display_name: record.display_name.clone(),
            is_active: record.is_active,
            first_seen_at: record.first_seen_at,
            last_activity_at: record.last_activity_at,
            login_count: record.login_count,
        }
    }
}

/// Request body for the explicit device-authorization check endpoint.
#[derive(Deserialize, Debug, Default, Validate, JsonSchema)]
pub struct DeviceCheckRequest {
    #[validate(nested)]
    pub device_info: Option<DeviceHints>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct AdmissionResponse {
    /// "bypassed", "known-device", or "new-device".
    pub outcome: String,
    pub device: Option<DeviceResponse>,
    /// Free active-device slots left after this admission; only present for
    /// new-device outcomes.
    pub remaining_slots: Option<u32>,
}

// ── Administrative statistics ───────────────────────────────────────────────

#[derive(Serialize, Debug, JsonSchema, sqlx::FromRow)]
pub struct GroupCount {
    pub label: String,
    pub count: i64,
}

#[derive(Serialize, Debug, JsonSchema, sqlx::FromRow)]
pub struct OverLimitOwner {
    pub owner_id: Uuid,
    pub active_devices: i64,
}

/// Registry-level aggregates; the route layer adds the live limit.
#[derive(Debug)]
pub struct DeviceStats {
    pub total_devices: i64,
    pub active_devices: i64,
    pub by_platform: Vec<GroupCount>,
    pub by_browser: Vec<GroupCount>,
    pub owners_over_limit: Vec<OverLimitOwner>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct DeviceStatsResponse {
    pub total_devices: i64,
    pub active_devices: i64,
    pub by_platform: Vec<GroupCount>,
    pub by_browser: Vec<GroupCount>,
    /// Owners whose active-device count exceeds the current limit. Possible
    /// after an admin lowers the limit, which is never retroactive.
    pub owners_over_limit: Vec<OverLimitOwner>,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timezone_hint_validation() {
        let valid = DeviceHints {
            timezone: Some("Europe/Amsterdam".to_string()),
            ..DeviceHints::default()
        };
        assert!(valid.validate().is_ok());

        let invalid = DeviceHints {
            timezone: Some("Mars/Olympus_Mons".to_string()),
            ..DeviceHints::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn hints_deserialize_with_missing_fields() {
        let hints: DeviceHints = serde_json::from_str(r#"{"platform": "MacIntel"}"#).unwrap();
        assert_eq!(hints.platform.as_deref(), Some("MacIntel"));
        assert!(hints.additional_info.is_none());

        let nested: DeviceHints = serde_json::from_str(r#"{"additional_info": {"browser": "Firefox"}}"#).unwrap();
        assert_eq!(nested.additional_info.unwrap().browser.as_deref(), Some("Firefox"));
    }
}
