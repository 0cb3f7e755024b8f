use crate::database::device::DeviceRegistry;
use crate::error::app_error::AppError;
use crate::models::device::{DeviceDescriptor, DeviceRecord, DeviceStats, GroupCount, OverLimitOwner};
use crate::models::pagination::PaginationParams;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory device registry mirroring the Postgres semantics, including
/// the inactive-row re-issue on create and the DuplicateDevice signal for
/// active-row collisions.
pub struct MemoryRegistry {
    records: Mutex<Vec<DeviceRecord>>,
    duplicate_on_next_create: AtomicBool,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            duplicate_on_next_create: AtomicBool::new(false),
        }
    }

    /// Make the next create behave as if a rival attempt inserted the same
    /// (owner, fingerprint) first: the record is stored on the rival's
    /// behalf and the caller sees the unique-index collision.
    pub fn simulate_duplicate_on_next_create(&self) {
        self.duplicate_on_next_create.store(true, Ordering::SeqCst);
    }

    fn fresh_record(owner_id: &Uuid, fingerprint: &str, descriptor: &DeviceDescriptor, display_name: &str) -> DeviceRecord {
        let now = Utc::now();
        DeviceRecord {
            id: Uuid::new_v4(),
            owner_id: *owner_id,
            fingerprint: fingerprint.to_string(),
            platform: descriptor.platform.clone(),
            os: descriptor.os.clone(),
            browser: descriptor.browser.clone(),
            user_agent: descriptor.user_agent.clone(),
            ip_address: descriptor.ip_address.clone(),
            screen_resolution: descriptor.screen_resolution.clone(),
            timezone: descriptor.timezone.clone(),
            display_name: display_name.to_string(),
            is_active: true,
            first_seen_at: now,
            last_activity_at: now,
            login_count: 1,
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for MemoryRegistry {
    async fn find_by_owner_and_fingerprint(&self, owner_id: &Uuid, fingerprint: &str) -> Result<Option<DeviceRecord>, AppError> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| r.owner_id == *owner_id && r.fingerprint == fingerprint).cloned())
    }

    async fn count_active_by_owner(&self, owner_id: &Uuid) -> Result<i64, AppError> {
        let records = self.records.lock().await;
        Ok(records.iter().filter(|r| r.owner_id == *owner_id && r.is_active).count() as i64)
    }

    async fn create_device(
        &self,
        owner_id: &Uuid,
        fingerprint: &str,
        descriptor: &DeviceDescriptor,
        display_name: &str,
    ) -> Result<DeviceRecord, AppError> {
        let mut records = self.records.lock().await;

        if self.duplicate_on_next_create.swap(false, Ordering::SeqCst) {
            records.push(Self::fresh_record(owner_id, fingerprint, descriptor, display_name));
            return Err(AppError::DuplicateDevice);
        }

        if let Some(existing) = records.iter_mut().find(|r| r.owner_id == *owner_id && r.fingerprint == fingerprint) {
            if existing.is_active {
                return Err(AppError::DuplicateDevice);
            }
            // Re-issue the deactivated row as a fresh registration.
            let id = existing.id;
            *existing = DeviceRecord {
                id,
                ..Self::fresh_record(owner_id, fingerprint, descriptor, display_name)
            };
            return Ok(existing.clone());
        }

        let record = Self::fresh_record(owner_id, fingerprint, descriptor, display_name);
        records.push(record.clone());
        Ok(record)
    }

    async fn touch_device(&self, id: &Uuid, descriptor: &DeviceDescriptor, display_name: &str) -> Result<DeviceRecord, AppError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

        record.login_count += 1;
        record.last_activity_at = Utc::now();
        record.platform = descriptor.platform.clone();
        record.os = descriptor.os.clone();
        record.browser = descriptor.browser.clone();
        record.user_agent = descriptor.user_agent.clone();
        record.ip_address = descriptor.ip_address.clone();
        record.screen_resolution = descriptor.screen_resolution.clone();
        record.timezone = descriptor.timezone.clone();
        record.display_name = display_name.to_string();

        Ok(record.clone())
    }

    async fn deactivate_device(&self, id: &Uuid) -> Result<DeviceRecord, AppError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == *id)
            .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

        if record.is_active {
            record.is_active = false;
            record.last_activity_at = Utc::now();
        }

        Ok(record.clone())
    }

    async fn deactivate_all_for_owner(&self, owner_id: &Uuid) -> Result<u64, AppError> {
        let mut records = self.records.lock().await;
        let now = Utc::now();
        let mut count = 0;
        for record in records.iter_mut().filter(|r| r.owner_id == *owner_id && r.is_active) {
            record.is_active = false;
            record.last_activity_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn list_devices_by_owner(&self, owner_id: &Uuid, pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError> {
        let records = self.records.lock().await;
        let mut matching: Vec<DeviceRecord> = records.iter().filter(|r| r.owner_id == *owner_id).cloned().collect();
        matching.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        let total = matching.len() as i64;
        Ok((paginate(matching, pagination), total))
    }

    async fn list_all_devices(&self, active_only: Option<bool>, pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError> {
        let records = self.records.lock().await;
        let mut matching: Vec<DeviceRecord> = records
            .iter()
            .filter(|r| active_only.is_none_or(|active| r.is_active == active))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        let total = matching.len() as i64;
        Ok((paginate(matching, pagination), total))
    }

    async fn device_stats(&self, limit: u32) -> Result<DeviceStats, AppError> {
        let records = self.records.lock().await;
        let total_devices = records.len() as i64;
        let active: Vec<&DeviceRecord> = records.iter().filter(|r| r.is_active).collect();

        let mut by_platform: HashMap<String, i64> = HashMap::new();
        let mut by_browser: HashMap<String, i64> = HashMap::new();
        let mut by_owner: HashMap<Uuid, i64> = HashMap::new();
        for record in &active {
            *by_platform.entry(record.platform.clone()).or_default() += 1;
            *by_browser.entry(record.browser.clone()).or_default() += 1;
            *by_owner.entry(record.owner_id).or_default() += 1;
        }

        Ok(DeviceStats {
            total_devices,
            active_devices: active.len() as i64,
            by_platform: into_group_counts(by_platform),
            by_browser: into_group_counts(by_browser),
            owners_over_limit: by_owner
                .into_iter()
                .filter(|(_, count)| *count > i64::from(limit))
                .map(|(owner_id, active_devices)| OverLimitOwner { owner_id, active_devices })
                .collect(),
        })
    }
}

fn paginate(records: Vec<DeviceRecord>, pagination: &PaginationParams) -> Vec<DeviceRecord> {
    match pagination.effective_limit() {
        Some(limit) => {
            let offset = pagination.offset().unwrap_or(0) as usize;
            records.into_iter().skip(offset).take(limit as usize).collect()
        }
        None => records,
    }
}

fn into_group_counts(map: HashMap<String, i64>) -> Vec<GroupCount> {
    let mut counts: Vec<GroupCount> = map.into_iter().map(|(label, count)| GroupCount { label, count }).collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    counts
}

/// Registry double whose every operation fails with a storage error, for
/// exercising the DeviceCheckFailed classification and the fail-open /
/// fail-closed split.
pub struct FailingRegistry;

fn storage_failure() -> AppError {
    AppError::db("registry unavailable", sqlx::Error::PoolTimedOut)
}

#[async_trait::async_trait]
impl DeviceRegistry for FailingRegistry {
    async fn find_by_owner_and_fingerprint(&self, _owner_id: &Uuid, _fingerprint: &str) -> Result<Option<DeviceRecord>, AppError> {
        Err(storage_failure())
    }

    async fn count_active_by_owner(&self, _owner_id: &Uuid) -> Result<i64, AppError> {
        Err(storage_failure())
    }

    async fn create_device(
        &self,
        _owner_id: &Uuid,
        _fingerprint: &str,
        _descriptor: &DeviceDescriptor,
        _display_name: &str,
    ) -> Result<DeviceRecord, AppError> {
        Err(storage_failure())
    }

    async fn touch_device(&self, _id: &Uuid, _descriptor: &DeviceDescriptor, _display_name: &str) -> Result<DeviceRecord, AppError> {
        Err(storage_failure())
    }

    async fn deactivate_device(&self, _id: &Uuid) -> Result<DeviceRecord, AppError> {
        Err(storage_failure())
    }

    async fn deactivate_all_for_owner(&self, _owner_id: &Uuid) -> Result<u64, AppError> {
        Err(storage_failure())
    }

    async fn list_devices_by_owner(&self, _owner_id: &Uuid, _pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError> {
        Err(storage_failure())
    }

    async fn list_all_devices(&self, _active_only: Option<bool>, _pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError> {
        Err(storage_failure())
    }

    async fn device_stats(&self, _limit: u32) -> Result<DeviceStats, AppError> {
        Err(storage_failure())
    }
}
