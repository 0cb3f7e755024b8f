use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::device::{DeviceDescriptor, DeviceRecord, DeviceStats, GroupCount, OverLimitOwner};
use crate::models::pagination::PaginationParams;
use uuid::Uuid;

const DEVICE_COLUMNS: &str = r#"
    id, owner_id, fingerprint, platform, os, browser, user_agent, ip_address,
    screen_resolution, timezone, display_name, is_active,
    first_seen_at, last_activity_at, login_count
"#;

/// Durable store of device records, keyed for exact (owner, fingerprint)
/// lookup and active-count-by-owner. Implemented by the Postgres repository
/// and by an in-memory double for admission-policy tests.
#[async_trait::async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn find_by_owner_and_fingerprint(&self, owner_id: &Uuid, fingerprint: &str) -> Result<Option<DeviceRecord>, AppError>;

    async fn count_active_by_owner(&self, owner_id: &Uuid) -> Result<i64, AppError>;

    /// Register a device: active, login_count 1, first_seen = last_activity
    /// = now. A previously deactivated (owner, fingerprint) row is re-issued
    /// as a fresh registration with all admission state reset; colliding
    /// with an *active* row yields `DuplicateDevice`.
    async fn create_device(&self, owner_id: &Uuid, fingerprint: &str, descriptor: &DeviceDescriptor, display_name: &str)
    -> Result<DeviceRecord, AppError>;

    /// Record a successful admission through an existing record: bumps
    /// login_count, refreshes last_activity_at and the descriptor.
    async fn touch_device(&self, id: &Uuid, descriptor: &DeviceDescriptor, display_name: &str) -> Result<DeviceRecord, AppError>;

    /// Idempotent: deactivating an already-inactive record is a no-op
    /// success and does not bump last_activity_at again.
    async fn deactivate_device(&self, id: &Uuid) -> Result<DeviceRecord, AppError>;

    async fn deactivate_all_for_owner(&self, owner_id: &Uuid) -> Result<u64, AppError>;

    async fn list_devices_by_owner(&self, owner_id: &Uuid, pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError>;

    async fn list_all_devices(&self, active_only: Option<bool>, pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError>;

    async fn device_stats(&self, limit: u32) -> Result<DeviceStats, AppError>;
}

#[async_trait::async_trait]
impl DeviceRegistry for PostgresRepository {
    async fn find_by_owner_and_fingerprint(&self, owner_id: &Uuid, fingerprint: &str) -> Result<Option<DeviceRecord>, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            r#"
            SELECT {DEVICE_COLUMNS}
            FROM device
            WHERE owner_id = $1 AND fingerprint = $2
            "#
        ))
        .bind(owner_id)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn count_active_by_owner(&self, owner_id: &Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM device
            WHERE owner_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn create_device(
        &self,
        owner_id: &Uuid,
        fingerprint: &str,
        descriptor: &DeviceDescriptor,
        display_name: &str,
    ) -> Result<DeviceRecord, AppError> {
        // The partial DO UPDATE re-issues a deactivated row as a fresh
        // registration; a conflict with an active row matches no branch and
        // returns nothing, which is the concurrent-create race.
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            r#"
            INSERT INTO device (
                owner_id, fingerprint, platform, os, browser, user_agent,
                ip_address, screen_resolution, timezone, display_name,
                is_active, first_seen_at, last_activity_at, login_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE, now(), now(), 1)
            ON CONFLICT (owner_id, fingerprint) DO UPDATE SET
                platform = EXCLUDED.platform,
                os = EXCLUDED.os,
                browser = EXCLUDED.browser,
                user_agent = EXCLUDED.user_agent,
                ip_address = EXCLUDED.ip_address,
                screen_resolution = EXCLUDED.screen_resolution,
                timezone = EXCLUDED.timezone,
                display_name = EXCLUDED.display_name,
                is_active = TRUE,
                first_seen_at = now(),
                last_activity_at = now(),
                login_count = 1
            WHERE device.is_active = FALSE
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(fingerprint)
        .bind(&descriptor.platform)
        .bind(&descriptor.os)
        .bind(&descriptor.browser)
        .bind(&descriptor.user_agent)
        .bind(&descriptor.ip_address)
        .bind(&descriptor.screen_resolution)
        .bind(&descriptor.timezone)
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_unique_violation)?;

        record.ok_or(AppError::DuplicateDevice)
    }

    async fn touch_device(&self, id: &Uuid, descriptor: &DeviceDescriptor, display_name: &str) -> Result<DeviceRecord, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            r#"
            UPDATE device
            SET login_count = login_count + 1,
                last_activity_at = now(),
                platform = $2,
                os = $3,
                browser = $4,
                user_agent = $5,
                ip_address = $6,
                screen_resolution = $7,
                timezone = $8,
                display_name = $9
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&descriptor.platform)
        .bind(&descriptor.os)
        .bind(&descriptor.browser)
        .bind(&descriptor.user_agent)
        .bind(&descriptor.ip_address)
        .bind(&descriptor.screen_resolution)
        .bind(&descriptor.timezone)
        .bind(display_name)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| AppError::NotFound("Device not found".to_string()))
    }

    async fn deactivate_device(&self, id: &Uuid) -> Result<DeviceRecord, AppError> {
        let record = sqlx::query_as::<_, DeviceRecord>(&format!(
            r#"
            UPDATE device
            SET last_activity_at = CASE WHEN is_active THEN now() ELSE last_activity_at END,
                is_active = FALSE
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| AppError::NotFound("Device not found".to_string()))
    }

    async fn deactivate_all_for_owner(&self, owner_id: &Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE device
            SET is_active = FALSE, last_activity_at = now()
            WHERE owner_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_devices_by_owner(&self, owner_id: &Uuid, pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM device WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await?;

        let devices = if let Some(limit) = pagination.effective_limit() {
            sqlx::query_as::<_, DeviceRecord>(&format!(
                r#"
                SELECT {DEVICE_COLUMNS}
                FROM device
                WHERE owner_id = $1
                ORDER BY last_activity_at DESC
                LIMIT $2 OFFSET $3
                "#
            ))
            .bind(owner_id)
            .bind(limit)
            .bind(pagination.offset().unwrap_or(0))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, DeviceRecord>(&format!(
                r#"
                SELECT {DEVICE_COLUMNS}
                FROM device
                WHERE owner_id = $1
                ORDER BY last_activity_at DESC
                "#
            ))
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?
        };

        Ok((devices, total))
    }

    async fn list_all_devices(&self, active_only: Option<bool>, pagination: &PaginationParams) -> Result<(Vec<DeviceRecord>, i64), AppError> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM device
            WHERE $1::boolean IS NULL OR is_active = $1
            "#,
        )
        .bind(active_only)
        .fetch_one(&self.pool)
        .await?;

        let devices = if let Some(limit) = pagination.effective_limit() {
            sqlx::query_as::<_, DeviceRecord>(&format!(
                r#"
                SELECT {DEVICE_COLUMNS}
                FROM device
                WHERE $1::boolean IS NULL OR is_active = $1
                ORDER BY last_activity_at DESC
                LIMIT $2 OFFSET $3
                "#
            ))
            .bind(active_only)
            .bind(limit)
            .bind(pagination.offset().unwrap_or(0))
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, DeviceRecord>(&format!(
                r#"
                SELECT {DEVICE_COLUMNS}
                FROM device
                WHERE $1::boolean IS NULL OR is_active = $1
                ORDER BY last_activity_at DESC
                "#
            ))
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?
        };

        Ok((devices, total))
    }

    async fn device_stats(&self, limit: u32) -> Result<DeviceStats, AppError> {
        let (total_devices, active_devices): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active)
            FROM device
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let by_platform = sqlx::query_as::<_, GroupCount>(
            r#"
            SELECT platform AS label, COUNT(*) AS count
            FROM device
            WHERE is_active = TRUE
            GROUP BY platform
            ORDER BY count DESC, label ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let by_browser = sqlx::query_as::<_, GroupCount>(
            r#"
            SELECT browser AS label, COUNT(*) AS count
            FROM device
            WHERE is_active = TRUE
            GROUP BY browser
            ORDER BY count DESC, label ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let owners_over_limit = sqlx::query_as::<_, OverLimitOwner>(
            r#"
            SELECT owner_id, COUNT(*) AS active_devices
            FROM device
            WHERE is_active = TRUE
            GROUP BY owner_id
            HAVING COUNT(*) > $1
            ORDER BY active_devices DESC
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(DeviceStats {
            total_devices,
            active_devices,
            by_platform,
            by_browser,
            owners_over_limit,
        })
    }
}

fn classify_unique_violation(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::DuplicateDevice,
        _ => AppError::db("Failed to register device", e),
    }
}
