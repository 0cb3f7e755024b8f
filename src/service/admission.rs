use crate::database::device::DeviceRegistry;
use crate::error::app_error::AppError;
use crate::middleware::DeviceSignals;
use crate::models::device::{AdmissionResponse, DeviceHints, DeviceRecord, DeviceResponse};
use crate::models::user::Role;
use crate::service::capacity::CapacityLimit;
use crate::service::device_parser::parse_device;
use crate::service::fingerprint::derive_fingerprint;
use tracing::{debug, warn};
use uuid::Uuid;

/// The account an admission attempt is evaluated for.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionSubject {
    pub id: Uuid,
    pub role: Role,
}

/// What happened during an admission attempt.
#[derive(Debug)]
pub enum Admission {
    /// Administrative role: device checks skipped entirely so operators can
    /// never be locked out.
    Bypassed,
    /// The fingerprint matched an active record; activity was refreshed.
    KnownDevice(DeviceRecord),
    /// The owner was under capacity and a record was registered.
    NewDevice { record: DeviceRecord, remaining_slots: u32 },
}

/// Admission outcome for the login flow, which stays available when the
/// device subsystem is degraded.
#[derive(Debug)]
pub struct LoginAdmission {
    pub admission: Option<Admission>,
    /// True when the device check could not run and the login proceeds
    /// unchecked.
    pub degraded: bool,
}

impl From<&Admission> for AdmissionResponse {
    fn from(admission: &Admission) -> Self {
        match admission {
            Admission::Bypassed => AdmissionResponse {
                outcome: "bypassed".to_string(),
                device: None,
                remaining_slots: None,
            },
            Admission::KnownDevice(record) => AdmissionResponse {
                outcome: "known-device".to_string(),
                device: Some(DeviceResponse::from(record)),
                remaining_slots: None,
            },
            Admission::NewDevice { record, remaining_slots } => AdmissionResponse {
                outcome: "new-device".to_string(),
                device: Some(DeviceResponse::from(record)),
                remaining_slots: Some(*remaining_slots),
            },
        }
    }
}

/// Device admission policy: admin bypass, then registry lookup, then
/// capacity check.
///
/// This is the single place that classifies registry failures: everything
/// the store throws surfaces as `DeviceCheckFailed`, and callers choose
/// fail-open (login) or fail-closed (registration, explicit checks). The
/// lookup-then-create sequence is not transactional; two concurrent
/// new-device admissions for one owner on different fingerprints can both
/// pass the count and transiently exceed the limit by one. Same-fingerprint
/// races are healed by the unique index plus the `DuplicateDevice` recovery
/// below.
pub struct AdmissionService<'a, R: DeviceRegistry + ?Sized> {
    registry: &'a R,
    capacity: &'a CapacityLimit,
}

impl<'a, R: DeviceRegistry + ?Sized> AdmissionService<'a, R> {
    pub fn new(registry: &'a R, capacity: &'a CapacityLimit) -> Self {
        Self { registry, capacity }
    }

    pub async fn admit(&self, subject: AdmissionSubject, signals: &DeviceSignals, hints: Option<&DeviceHints>) -> Result<Admission, AppError> {
        if subject.role.is_admin() {
            debug!(owner_id = %subject.id, "admin role, device admission bypassed");
            return Ok(Admission::Bypassed);
        }

        let fingerprint = derive_fingerprint(signals, hints);
        let (descriptor, display_name) = parse_device(signals, hints);

        let existing = self
            .registry
            .find_by_owner_and_fingerprint(&subject.id, &fingerprint)
            .await
            .map_err(classify_storage)?;

        if let Some(record) = existing
            && record.is_active
        {
            let touched = self.registry.touch_device(&record.id, &descriptor, &display_name).await.map_err(classify_storage)?;
            debug!(owner_id = %subject.id, device_id = %touched.id, login_count = touched.login_count, "known device admitted");
            return Ok(Admission::KnownDevice(touched));
        }

        // An inactive record is treated as unknown: re-admission goes back
        // through the capacity check, so a reset device only re-registers
        // while the owner is under the limit.
        let active = self.registry.count_active_by_owner(&subject.id).await.map_err(classify_storage)?;
        let limit = self.capacity.get();

        if active >= i64::from(limit) {
            debug!(owner_id = %subject.id, active, limit, "new device denied, owner at capacity");
            return Err(AppError::DeviceLimitExceeded { limit });
        }

        match self.registry.create_device(&subject.id, &fingerprint, &descriptor, &display_name).await {
            Ok(record) => {
                let remaining_slots = limit - active as u32 - 1;
                debug!(owner_id = %subject.id, device_id = %record.id, remaining_slots, "new device registered");
                Ok(Admission::NewDevice { record, remaining_slots })
            }
            Err(AppError::DuplicateDevice) => {
                // Lost a same-fingerprint race: another attempt registered
                // this device between our lookup and insert. Equivalent to a
                // known device.
                warn!(owner_id = %subject.id, "concurrent device registration detected, admitting as known device");
                let record = self
                    .registry
                    .find_by_owner_and_fingerprint(&subject.id, &fingerprint)
                    .await
                    .map_err(classify_storage)?
                    .ok_or_else(|| AppError::device_check("device record missing after duplicate insert"))?;
                let touched = self.registry.touch_device(&record.id, &descriptor, &display_name).await.map_err(classify_storage)?;
                Ok(Admission::KnownDevice(touched))
            }
            Err(e) => Err(classify_storage(e)),
        }
    }

    /// Login-flow admission. A capacity denial still fails the login, but a
    /// degraded device subsystem does not: `DeviceCheckFailed` is absorbed
    /// here (logged, `degraded = true`) and every other error propagates.
    /// Registration and explicit checks call `admit` directly and fail
    /// closed.
    pub async fn admit_fail_open(
        &self,
        subject: AdmissionSubject,
        signals: &DeviceSignals,
        hints: Option<&DeviceHints>,
    ) -> Result<LoginAdmission, AppError> {
        match self.admit(subject, signals, hints).await {
            Ok(admission) => Ok(LoginAdmission {
                admission: Some(admission),
                degraded: false,
            }),
            Err(AppError::DeviceCheckFailed { message }) => {
                warn!(owner_id = %subject.id, message = %message, "device check degraded, admitting login fail-open");
                Ok(LoginAdmission {
                    admission: None,
                    degraded: true,
                })
            }
            Err(other) => Err(other),
        }
    }
}

/// Domain outcomes pass through; anything else the store threw becomes
/// `DeviceCheckFailed` so raw storage errors never reach the caller.
fn classify_storage(err: AppError) -> AppError {
    match err {
        AppError::DeviceLimitExceeded { .. } | AppError::DuplicateDevice | AppError::DeviceCheckFailed { .. } => err,
        AppError::Db { message, source } => {
            warn!(message = %message, error = %source, "device registry failure");
            AppError::device_check(message)
        }
        other => AppError::device_check(other.to_string()),
    }
}
