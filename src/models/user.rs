use crate::models::device::DeviceHints;
use chrono::{DateTime, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Account role. Admins bypass device admission entirely so operators can
/// never be locked out by their own device registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::Member,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_db(&self.role)
    }
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role(),
        }
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    #[validate(custom(function = "validate_password_strength"))]
    pub password: String,
    /// Browser-collected hints for the registering device.
    #[validate(nested)]
    pub device_info: Option<DeviceHints>,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(nested)]
    pub device_info: Option<DeviceHints>,
}

/// Body returned by register and login. `device` is None only when the
/// login was allowed despite a degraded device subsystem (fail-open path).
#[derive(Serialize, Debug, JsonSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub device: Option<crate::models::device::AdmissionResponse>,
    /// True when the device check could not run and the login was admitted
    /// anyway.
    pub device_check_degraded: bool,
}

pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let estimate = zxcvbn::zxcvbn(password, &[]);
    if u8::from(estimate.score()) >= 3 {
        Ok(())
    } else {
        Err(ValidationError::new("password_too_weak"))
    }
}
