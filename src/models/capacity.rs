use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use validator::Validate;

#[derive(Serialize, Debug, JsonSchema)]
pub struct CapacityResponse {
    pub max_devices_per_user: u32,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct CapacityUpdateRequest {
    #[validate(range(min = 1, max = 10))]
    pub max_devices_per_user: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_request_rejects_out_of_range() {
        assert!(CapacityUpdateRequest { max_devices_per_user: 0 }.validate().is_err());
        assert!(CapacityUpdateRequest { max_devices_per_user: 11 }.validate().is_err());
        assert!(CapacityUpdateRequest { max_devices_per_user: 1 }.validate().is_ok());
        assert!(CapacityUpdateRequest { max_devices_per_user: 10 }.validate().is_ok());
    }
}
