use crate::error::app_error::AppError;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

/// Process-wide active-device limit per user.
///
/// Read on every admission, written only by administrative action, so a
/// single atomic suffices. Changes apply to subsequent admissions
/// immediately but are never retroactive: lowering the limit does not
/// deactivate devices that are already active.
///
/// Held as Rocket managed state; resets to the configured default on
/// restart.
#[derive(Debug)]
pub struct CapacityLimit {
    limit: AtomicU32,
}

impl CapacityLimit {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 10;
    pub const DEFAULT: u32 = 2;

    /// Out-of-range startup configuration is clamped rather than rejected
    /// so a bad config file cannot keep the service from booting.
    pub fn new(initial: u32) -> Self {
        let clamped = initial.clamp(Self::MIN, Self::MAX);
        if clamped != initial {
            warn!(configured = initial, effective = clamped, "configured device limit out of range, clamped");
        }
        Self {
            limit: AtomicU32::new(clamped),
        }
    }

    pub fn get(&self) -> u32 {
        self.limit.load(Ordering::Relaxed)
    }

    /// Runtime updates are strict: values outside [MIN, MAX] are rejected
    /// and the previous limit is left unchanged.
    pub fn set(&self, new_limit: u32) -> Result<(), AppError> {
        if !(Self::MIN..=Self::MAX).contains(&new_limit) {
            return Err(AppError::InvalidCapacityValue { value: new_limit });
        }
        let previous = self.limit.swap(new_limit, Ordering::Relaxed);
        info!(previous, new_limit, "device limit updated");
        Ok(())
    }
}

impl Default for CapacityLimit {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_two() {
        assert_eq!(CapacityLimit::default().get(), 2);
    }

    #[test]
    fn set_accepts_full_valid_range() {
        let capacity = CapacityLimit::default();
        for value in CapacityLimit::MIN..=CapacityLimit::MAX {
            assert!(capacity.set(value).is_ok());
            assert_eq!(capacity.get(), value);
        }
    }

    #[test]
    fn set_rejects_out_of_range_and_keeps_previous() {
        let capacity = CapacityLimit::default();
        capacity.set(4).unwrap();

        assert!(matches!(capacity.set(0), Err(AppError::InvalidCapacityValue { value: 0 })));
        assert_eq!(capacity.get(), 4);

        assert!(matches!(capacity.set(15), Err(AppError::InvalidCapacityValue { value: 15 })));
        assert_eq!(capacity.get(), 4);
    }

    #[test]
    fn startup_value_is_clamped_not_rejected() {
        assert_eq!(CapacityLimit::new(0).get(), CapacityLimit::MIN);
        assert_eq!(CapacityLimit::new(99).get(), CapacityLimit::MAX);
        assert_eq!(CapacityLimit::new(7).get(), 7);
    }
}
