//! Encoder counts versus engineering units.

use core::f64::consts::TAU;

use crate::config::AxisConfig;
use crate::error::Error;

/// Position scale counts a full output-shaft turn as
/// `counts_per_rev * gear_ratio`. Velocity scale is motor side only, without
/// the gear ratio, matching what the drive reports in 0x606C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitScale {
    counts_per_rev: u32,
    gear_ratio: f64,
}

impl UnitScale {
    pub fn new(counts_per_rev: u32, gear_ratio: f64) -> Result<Self, Error> {
        if counts_per_rev == 0 {
            return Err(Error::InvalidArgument("counts_per_rev must be non-zero".to_string()));
        }
        if !(gear_ratio.is_finite() && gear_ratio > 0.0) {
            return Err(Error::InvalidArgument(format!("gear_ratio {} must be positive", gear_ratio)));
        }
        Ok(UnitScale { counts_per_rev, gear_ratio })
    }

    pub fn counts_per_rev(&self) -> u32 {
        self.counts_per_rev
    }

    pub fn gear_ratio(&self) -> f64 {
        self.gear_ratio
    }

    /// Truncates toward zero; saturates at the `i32` range.
    pub fn radians_to_counts(&self, radians: f64) -> i32 {
        (radians / TAU * self.counts_per_rev as f64 * self.gear_ratio) as i32
    }

    pub fn counts_to_radians(&self, counts: i32) -> f64 {
        counts as f64 / (self.counts_per_rev as f64 * self.gear_ratio) * TAU
    }

    pub fn rpm_to_counts_per_sec(&self, rpm: f64) -> i32 {
        (rpm * self.counts_per_rev as f64 / 60.0) as i32
    }

    pub fn counts_per_sec_to_rpm(&self, counts_per_sec: i32) -> f64 {
        counts_per_sec as f64 * 60.0 / self.counts_per_rev as f64
    }
}

impl TryFrom<&AxisConfig> for UnitScale {
    type Error = Error;

    fn try_from(config: &AxisConfig) -> Result<Self, Error> {
        UnitScale::new(config.counts_per_rev, config.gear_ratio)
    }
}
