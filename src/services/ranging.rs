//! Range-mode programming
//!
//! Switching tiers stops ranging, programs the distance mode and timing
//! budget, and derives the inter-measurement delay. Rejected writes are
//! logged and the switch carries on with whatever the sensor accepted.

use crate::domain::types::RangeMode;
use crate::io::sensor::RangingSensor;
use tracing::{error, info};

/// Range-tier breakpoints on the optimized distance (mm)
pub const SHORT_DISTANCE_THRESHOLD_MM: u16 = 1300;
pub const MEDIUM_DISTANCE_THRESHOLD_MM: u16 = 2000;
pub const MEDIUM_LONG_DISTANCE_THRESHOLD_MM: u16 = 2700;
pub const LONG_DISTANCE_THRESHOLD_MM: u16 = 3400;

/// Timing currently programmed into the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSettings {
    pub mode: RangeMode,
    pub timing_budget_ms: u16,
    pub inter_measurement_ms: u16,
}

impl RangeSettings {
    pub fn for_mode(mode: RangeMode) -> Self {
        Self {
            mode,
            timing_budget_ms: mode.timing_budget_ms(),
            inter_measurement_ms: mode.inter_measurement_ms(),
        }
    }
}

impl Default for RangeSettings {
    fn default() -> Self {
        Self::for_mode(RangeMode::Medium)
    }
}

/// Tier for a single optimized distance
pub fn tier_for_distance(distance_mm: u16) -> RangeMode {
    if distance_mm <= SHORT_DISTANCE_THRESHOLD_MM {
        RangeMode::Short
    } else if distance_mm <= MEDIUM_DISTANCE_THRESHOLD_MM {
        RangeMode::Medium
    } else if distance_mm <= MEDIUM_LONG_DISTANCE_THRESHOLD_MM {
        RangeMode::MediumLong
    } else if distance_mm <= LONG_DISTANCE_THRESHOLD_MM {
        RangeMode::Long
    } else {
        RangeMode::Max
    }
}

/// Tier for both zones; the shorter tier wins when they disagree
pub fn select_range_mode(entry_mm: u16, exit_mm: u16) -> RangeMode {
    tier_for_distance(entry_mm.min(exit_mm))
}

/// Program a range tier into the sensor
pub fn apply_range_mode<S: RangingSensor + ?Sized>(sensor: &mut S, mode: RangeMode) -> RangeSettings {
    let settings = RangeSettings::for_mode(mode);
    sensor.stop_ranging();

    let distance_mode = mode.distance_mode();
    let status = sensor.set_distance_mode(distance_mode);
    if !status.is_ok() {
        error!(mode = ?distance_mode, status = %status, "distance_mode_rejected");
    }

    let status = sensor.set_timing_budget(settings.timing_budget_ms);
    if !status.is_ok() {
        error!(
            timing_budget_ms = settings.timing_budget_ms,
            status = %status,
            "timing_budget_rejected"
        );
    }

    info!(
        mode = %mode.as_str(),
        timing_budget_ms = settings.timing_budget_ms,
        inter_measurement_ms = settings.inter_measurement_ms,
        "range_mode_set"
    );
    settings
}
