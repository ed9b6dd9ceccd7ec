//! Statistical self-calibration of thresholds, ROI geometry and range mode
//!
//! Both zones are sampled many times against the empty doorway (floor
//! distance). Each zone's reference distance is its mean minus one standard
//! deviation, which biases thresholds towards the sensor and keeps far-field
//! noise from reading as an occupant. The reference distance picks the range
//! tier, optionally resizes/recenters the ROIs, and scales into thresholds.

use crate::domain::types::{RangeMode, Roi, ZoneId};
use crate::domain::zone::{Zone, ZoneSnapshot};
use crate::io::sensor::RangingSensor;
use crate::io::watchdog::Watchdog;
use crate::services::ranging::{apply_range_mode, select_range_mode, RangeSettings};
use crate::services::sampler::ZoneSampler;
use tracing::{debug, error, info, warn};

/// Smallest and largest square ROI side chosen by ROI calibration
const MIN_ROI_SIZE: u8 = 4;
const MAX_ROI_SIZE: u8 = 8;

/// Summary statistics of one zone's calibration samples (integer arithmetic)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneStatistics {
    pub sum: u64,
    pub mean: u64,
    /// Population variance
    pub variance: u64,
    pub std_dev: u64,
    /// `mean - std_dev`, the calibrated reference distance
    pub optimized: u16,
}

impl ZoneStatistics {
    pub fn from_samples(samples: &[u16]) -> Self {
        if samples.is_empty() {
            return Self { sum: 0, mean: 0, variance: 0, std_dev: 0, optimized: 0 };
        }
        let n = samples.len() as u64;
        let sum: u64 = samples.iter().map(|&d| u64::from(d)).sum();
        let sum_squared: u64 = samples.iter().map(|&d| u64::from(d) * u64::from(d)).sum();
        let mean = sum / n;
        let variance = (sum_squared / n).saturating_sub(mean * mean);
        let std_dev = (variance as f64).sqrt().floor() as u64;
        let optimized = mean.saturating_sub(std_dev).min(u64::from(u16::MAX)) as u16;
        Self { sum, mean, variance, std_dev, optimized }
    }
}

/// Inputs that shape a calibration run
#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    /// Sample pairs taken per pass
    pub attempts: usize,
    pub max_threshold_percentage: u16,
    /// 0 leaves the minimum threshold unset
    pub min_threshold_percentage: u16,
    pub roi_calibration: bool,
    pub advised_orientation: bool,
    /// Configured geometry each run starts from
    pub entry_roi: Roi,
    pub exit_roi: Roi,
}

/// Everything a calibration run decided
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    pub range: RangeSettings,
    pub statistics: [ZoneStatistics; 2],
    pub zones: [ZoneSnapshot; 2],
}

impl CalibrationResult {
    pub fn optimized(&self, zone: ZoneId) -> u16 {
        self.statistics[zone.index()].optimized
    }
}

pub struct Calibrator {
    settings: CalibrationSettings,
}

impl Calibrator {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    /// Run a full calibration. Ranging is stopped on return.
    pub fn calibrate<S: RangingSensor + ?Sized>(
        &self,
        sensor: &mut S,
        zones: &mut [Zone; 2],
        watchdog: &dyn Watchdog,
    ) -> CalibrationResult {
        info!(
            attempts = self.settings.attempts,
            roi_calibration = self.settings.roi_calibration,
            "calibration_started"
        );
        sensor.stop_ranging();

        // Sample with the medium budget regardless of the current tier
        let sampling = RangeSettings::for_mode(RangeMode::Medium);
        let distance_mode = RangeMode::Medium.distance_mode();
        let status = sensor.set_distance_mode(distance_mode);
        if !status.is_ok() {
            error!(mode = ?distance_mode, status = %status, "calibration_distance_mode_rejected");
        }
        let status = sensor.set_timing_budget(sampling.timing_budget_ms);
        if !status.is_ok() {
            error!(
                timing_budget_ms = sampling.timing_budget_ms,
                status = %status,
                "calibration_timing_budget_rejected"
            );
        }

        for (zone, roi) in
            zones.iter_mut().zip([self.settings.entry_roi, self.settings.exit_roi])
        {
            zone.update_roi(roi.width, roi.height);
            zone.set_roi_center(roi.center);
        }

        let mut statistics = self.sample_statistics(sensor, zones, sampling, watchdog);
        let range = apply_range_mode(
            sensor,
            select_range_mode(statistics[0].optimized, statistics[1].optimized),
        );

        if self.settings.roi_calibration {
            let min_distance = statistics[0].optimized.min(statistics[1].optimized);
            let size = roi_size_for_distance(min_distance);
            let (entry_center, exit_center) = roi_centers(size, self.settings.advised_orientation);
            for (zone, center) in zones.iter_mut().zip([entry_center, exit_center]) {
                zone.update_roi(size, size * 2);
                zone.set_roi_center(center);
            }
            info!(
                roi_size = size,
                entry_center = entry_center,
                exit_center = exit_center,
                "roi_recalibrated"
            );
            statistics = self.sample_statistics(sensor, zones, range, watchdog);
        }

        for zone in zones.iter_mut() {
            let optimized = u32::from(statistics[zone.id().index()].optimized);
            let max_threshold = scale_percent(optimized, self.settings.max_threshold_percentage);
            zone.set_max_threshold(max_threshold);
            zone.clear_min_threshold();
            if self.settings.min_threshold_percentage != 0 {
                let min_threshold = scale_percent(optimized, self.settings.min_threshold_percentage);
                // A min at or above the max leaves no occupied band at all
                if min_threshold < max_threshold {
                    zone.set_min_threshold(min_threshold);
                } else {
                    warn!(
                        zone = %zone.id(),
                        min_threshold_mm = min_threshold,
                        max_threshold_mm = max_threshold,
                        "min_threshold_not_below_max_skipped"
                    );
                }
            }
        }
        watchdog.feed();
        sensor.stop_ranging();

        let result = CalibrationResult {
            range,
            statistics,
            zones: [zones[0].snapshot(), zones[1].snapshot()],
        };
        for snapshot in &result.zones {
            info!(
                zone = %snapshot.zone,
                max_threshold_mm = snapshot.max_threshold_mm,
                min_threshold_mm = ?snapshot.min_threshold_mm,
                roi_width = snapshot.roi_width,
                roi_height = snapshot.roi_height,
                "zone_calibrated"
            );
        }
        result
    }

    fn sample_statistics<S: RangingSensor + ?Sized>(
        &self,
        sensor: &mut S,
        zones: &mut [Zone; 2],
        range: RangeSettings,
        watchdog: &dyn Watchdog,
    ) -> [ZoneStatistics; 2] {
        sensor.set_inter_measurement(range.inter_measurement_ms);
        sensor.start_ranging();
        let [entry, exit] =
            ZoneSampler::collect_raw(zones, sensor, self.settings.attempts.max(1), watchdog);
        let statistics = [ZoneStatistics::from_samples(&entry), ZoneStatistics::from_samples(&exit)];
        for (zone, stats) in ZoneId::ALL.iter().zip(&statistics) {
            debug!(
                zone = %zone,
                mean_mm = stats.mean,
                std_dev_mm = stats.std_dev,
                optimized_mm = stats.optimized,
                "zone_statistics"
            );
        }
        statistics
    }
}

/// Square ROI side for a reference distance.
///
/// The constants are empirical; keep them as they are until the ROI sizing
/// is re-measured on real mounts.
///
/// Pending a calibration-accuracy review: dividing the distance by 1000 in
/// integer arithmetic truncates to whole meters, giving only sizes 4 or 8
/// and a zero divisor under 1 m. The distance stays fractional here and the
/// result is rounded, so 1.5 m gives 7 rather than 4.
pub fn roi_size_for_distance(distance_mm: u16) -> u8 {
    let meters = f64::from(distance_mm) / 1000.0;
    let size = 16.0 * (1.0 - (0.15 * 2.0) / (0.34 * meters));
    size.round().clamp(f64::from(MIN_ROI_SIZE), f64::from(MAX_ROI_SIZE)) as u8
}

/// (entry, exit) ROI centers for a ROI size and mounting orientation
pub fn roi_centers(size: u8, advised_orientation: bool) -> (u8, u8) {
    if advised_orientation {
        match size {
            0..=4 => (150, 247),
            5 | 6 => (159, 239),
            _ => (167, 231),
        }
    } else {
        match size {
            0..=4 => (193, 58),
            5 | 6 => (194, 59),
            _ => (195, 60),
        }
    }
}

#[inline]
fn scale_percent(distance_mm: u32, percentage: u16) -> u16 {
    (distance_mm * u32::from(percentage) / 100).min(u32::from(u16::MAX)) as u16
}
