//! People counter controller
//!
//! Owns the sensor, both zones and the per-tick pipeline:
//! - Zone sampling (one zone per tick, min-filtered)
//! - Occupancy classification and path tracking
//! - Running count, telemetry and metrics on each crossing
//! - Ranging health after every read
//!
//! Sensor reads block, so the controller runs on a dedicated thread and
//! talks to the async side only through channels.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::types::{Direction, SensorStatus, ZoneId};
use crate::domain::zone::Zone;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::sensor::RangingSensor;
use crate::io::telemetry::Telemetry;
use crate::io::watchdog::Watchdog;
use crate::services::calibrator::Calibrator;
use crate::services::health::SensorHealth;
use crate::services::path_tracker::PathTracker;
use crate::services::ranging::{apply_range_mode, RangeSettings};
use crate::services::sampler::ZoneSampler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Version string published at setup
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

/// Sensor setup failures that leave the counter unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("sensor init failed with status {0}")]
    Init(SensorStatus),
    #[error("offset calibration write failed with status {0}")]
    Offset(SensorStatus),
    #[error("crosstalk calibration write failed with status {0}")]
    Xtalk(SensorStatus),
}

/// Operator requests handled between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Recalibrate,
    ResetCount,
}

/// Doorway people counter
pub struct PeopleCounter<S: RangingSensor> {
    pub(crate) config: Config,
    pub(crate) sensor: S,
    pub(crate) zones: [Zone; 2],
    pub(crate) sampler: ZoneSampler,
    pub(crate) tracker: PathTracker,
    pub(crate) health: SensorHealth,
    pub(crate) calibrator: Calibrator,
    pub(crate) range: RangeSettings,
    /// Signed running count (entries minus exits)
    pub(crate) count: i64,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) telemetry: Arc<dyn Telemetry>,
    pub(crate) watchdog: Box<dyn Watchdog>,
    /// Last published values, to publish on change only
    pub(crate) last_presence: Option<bool>,
    pub(crate) last_status: Option<SensorStatus>,
    pub(crate) last_distance_publish: Option<Instant>,
    pub(crate) ready: bool,
}

impl<S: RangingSensor> PeopleCounter<S> {
    pub fn new(
        config: Config,
        sensor: S,
        metrics: Arc<Metrics>,
        telemetry: Arc<dyn Telemetry>,
        watchdog: Box<dyn Watchdog>,
    ) -> Self {
        let zones = [
            Zone::new(ZoneId::Entry, config.initial_roi(ZoneId::Entry)),
            Zone::new(ZoneId::Exit, config.initial_roi(ZoneId::Exit)),
        ];
        Self {
            sampler: ZoneSampler::new(config.sampling_size()),
            tracker: PathTracker::new(config.invert_direction()),
            health: SensorHealth::new(),
            calibrator: Calibrator::new(config.calibration_settings()),
            range: RangeSettings::default(),
            count: 0,
            zones,
            config,
            sensor,
            metrics,
            telemetry,
            watchdog,
            last_presence: None,
            last_status: None,
            last_distance_publish: None,
            ready: false,
        }
    }

    /// Bring the sensor up and derive thresholds.
    ///
    /// Init and offset/crosstalk write failures are fatal; the caller must
    /// not tick after an error.
    pub fn setup(&mut self) -> Result<(), SetupError> {
        self.telemetry.version(VERSION);
        info!(version = VERSION, "counter_setup_started");

        let status = self.sensor.init(self.config.i2c_address());
        if !status.is_ok() {
            return Err(SetupError::Init(status));
        }
        info!(address = format!("{:#04x}", self.config.i2c_address()), "sensor_initialized");

        if let Some(offset_mm) = self.config.offset_mm() {
            let status = self.sensor.set_offset(offset_mm);
            if !status.is_ok() {
                return Err(SetupError::Offset(status));
            }
            info!(offset_mm, "offset_applied");
        }
        if let Some(xtalk_cps) = self.config.xtalk_cps() {
            let status = self.sensor.set_xtalk(xtalk_cps);
            if !status.is_ok() {
                return Err(SetupError::Xtalk(status));
            }
            info!(xtalk_cps, "xtalk_applied");
        }

        self.configure_thresholds(self.config.calibration_enabled());
        self.start_ranging();
        self.ready = true;
        info!(
            mode = %self.range.mode.as_str(),
            invert_direction = self.config.invert_direction(),
            sampling_size = self.config.sampling_size(),
            "counter_ready"
        );
        Ok(())
    }

    /// Rerun calibration on demand, then resume ranging from a clean state
    pub fn recalibrate(&mut self) {
        if !self.ready {
            warn!("recalibrate_before_setup_ignored");
            return;
        }
        self.configure_thresholds(true);
        self.sampler.clear_windows();
        self.sampler.restart();
        self.tracker = PathTracker::new(self.config.invert_direction());
        self.start_ranging();
    }

    /// Calibration (when requested) followed by the manual override (when enabled)
    fn configure_thresholds(&mut self, calibrate: bool) {
        if calibrate {
            let result = self.calibrator.calibrate(&mut self.sensor, &mut self.zones, &*self.watchdog);
            self.range = result.range;
            self.metrics.record_calibration();
            for snapshot in &result.zones {
                self.telemetry.zone_config(snapshot);
            }
        }

        if let Some(mode) = self.config.manual_range_mode() {
            self.range = apply_range_mode(&mut self.sensor, mode);
            let threshold = self.config.manual_threshold_mm();
            // One shared max; a calibrated min could sit above it
            for zone in &mut self.zones {
                zone.set_max_threshold(threshold);
                zone.clear_min_threshold();
                self.telemetry.zone_config(&zone.snapshot());
            }
            info!(mode = %mode.as_str(), threshold_mm = threshold, "manual_mode_applied");
        } else if !calibrate {
            self.range = apply_range_mode(&mut self.sensor, self.range.mode);
            warn!("no_thresholds_configured");
        }
    }

    fn start_ranging(&mut self) {
        self.sensor.set_inter_measurement(self.range.inter_measurement_ms);
        self.sensor.start_ranging();
    }

    /// Run one control-loop iteration. Returns the crossing it completed, if any.
    pub fn tick(&mut self) -> Option<Direction> {
        let started = Instant::now();
        let sample = self.sampler.sample(&mut self.zones, &mut self.sensor);
        self.health.record(sample.raw.status);

        let crossing = sample.denoised.and_then(|distance| self.handle_sample(sample.zone, distance));

        let report = self.health.check();
        self.handle_health_report(report);

        self.metrics.record_tick(started.elapsed().as_micros() as u64);
        crossing
    }

    /// Publish live distances if the update interval has elapsed
    pub fn maybe_publish_distances(&mut self, now: Instant) {
        let interval = Duration::from_millis(self.config.update_interval_ms());
        let due = self.last_distance_publish.map_or(true, |last| now.duration_since(last) >= interval);
        if due {
            self.publish_distances();
            self.last_distance_publish = Some(now);
        }
    }

    pub fn publish_distances(&self) {
        self.telemetry.distances(
            self.zones[ZoneId::Entry.index()].distance(),
            self.zones[ZoneId::Exit.index()].distance(),
        );
    }

    /// Apply every queued operator command
    pub fn drain_commands(&mut self, commands: &mut mpsc::Receiver<ControlCommand>) {
        while let Ok(command) = commands.try_recv() {
            self.handle_command(command);
        }
    }

    /// Blocking control loop; returns when `shutdown` is set
    pub fn run(
        &mut self,
        shutdown: watch::Receiver<bool>,
        mut commands: mpsc::Receiver<ControlCommand>,
    ) {
        if !self.ready {
            error!("control_loop_started_before_setup");
            return;
        }
        info!("control_loop_started");
        while !*shutdown.borrow() {
            self.drain_commands(&mut commands);
            self.tick();
            self.watchdog.feed();
            self.maybe_publish_distances(Instant::now());
        }
        self.sensor.stop_ranging();
        info!(count = self.count, "control_loop_stopped");
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    pub fn zone(&self, id: ZoneId) -> &Zone {
        &self.zones[id.index()]
    }

    pub fn range(&self) -> RangeSettings {
        self.range
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }
}
