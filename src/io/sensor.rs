//! Time-of-flight ranging sensor capability
//!
//! The register-level driver lives outside this crate. The counter only needs
//! the operations below; every configuration call reports a driver status and
//! every read yields a distance together with its range status.

use crate::domain::types::{DistanceMode, SensorStatus};
use crate::domain::zone::Reading;
use std::collections::VecDeque;

/// Default 7-bit I2C address of the sensor
pub const DEFAULT_I2C_ADDRESS: u8 = 0x29;

/// Synchronous ranging sensor driver
pub trait RangingSensor {
    fn init(&mut self, address: u8) -> SensorStatus;
    fn set_offset(&mut self, offset_mm: i16) -> SensorStatus;
    fn set_xtalk(&mut self, xtalk_cps: u16) -> SensorStatus;
    fn set_distance_mode(&mut self, mode: DistanceMode) -> SensorStatus;
    fn set_timing_budget(&mut self, budget_ms: u16) -> SensorStatus;
    fn set_inter_measurement(&mut self, period_ms: u16);
    fn set_roi(&mut self, width: u8, height: u8) -> SensorStatus;
    fn set_roi_center(&mut self, center: u8);
    fn start_ranging(&mut self);
    fn stop_ranging(&mut self);

    /// Block until the next measurement for the programmed ROI is ready
    fn read_distance(&mut self) -> Reading;
}

impl<S: RangingSensor + ?Sized> RangingSensor for Box<S> {
    fn init(&mut self, address: u8) -> SensorStatus {
        (**self).init(address)
    }
    fn set_offset(&mut self, offset_mm: i16) -> SensorStatus {
        (**self).set_offset(offset_mm)
    }
    fn set_xtalk(&mut self, xtalk_cps: u16) -> SensorStatus {
        (**self).set_xtalk(xtalk_cps)
    }
    fn set_distance_mode(&mut self, mode: DistanceMode) -> SensorStatus {
        (**self).set_distance_mode(mode)
    }
    fn set_timing_budget(&mut self, budget_ms: u16) -> SensorStatus {
        (**self).set_timing_budget(budget_ms)
    }
    fn set_inter_measurement(&mut self, period_ms: u16) {
        (**self).set_inter_measurement(period_ms)
    }
    fn set_roi(&mut self, width: u8, height: u8) -> SensorStatus {
        (**self).set_roi(width, height)
    }
    fn set_roi_center(&mut self, center: u8) {
        (**self).set_roi_center(center)
    }
    fn start_ranging(&mut self) {
        (**self).start_ranging()
    }
    fn stop_ranging(&mut self) {
        (**self).stop_ranging()
    }
    fn read_distance(&mut self) -> Reading {
        (**self).read_distance()
    }
}

/// Replays a fixed sequence of readings.
///
/// Once the script is exhausted the fallback reading is returned forever.
/// Configuration calls are recorded so callers can assert on them.
#[derive(Debug, Default)]
pub struct ScriptedSensor {
    script: VecDeque<Reading>,
    fallback: Option<Reading>,
    init_status: SensorStatus,
    offset_status: SensorStatus,
    xtalk_status: SensorStatus,
    distance_mode_status: SensorStatus,
    timing_budget_status: SensorStatus,
    ranging: bool,
    distance_mode: Option<DistanceMode>,
    timing_budget_ms: Option<u16>,
    inter_measurement_ms: Option<u16>,
    roi: Option<(u8, u8)>,
    roi_center: Option<u8>,
    reads: usize,
}

impl ScriptedSensor {
    pub fn new(script: impl IntoIterator<Item = Reading>) -> Self {
        Self { script: script.into_iter().collect(), ..Default::default() }
    }

    /// Reading returned after the script runs out
    pub fn with_fallback(mut self, reading: Reading) -> Self {
        self.fallback = Some(reading);
        self
    }

    pub fn with_init_status(mut self, status: SensorStatus) -> Self {
        self.init_status = status;
        self
    }

    pub fn with_offset_status(mut self, status: SensorStatus) -> Self {
        self.offset_status = status;
        self
    }

    pub fn with_xtalk_status(mut self, status: SensorStatus) -> Self {
        self.xtalk_status = status;
        self
    }

    pub fn with_distance_mode_status(mut self, status: SensorStatus) -> Self {
        self.distance_mode_status = status;
        self
    }

    pub fn with_timing_budget_status(mut self, status: SensorStatus) -> Self {
        self.timing_budget_status = status;
        self
    }

    /// Append readings to the end of the script
    pub fn push_readings(&mut self, readings: impl IntoIterator<Item = Reading>) {
        self.script.extend(readings);
    }

    pub fn is_ranging(&self) -> bool {
        self.ranging
    }

    pub fn distance_mode(&self) -> Option<DistanceMode> {
        self.distance_mode
    }

    pub fn timing_budget_ms(&self) -> Option<u16> {
        self.timing_budget_ms
    }

    pub fn inter_measurement_ms(&self) -> Option<u16> {
        self.inter_measurement_ms
    }

    /// Last programmed ROI as (width, height, center)
    pub fn last_roi(&self) -> Option<(u8, u8, u8)> {
        match (self.roi, self.roi_center) {
            (Some((w, h)), Some(c)) => Some((w, h, c)),
            _ => None,
        }
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl RangingSensor for ScriptedSensor {
    fn init(&mut self, _address: u8) -> SensorStatus {
        self.init_status
    }

    fn set_offset(&mut self, _offset_mm: i16) -> SensorStatus {
        self.offset_status
    }

    fn set_xtalk(&mut self, _xtalk_cps: u16) -> SensorStatus {
        self.xtalk_status
    }

    fn set_distance_mode(&mut self, mode: DistanceMode) -> SensorStatus {
        if self.distance_mode_status.is_ok() {
            self.distance_mode = Some(mode);
        }
        self.distance_mode_status
    }

    fn set_timing_budget(&mut self, budget_ms: u16) -> SensorStatus {
        if self.timing_budget_status.is_ok() {
            self.timing_budget_ms = Some(budget_ms);
        }
        self.timing_budget_status
    }

    fn set_inter_measurement(&mut self, period_ms: u16) {
        self.inter_measurement_ms = Some(period_ms);
    }

    fn set_roi(&mut self, width: u8, height: u8) -> SensorStatus {
        self.roi = Some((width, height));
        SensorStatus::OK
    }

    fn set_roi_center(&mut self, center: u8) {
        self.roi_center = Some(center);
    }

    fn start_ranging(&mut self) {
        self.ranging = true;
    }

    fn stop_ranging(&mut self) {
        self.ranging = false;
    }

    fn read_distance(&mut self) -> Reading {
        self.reads += 1;
        self.script
            .pop_front()
            .or(self.fallback)
            .unwrap_or(Reading { distance_mm: 0, status: SensorStatus(4) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_sensor_replays_then_falls_back() {
        let mut sensor =
            ScriptedSensor::new([Reading::ok(10), Reading::ok(20)]).with_fallback(Reading::ok(99));
        assert_eq!(sensor.read_distance().distance_mm, 10);
        assert_eq!(sensor.read_distance().distance_mm, 20);
        assert_eq!(sensor.read_distance().distance_mm, 99);
        assert_eq!(sensor.reads(), 3);
    }

    #[test]
    fn test_scripted_sensor_without_fallback_reports_out_of_range() {
        let mut sensor = ScriptedSensor::default();
        let reading = sensor.read_distance();
        assert!(!reading.status.is_ok());
    }

    #[test]
    fn test_boxed_sensor_delegates() {
        let mut sensor: Box<dyn RangingSensor + Send> =
            Box::new(ScriptedSensor::new([Reading::ok(42)]));
        assert_eq!(sensor.init(DEFAULT_I2C_ADDRESS), SensorStatus::OK);
        assert_eq!(sensor.read_distance().distance_mm, 42);
    }
}
