//! Simulated doorway
//!
//! Stands in for the ranging hardware when no driver is linked. The floor
//! reads at a fixed distance with a deterministic jitter pattern, and every
//! `period_reads` reads one person walks through the doorway in three
//! phases: first side only, both sides, second side only.

use crate::domain::types::{Direction, DistanceMode, SensorStatus};
use crate::domain::zone::Reading;
use crate::infra::config::SimConfig;
use crate::io::sensor::RangingSensor;
use crate::services::calibrator::roi_centers;
use std::time::Duration;
use tracing::{debug, info};

/// Added to every reading in turn (mm)
const JITTER_MM: [i32; 10] = [0, 7, -5, 12, -9, 3, -2, 10, -12, 5];

/// Direction of successive simulated crossings
const WALK_PATTERN: [Direction; 3] = [Direction::Entry, Direction::Entry, Direction::Exit];

/// Status reported for injected faults and reads while stopped
const SIGNAL_FAIL: SensorStatus = SensorStatus(4);

pub struct SimulatedSensor {
    config: SimConfig,
    /// ROI centers that look at the entry side of the doorway
    entry_centers: [u8; 5],
    roi_center: u8,
    ranging: bool,
    distance_mode: DistanceMode,
    timing_budget_ms: u16,
    inter_measurement_ms: u16,
    reads: u64,
}

impl SimulatedSensor {
    pub fn new(config: SimConfig, advised_orientation: bool) -> Self {
        let entry_centers = [4, 5, 6, 7, 8].map(|size| roi_centers(size, advised_orientation).0);
        Self {
            config,
            entry_centers,
            roi_center: entry_centers[4],
            ranging: false,
            distance_mode: DistanceMode::Long,
            timing_budget_ms: 0,
            inter_measurement_ms: 0,
            reads: 0,
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Which sides of the doorway are occupied at a read index
    fn occupied(&self, read: u64) -> (bool, bool) {
        let period = self.config.period_reads.max(1);
        let phase_len = self.config.phase_reads.max(1);
        let start = period / 2;
        let position = read % period;
        if position < start || position >= start + 3 * phase_len {
            return (false, false);
        }
        let phase = (position - start) / phase_len;
        let direction = WALK_PATTERN[((read / period) % WALK_PATTERN.len() as u64) as usize];
        // Entries come from the exit side, exits from the entry side
        let (first_entry_side, second_entry_side) = match direction {
            Direction::Entry => (false, true),
            Direction::Exit => (true, false),
        };
        match phase {
            0 => (first_entry_side, !first_entry_side),
            1 => (true, true),
            _ => (second_entry_side, !second_entry_side),
        }
    }
}

impl RangingSensor for SimulatedSensor {
    fn init(&mut self, address: u8) -> SensorStatus {
        info!(address = format!("{address:#04x}"), "sim_sensor_initialized");
        SensorStatus::OK
    }

    fn set_offset(&mut self, offset_mm: i16) -> SensorStatus {
        debug!(offset_mm, "sim_offset_set");
        SensorStatus::OK
    }

    fn set_xtalk(&mut self, xtalk_cps: u16) -> SensorStatus {
        debug!(xtalk_cps, "sim_xtalk_set");
        SensorStatus::OK
    }

    fn set_distance_mode(&mut self, mode: DistanceMode) -> SensorStatus {
        self.distance_mode = mode;
        SensorStatus::OK
    }

    fn set_timing_budget(&mut self, budget_ms: u16) -> SensorStatus {
        self.timing_budget_ms = budget_ms;
        SensorStatus::OK
    }

    fn set_inter_measurement(&mut self, period_ms: u16) {
        self.inter_measurement_ms = period_ms;
    }

    fn set_roi(&mut self, _width: u8, _height: u8) -> SensorStatus {
        SensorStatus::OK
    }

    fn set_roi_center(&mut self, center: u8) {
        self.roi_center = center;
    }

    fn start_ranging(&mut self) {
        self.ranging = true;
    }

    fn stop_ranging(&mut self) {
        self.ranging = false;
    }

    fn read_distance(&mut self) -> Reading {
        if !self.ranging {
            return Reading { distance_mm: 0, status: SIGNAL_FAIL };
        }
        if self.config.realtime && self.inter_measurement_ms > 0 {
            std::thread::sleep(Duration::from_millis(u64::from(self.inter_measurement_ms)));
        }

        let read = self.reads;
        self.reads += 1;
        let fault_every = self.config.fault_every_reads;
        if fault_every > 0 && read > 0 && read % fault_every == 0 {
            return Reading { distance_mm: 0, status: SIGNAL_FAIL };
        }

        let (entry_occupied, exit_occupied) = self.occupied(read);
        let occupied = if self.entry_centers.contains(&self.roi_center) {
            entry_occupied
        } else {
            exit_occupied
        };
        let base = if occupied { self.config.person_mm } else { self.config.floor_mm };
        let jitter = JITTER_MM[(read % JITTER_MM.len() as u64) as usize];
        let distance = (i32::from(base) + jitter).clamp(0, i32::from(u16::MAX)) as u16;
        Reading::ok(distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimConfig {
        SimConfig {
            floor_mm: 2000,
            person_mm: 900,
            period_reads: 40,
            phase_reads: 4,
            fault_every_reads: 0,
            realtime: false,
        }
    }

    #[test]
    fn test_reads_fail_while_stopped() {
        let mut sensor = SimulatedSensor::new(config(), true);
        assert_eq!(sensor.read_distance().status, SIGNAL_FAIL);
        sensor.start_ranging();
        assert!(sensor.read_distance().status.is_ok());
    }

    #[test]
    fn test_empty_doorway_reads_floor() {
        let mut sensor = SimulatedSensor::new(config(), true);
        sensor.start_ranging();
        for _ in 0..20 {
            let reading = sensor.read_distance();
            assert!((1985..=2015).contains(&reading.distance_mm));
        }
    }

    #[test]
    fn test_first_walk_is_an_entry() {
        let sensor = SimulatedSensor::new(config(), true);
        // Crossing starts at read 20: exit side, both, entry side
        assert_eq!(sensor.occupied(19), (false, false));
        assert_eq!(sensor.occupied(20), (false, true));
        assert_eq!(sensor.occupied(24), (true, true));
        assert_eq!(sensor.occupied(28), (true, false));
        assert_eq!(sensor.occupied(32), (false, false));
        // Third walk in the pattern is an exit
        assert_eq!(sensor.occupied(100), (true, false));
    }

    #[test]
    fn test_fault_injection() {
        let mut sensor = SimulatedSensor::new(SimConfig { fault_every_reads: 3, ..config() }, true);
        sensor.start_ranging();
        let statuses: Vec<bool> = (0..7).map(|_| sensor.read_distance().status.is_ok()).collect();
        assert_eq!(statuses, vec![true, true, true, false, true, true, false]);
    }

    #[test]
    fn test_roi_center_selects_side() {
        let mut sensor = SimulatedSensor::new(config(), false);
        sensor.start_ranging();
        // Skip to the "exit side only" phase of the first walk
        for _ in 0..20 {
            sensor.read_distance();
        }
        sensor.set_roi_center(195);
        assert!(sensor.read_distance().distance_mm > 1900);
        sensor.set_roi_center(60);
        assert!(sensor.read_distance().distance_mm < 1000);
    }
}
