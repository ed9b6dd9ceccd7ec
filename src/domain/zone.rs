//! A single sensing zone: geometry, thresholds and the latest reading

use crate::domain::types::{Occupancy, Roi, SensorStatus, ZoneId};
use crate::io::sensor::RangingSensor;
use serde::Serialize;

/// One of the two logical regions of the sensor's field of view
#[derive(Debug, Clone)]
pub struct Zone {
    id: ZoneId,
    roi: Roi,
    /// Unset until calibrated; the lower bound is then skipped
    min_threshold: Option<u16>,
    max_threshold: u16,
    distance: u16,
}

/// Published geometry/threshold snapshot of a zone
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneSnapshot {
    pub zone: ZoneId,
    pub roi_width: u8,
    pub roi_height: u8,
    pub roi_center: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_threshold_mm: Option<u16>,
    pub max_threshold_mm: u16,
}

impl Zone {
    pub fn new(id: ZoneId, roi: Roi) -> Self {
        Self { id, roi, min_threshold: None, max_threshold: 0, distance: 0 }
    }

    /// Program this zone's ROI and take one raw reading.
    ///
    /// The stored distance is overwritten by every read, failed or not; the
    /// status travels with the returned reading.
    pub fn read_distance<S: RangingSensor + ?Sized>(&mut self, sensor: &mut S) -> Reading {
        let status = sensor.set_roi(self.roi.width, self.roi.height);
        if !status.is_ok() {
            tracing::debug!(zone = %self.id, status = %status, "zone_roi_rejected");
        }
        sensor.set_roi_center(self.roi.center);
        let reading = sensor.read_distance();
        self.distance = reading.distance_mm;
        reading
    }

    /// Occupancy for a (denoised) distance against this zone's thresholds
    pub fn classify(&self, distance_mm: u16) -> Occupancy {
        let above_min = self.min_threshold.map_or(true, |min| distance_mm > min);
        if above_min && distance_mm < self.max_threshold {
            Occupancy::Someone
        } else {
            Occupancy::Nobody
        }
    }

    pub fn update_roi(&mut self, width: u8, height: u8) {
        self.roi.width = width;
        self.roi.height = height;
    }

    pub fn set_roi_center(&mut self, center: u8) {
        self.roi.center = center;
    }

    pub fn set_max_threshold(&mut self, mm: u16) {
        self.max_threshold = mm;
    }

    pub fn set_min_threshold(&mut self, mm: u16) {
        self.min_threshold = Some(mm);
    }

    pub fn clear_min_threshold(&mut self) {
        self.min_threshold = None;
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn roi(&self) -> Roi {
        self.roi
    }

    pub fn min_threshold(&self) -> Option<u16> {
        self.min_threshold
    }

    pub fn max_threshold(&self) -> u16 {
        self.max_threshold
    }

    pub fn distance(&self) -> u16 {
        self.distance
    }

    pub fn snapshot(&self) -> ZoneSnapshot {
        ZoneSnapshot {
            zone: self.id,
            roi_width: self.roi.width,
            roi_height: self.roi.height,
            roi_center: self.roi.center,
            min_threshold_mm: self.min_threshold,
            max_threshold_mm: self.max_threshold,
        }
    }
}

/// One raw ranging result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub distance_mm: u16,
    pub status: SensorStatus,
}

impl Reading {
    pub fn ok(distance_mm: u16) -> Self {
        Self { distance_mm, status: SensorStatus::OK }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sensor::ScriptedSensor;

    fn zone() -> Zone {
        Zone::new(ZoneId::Entry, Roi { width: 6, height: 16, center: 167 })
    }

    #[test]
    fn test_classify_without_min_threshold() {
        let mut z = zone();
        z.set_max_threshold(600);
        assert_eq!(z.classify(400), Occupancy::Someone);
        assert_eq!(z.classify(0), Occupancy::Someone);
        assert_eq!(z.classify(600), Occupancy::Nobody);
        assert_eq!(z.classify(1500), Occupancy::Nobody);
    }

    #[test]
    fn test_classify_with_min_threshold() {
        let mut z = zone();
        z.set_max_threshold(1700);
        z.set_min_threshold(200);
        assert_eq!(z.classify(200), Occupancy::Nobody);
        assert_eq!(z.classify(201), Occupancy::Someone);
        assert_eq!(z.classify(1699), Occupancy::Someone);
    }

    #[test]
    fn test_read_distance_programs_roi() {
        let mut z = zone();
        let mut sensor = ScriptedSensor::new([Reading::ok(1234)]);
        let reading = z.read_distance(&mut sensor);
        assert_eq!(reading.distance_mm, 1234);
        assert_eq!(z.distance(), 1234);
        assert_eq!(sensor.last_roi(), Some((6, 16, 167)));
    }

    #[test]
    fn test_failed_read_overwrites_distance() {
        let mut z = zone();
        let mut sensor = ScriptedSensor::new([
            Reading::ok(900),
            Reading { distance_mm: 8191, status: SensorStatus(4) },
        ]);
        z.read_distance(&mut sensor);
        let reading = z.read_distance(&mut sensor);
        assert_eq!(reading.status, SensorStatus(4));
        assert_eq!(z.distance(), 8191);
    }

    #[test]
    fn test_clear_min_threshold() {
        let mut z = zone();
        z.set_max_threshold(300);
        z.set_min_threshold(400);
        assert_eq!(z.classify(350), Occupancy::Nobody);
        z.clear_min_threshold();
        assert_eq!(z.min_threshold(), None);
        assert_eq!(z.classify(350), Occupancy::Nobody);
        assert_eq!(z.classify(250), Occupancy::Someone);
    }
}
