//! Per-tick handlers for PeopleCounter

use super::{ControlCommand, PeopleCounter};
use crate::domain::types::{Direction, ZoneId};
use crate::io::sensor::RangingSensor;
use crate::services::health::HealthReport;
use crate::services::path_tracker::TrackOutcome;
use tracing::{debug, info};

impl<S: RangingSensor> PeopleCounter<S> {
    /// Classify a denoised distance and feed it to the path tracker
    pub(crate) fn handle_sample(&mut self, zone: ZoneId, distance_mm: u16) -> Option<Direction> {
        let occupancy = self.zones[zone.index()].classify(distance_mm);
        debug!(zone = %zone, distance_mm, occupancy = ?occupancy, "zone_classified");
        let outcome = self.tracker.track(zone, occupancy);
        self.handle_track_outcome(outcome)
    }

    pub(crate) fn handle_track_outcome(&mut self, outcome: TrackOutcome) -> Option<Direction> {
        if let Some(present) = outcome.presence {
            self.metrics.set_presence(present);
            if self.last_presence != Some(present) {
                self.telemetry.presence(present);
                self.last_presence = Some(present);
            }
        }

        if outcome.reset_windows {
            self.sampler.clear_windows();
        }
        if outcome.discarded {
            self.metrics.record_path_discarded();
        }

        let direction = outcome.direction?;
        self.count += direction.delta();
        match direction {
            Direction::Entry => self.metrics.record_entry(),
            Direction::Exit => self.metrics.record_exit(),
        }
        self.metrics.set_people_count(self.count);
        self.telemetry.crossing(direction);
        self.telemetry.people_count(self.count);
        info!(direction = %direction.label(), count = self.count, "people_count_updated");
        Some(direction)
    }

    pub(crate) fn handle_health_report(&mut self, report: HealthReport) {
        self.metrics.set_sensor_healthy(report.healthy);
        if report.ranging_error {
            self.metrics.record_ranging_error();
        }
        if let Some(status) = report.publish {
            if self.last_status != Some(status) {
                self.telemetry.sensor_status(status);
                self.last_status = Some(status);
            }
        }
    }

    pub(crate) fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Recalibrate => {
                info!("recalibration_requested");
                self.recalibrate();
            }
            ControlCommand::ResetCount => {
                info!(previous = self.count, "people_count_reset");
                self.count = 0;
                self.metrics.set_people_count(0);
                self.telemetry.people_count(0);
            }
        }
    }
}
