//! Ranging status tracking
//!
//! A read is healthy only when it and the read before it both returned the
//! driver's success code. The pending status is cleared after every check so
//! one bad read cannot poison the flag for good.

use crate::domain::types::SensorStatus;
use tracing::{debug, error, warn};

/// Outcome of one health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: bool,
    /// Status to publish to telemetry, if any
    pub publish: Option<SensorStatus>,
    /// The checked read was a transient ranging fault
    pub ranging_error: bool,
}

#[derive(Debug, Default)]
pub struct SensorHealth {
    current: SensorStatus,
    previous: SensorStatus,
}

impl SensorHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the status of the read taken this tick
    pub fn record(&mut self, status: SensorStatus) {
        self.current = status;
    }

    /// Evaluate the recorded status against the previous one
    pub fn check(&mut self) -> HealthReport {
        let current = self.current;
        let previous = self.previous;
        debug!(status = %current, last_status = %previous, "sensor_status");

        let mut report = HealthReport { healthy: false, publish: None, ranging_error: false };
        if current.is_ok() && previous.is_ok() {
            report.healthy = true;
            report.publish = Some(current);
        } else if current.is_transient_error() {
            error!(status = %current, "ranging_failed");
            report.publish = Some(current);
            report.ranging_error = true;
        } else if !current.is_ok() {
            warn!(status = %current, "ranging_status_unknown");
        }

        self.previous = current;
        self.current = SensorStatus::OK;
        report
    }

    pub fn previous(&self) -> SensorStatus {
        self.previous
    }
}
