//! Supervisory watchdog collaborator
//!
//! Long blocking phases (calibration sampling) feed the watchdog between
//! reads so an external supervisor does not reset the device.

use crate::infra::metrics::Metrics;
use std::sync::Arc;

pub trait Watchdog: Send + Sync {
    fn feed(&self);
}

/// Watchdog for hosts without a supervisor
pub struct NoopWatchdog;

impl Watchdog for NoopWatchdog {
    #[inline]
    fn feed(&self) {}
}

/// Records every feed as a heartbeat in the metrics, so a stalled control
/// thread shows up as a stale `watchdog_last_feed` on the metrics endpoint.
pub struct MetricsWatchdog {
    metrics: Arc<Metrics>,
}

impl MetricsWatchdog {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl Watchdog for MetricsWatchdog {
    #[inline]
    fn feed(&self) {
        self.metrics.record_watchdog_feed();
    }
}
