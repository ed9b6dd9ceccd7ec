//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations so the control loop never contends
//! with the reporter or the Prometheus endpoint. Reporting is the only
//! operation that resets anything (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Control-loop ticks ever run (monotonic)
    ticks_total: AtomicU64,
    /// Ticks since last report (reset on report)
    ticks_since_report: AtomicU64,
    /// Sum of tick latencies in microseconds (reset on report)
    tick_latency_sum_us: AtomicU64,
    /// Max tick latency in microseconds (reset on report)
    tick_latency_max_us: AtomicU64,
    /// Tick latency histogram buckets (reset on report)
    tick_latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Cumulative tick latency histogram for Prometheus (never reset)
    tick_latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    tick_latency_sum_total_us: AtomicU64,
    entries_total: AtomicU64,
    exits_total: AtomicU64,
    /// Full paths that matched neither direction (monotonic)
    paths_discarded_total: AtomicU64,
    /// Transient ranging faults (monotonic)
    ranging_errors_total: AtomicU64,
    calibrations_total: AtomicU64,
    /// Telemetry messages dropped due to channel full (monotonic)
    telemetry_dropped_total: AtomicU64,
    /// Commands received over MQTT (monotonic)
    commands_total: AtomicU64,
    /// Signed running people count (gauge)
    people_count: AtomicI64,
    /// Last published presence (0/1 gauge)
    presence: AtomicU64,
    /// Last consecutive-OK evaluation (0/1 gauge)
    sensor_healthy: AtomicU64,
    watchdog_feeds: AtomicU64,
    /// Wall clock of the latest feed (unix ms)
    watchdog_last_feed_ms: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            ticks_since_report: AtomicU64::new(0),
            tick_latency_sum_us: AtomicU64::new(0),
            tick_latency_max_us: AtomicU64::new(0),
            tick_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            tick_latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            tick_latency_sum_total_us: AtomicU64::new(0),
            entries_total: AtomicU64::new(0),
            exits_total: AtomicU64::new(0),
            paths_discarded_total: AtomicU64::new(0),
            ranging_errors_total: AtomicU64::new(0),
            calibrations_total: AtomicU64::new(0),
            telemetry_dropped_total: AtomicU64::new(0),
            commands_total: AtomicU64::new(0),
            people_count: AtomicI64::new(0),
            presence: AtomicU64::new(0),
            sensor_healthy: AtomicU64::new(0),
            watchdog_feeds: AtomicU64::new(0),
            watchdog_last_feed_ms: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record one control-loop tick with its processing latency (lock-free)
    #[inline]
    pub fn record_tick(&self, latency_us: u64) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
        self.ticks_since_report.fetch_add(1, Ordering::Relaxed);
        self.tick_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.tick_latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.tick_latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.tick_latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.tick_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_entry(&self) {
        self.entries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_exit(&self) {
        self.exits_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_path_discarded(&self) {
        self.paths_discarded_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ranging_error(&self) {
        self.ranging_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_calibration(&self) {
        self.calibrations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a telemetry message dropped due to channel full (lock-free)
    #[inline]
    pub fn record_telemetry_dropped(&self) {
        self.telemetry_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command(&self) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_people_count(&self, count: i64) {
        self.people_count.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_presence(&self, present: bool) {
        self.presence.store(u64::from(present), Ordering::Relaxed);
    }

    #[inline]
    pub fn set_sensor_healthy(&self, healthy: bool) {
        self.sensor_healthy.store(u64::from(healthy), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_watchdog_feed(&self) {
        self.watchdog_feeds.fetch_add(1, Ordering::Relaxed);
        self.watchdog_last_feed_ms.store(unix_millis(), Ordering::Relaxed);
    }

    pub fn ticks_total(&self) -> u64 {
        self.ticks_total.load(Ordering::Relaxed)
    }

    pub fn entries_total(&self) -> u64 {
        self.entries_total.load(Ordering::Relaxed)
    }

    pub fn exits_total(&self) -> u64 {
        self.exits_total.load(Ordering::Relaxed)
    }

    pub fn paths_discarded_total(&self) -> u64 {
        self.paths_discarded_total.load(Ordering::Relaxed)
    }

    pub fn ranging_errors_total(&self) -> u64 {
        self.ranging_errors_total.load(Ordering::Relaxed)
    }

    pub fn calibrations_total(&self) -> u64 {
        self.calibrations_total.load(Ordering::Relaxed)
    }

    pub fn telemetry_dropped_total(&self) -> u64 {
        self.telemetry_dropped_total.load(Ordering::Relaxed)
    }

    pub fn commands_total(&self) -> u64 {
        self.commands_total.load(Ordering::Relaxed)
    }

    pub fn people_count(&self) -> i64 {
        self.people_count.load(Ordering::Relaxed)
    }

    pub fn presence(&self) -> bool {
        self.presence.load(Ordering::Relaxed) != 0
    }

    pub fn sensor_healthy(&self) -> bool {
        self.sensor_healthy.load(Ordering::Relaxed) != 0
    }

    pub fn watchdog_feeds(&self) -> u64 {
        self.watchdog_feeds.load(Ordering::Relaxed)
    }

    pub fn watchdog_last_feed_ms(&self) -> u64 {
        self.watchdog_last_feed_ms.load(Ordering::Relaxed)
    }

    /// Cumulative tick latency histogram and sum, for Prometheus
    pub fn tick_latency_histogram(&self) -> ([u64; NUM_BUCKETS], u64) {
        (
            load_buckets(&self.tick_latency_buckets_total),
            self.tick_latency_sum_total_us.load(Ordering::Relaxed),
        )
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let tick_count = self.ticks_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.tick_latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.tick_latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.tick_latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let ticks_per_sec = if elapsed.as_secs_f64() > 0.0 {
            tick_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let avg_latency = if tick_count > 0 { latency_sum / tick_count } else { 0 };

        MetricsSummary {
            ticks_total: self.ticks_total(),
            ticks_per_sec,
            avg_tick_latency_us: avg_latency,
            max_tick_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            lat_buckets,
            people_count: self.people_count(),
            entries_total: self.entries_total(),
            exits_total: self.exits_total(),
            paths_discarded_total: self.paths_discarded_total(),
            ranging_errors_total: self.ranging_errors_total(),
            calibrations_total: self.calibrations_total(),
            telemetry_dropped_total: self.telemetry_dropped_total(),
            sensor_healthy: self.sensor_healthy(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug)]
pub struct MetricsSummary {
    pub ticks_total: u64,
    pub ticks_per_sec: f64,
    pub avg_tick_latency_us: u64,
    pub max_tick_latency_us: u64,
    /// Tick latency histogram buckets since the previous report
    pub lat_buckets: [u64; NUM_BUCKETS],
    pub lat_p50_us: u64,
    pub lat_p95_us: u64,
    pub lat_p99_us: u64,
    pub people_count: i64,
    pub entries_total: u64,
    pub exits_total: u64,
    pub paths_discarded_total: u64,
    pub ranging_errors_total: u64,
    pub calibrations_total: u64,
    pub telemetry_dropped_total: u64,
    pub sensor_healthy: bool,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ticks_total = %self.ticks_total,
            ticks_per_sec = format!("{:.1}", self.ticks_per_sec),
            avg_latency_us = %self.avg_tick_latency_us,
            max_latency_us = %self.max_tick_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            people_count = %self.people_count,
            entries = %self.entries_total,
            exits = %self.exits_total,
            discarded = %self.paths_discarded_total,
            ranging_errors = %self.ranging_errors_total,
            healthy = %self.sensor_healthy,
            "metrics"
        );
    }
}
