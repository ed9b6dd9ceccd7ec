//! Tests for the PeopleCounter module

use super::*;
use crate::domain::types::{DistanceMode, RangeMode};
use crate::domain::zone::Reading;
use crate::io::sensor::ScriptedSensor;
use crate::io::telemetry::{RecordingTelemetry, TelemetryEvent};
use crate::io::watchdog::NoopWatchdog;

const FLOOR: u16 = 2000;
const PERSON: u16 = 800;

/// Window of one sample and two calibration pairs keep scripts short
const BASE_CONFIG: &str = "[sensor]\nsampling_size = 1\n[calibration]\nattempts = 2\n";

/// Right (exit zone) first, then both, then left (entry zone)
const ENTRY_WALK: [(u16, u16); 5] =
    [(FLOOR, FLOOR), (FLOOR, PERSON), (PERSON, PERSON), (PERSON, FLOOR), (FLOOR, FLOOR)];

const EXIT_WALK: [(u16, u16); 5] =
    [(FLOOR, FLOOR), (PERSON, FLOOR), (PERSON, PERSON), (FLOOR, PERSON), (FLOOR, FLOOR)];

/// Test harness that keeps the recording sink and metrics reachable
struct TestCounter {
    counter: PeopleCounter<ScriptedSensor>,
    telemetry: Arc<RecordingTelemetry>,
    metrics: Arc<Metrics>,
}

impl std::ops::Deref for TestCounter {
    type Target = PeopleCounter<ScriptedSensor>;
    fn deref(&self) -> &Self::Target {
        &self.counter
    }
}

impl std::ops::DerefMut for TestCounter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.counter
    }
}

fn create_counter(toml: &str, sensor: ScriptedSensor) -> TestCounter {
    let config = Config::from_toml_str(toml).unwrap();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let metrics = Arc::new(Metrics::new());
    let counter = PeopleCounter::new(
        config,
        sensor,
        metrics.clone(),
        telemetry.clone(),
        Box::new(NoopWatchdog),
    );
    TestCounter { counter, telemetry, metrics }
}

/// Counter set up against an empty doorway at `FLOOR`
fn ready_counter(toml: &str) -> TestCounter {
    let sensor = ScriptedSensor::new(floor(4)).with_fallback(Reading::ok(FLOOR));
    let mut counter = create_counter(toml, sensor);
    counter.setup().unwrap();
    counter
}

fn floor(reads: usize) -> Vec<Reading> {
    vec![Reading::ok(FLOOR); reads]
}

/// Flatten (entry, exit) pairs in sampling order
fn walk(pairs: &[(u16, u16)]) -> Vec<Reading> {
    pairs.iter().flat_map(|&(entry, exit)| [Reading::ok(entry), Reading::ok(exit)]).collect()
}

/// Queue readings and tick until they are consumed
fn play(counter: &mut TestCounter, readings: Vec<Reading>) -> Vec<Direction> {
    let ticks = readings.len();
    counter.sensor_mut().push_readings(readings);
    (0..ticks).filter_map(|_| counter.tick()).collect()
}

#[test]
fn test_setup_calibrates_and_starts_ranging() {
    let counter = ready_counter(BASE_CONFIG);

    assert!(counter.is_ready());
    assert!(counter.sensor().is_ranging());
    assert_eq!(counter.range().mode, RangeMode::Medium);
    assert_eq!(counter.sensor().inter_measurement_ms(), Some(38));
    assert_eq!(counter.zone(ZoneId::Entry).max_threshold(), 1700);
    assert_eq!(counter.zone(ZoneId::Exit).max_threshold(), 1700);
    assert_eq!(counter.metrics.calibrations_total(), 1);

    let events = counter.telemetry.events();
    assert_eq!(events[0], TelemetryEvent::Version { version: VERSION.to_string() });
    assert_eq!(
        counter.telemetry.last_zone_config(ZoneId::Exit).map(|s| s.max_threshold_mm),
        Some(1700)
    );
}

#[test]
fn test_init_failure_is_fatal() {
    let sensor = ScriptedSensor::default().with_init_status(SensorStatus(-1));
    let mut counter = create_counter(BASE_CONFIG, sensor);

    assert_eq!(counter.setup(), Err(SetupError::Init(SensorStatus(-1))));
    assert!(!counter.is_ready());
    assert!(!counter.sensor().is_ranging());
    assert_eq!(counter.sensor().reads(), 0);
}

#[test]
fn test_offset_failure_only_when_configured() {
    let toml = "[sensor]\noffset_mm = 12\n[calibration]\nattempts = 2\n";
    let sensor = ScriptedSensor::new(floor(4)).with_offset_status(SensorStatus(-4));
    let mut counter = create_counter(toml, sensor);
    assert_eq!(counter.setup(), Err(SetupError::Offset(SensorStatus(-4))));

    let sensor = ScriptedSensor::new(floor(4)).with_offset_status(SensorStatus(-4));
    let mut counter = create_counter(BASE_CONFIG, sensor);
    assert!(counter.setup().is_ok());
}

#[test]
fn test_xtalk_failure_is_fatal() {
    let toml = "[sensor]\nxtalk_cps = 300\n";
    let sensor = ScriptedSensor::default().with_xtalk_status(SensorStatus(-2));
    let mut counter = create_counter(toml, sensor);
    assert_eq!(counter.setup(), Err(SetupError::Xtalk(SensorStatus(-2))));
}

#[test]
fn test_entry_walk_increments_count() {
    let mut counter = ready_counter(BASE_CONFIG);
    let crossings = play(&mut counter, walk(&ENTRY_WALK));

    assert_eq!(crossings, vec![Direction::Entry]);
    assert_eq!(counter.count(), 1);
    assert_eq!(counter.telemetry.crossings(), vec![Direction::Entry]);
    assert_eq!(counter.telemetry.last_count(), Some(1));
    assert_eq!(counter.metrics.entries_total(), 1);
    assert_eq!(counter.metrics.people_count(), 1);
}

#[test]
fn test_exit_walk_can_go_negative() {
    let mut counter = ready_counter(BASE_CONFIG);
    let crossings = play(&mut counter, walk(&EXIT_WALK));

    assert_eq!(crossings, vec![Direction::Exit]);
    assert_eq!(counter.count(), -1);
    assert_eq!(counter.metrics.exits_total(), 1);
}

#[test]
fn test_back_to_back_walks() {
    let mut counter = ready_counter(BASE_CONFIG);
    let mut pairs = ENTRY_WALK.to_vec();
    pairs.extend_from_slice(&ENTRY_WALK);
    pairs.extend_from_slice(&EXIT_WALK);
    let crossings = play(&mut counter, walk(&pairs));

    assert_eq!(crossings, vec![Direction::Entry, Direction::Entry, Direction::Exit]);
    assert_eq!(counter.count(), 1);
}

#[test]
fn test_inverted_mounting_swaps_direction() {
    let toml = "[sensor]\nsampling_size = 1\ninvert_direction = true\n[calibration]\nattempts = 2\n";
    let mut counter = ready_counter(toml);
    let crossings = play(&mut counter, walk(&ENTRY_WALK));
    assert_eq!(crossings, vec![Direction::Exit]);
    assert_eq!(counter.count(), -1);
}

#[test]
fn test_step_in_and_back_is_discarded() {
    let mut counter = ready_counter(BASE_CONFIG);
    let pairs =
        [(FLOOR, FLOOR), (PERSON, FLOOR), (PERSON, PERSON), (PERSON, FLOOR), (FLOOR, FLOOR)];
    let crossings = play(&mut counter, walk(&pairs));

    assert!(crossings.is_empty());
    assert_eq!(counter.count(), 0);
    assert_eq!(counter.metrics.paths_discarded_total(), 1);
    assert_eq!(counter.telemetry.last_count(), None);
}

#[test]
fn test_presence_published_on_change_only() {
    let mut counter = ready_counter(BASE_CONFIG);
    play(&mut counter, walk(&ENTRY_WALK));

    let presence: Vec<bool> = counter
        .telemetry
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TelemetryEvent::Presence { present } => Some(present),
            _ => None,
        })
        .collect();
    assert_eq!(presence, vec![false, true, false]);
    assert!(!counter.metrics.presence());
}

#[test]
fn test_transient_fault_reported_and_not_windowed() {
    let mut counter = ready_counter(BASE_CONFIG);
    let fault = Reading { distance_mm: 0, status: SensorStatus(4) };
    counter.sensor_mut().push_readings([fault]);

    assert_eq!(counter.tick(), None);
    assert_eq!(counter.metrics.ranging_errors_total(), 1);
    assert!(!counter.metrics.sensor_healthy());
    assert!(counter.telemetry.events().contains(&TelemetryEvent::SensorStatus { status: 4 }));
    // The fault never reached the window, but the zone reports what was read
    assert!(counter.sampler.window(ZoneId::Entry).is_empty());
    assert_eq!(counter.zone(ZoneId::Entry).distance(), 0);

    // One good read is not enough, two are
    counter.tick();
    assert!(!counter.metrics.sensor_healthy());
    counter.tick();
    assert!(counter.metrics.sensor_healthy());
}

#[test]
fn test_manual_mode_bypasses_calibration() {
    let toml = "[sensor]\nsampling_size = 1\n\
                [calibration]\nenabled = false\n\
                [manual]\nenabled = true\nmode = \"short\"\nthreshold_mm = 1500\n";
    let mut counter = create_counter(toml, ScriptedSensor::default());
    counter.setup().unwrap();

    assert_eq!(counter.sensor().reads(), 0);
    assert_eq!(counter.metrics.calibrations_total(), 0);
    assert_eq!(counter.zone(ZoneId::Entry).max_threshold(), 1500);
    assert_eq!(counter.zone(ZoneId::Exit).max_threshold(), 1500);
    assert_eq!(counter.sensor().distance_mode(), Some(DistanceMode::Short));
    assert_eq!(counter.sensor().timing_budget_ms(), Some(15));
    assert_eq!(counter.sensor().inter_measurement_ms(), Some(20));
    assert_eq!(
        counter.telemetry.last_zone_config(ZoneId::Entry).map(|s| s.max_threshold_mm),
        Some(1500)
    );
}

#[test]
fn test_manual_mode_overrides_calibrated_thresholds() {
    let toml = "[sensor]\nsampling_size = 1\n\
                [calibration]\nattempts = 2\n\
                [manual]\nenabled = true\nmode = \"custom\"\ntiming_budget_ms = 70\nthreshold_mm = 1200\n";
    let counter = ready_counter(toml);
    assert_eq!(counter.metrics.calibrations_total(), 1);
    assert_eq!(counter.zone(ZoneId::Entry).max_threshold(), 1200);
    assert_eq!(counter.range().mode, RangeMode::Custom(70));
    assert_eq!(counter.sensor().inter_measurement_ms(), Some(75));
}

#[test]
fn test_min_percentage_above_max_still_counts() {
    let toml = "[sensor]\nsampling_size = 1\n\
                [calibration]\nattempts = 2\nmax_threshold_percentage = 50\nmin_threshold_percentage = 60\n";
    let mut counter = ready_counter(toml);
    assert_eq!(counter.zone(ZoneId::Entry).max_threshold(), 1000);
    assert_eq!(counter.zone(ZoneId::Entry).min_threshold(), None);

    let crossings = play(&mut counter, walk(&ENTRY_WALK));
    assert_eq!(crossings, vec![Direction::Entry]);
}

#[test]
fn test_manual_threshold_below_calibrated_min_clears_min() {
    let toml = "[sensor]\nsampling_size = 1\n\
                [calibration]\nattempts = 2\nmin_threshold_percentage = 20\n\
                [manual]\nenabled = true\nthreshold_mm = 300\n";
    let mut counter = ready_counter(toml);
    for id in ZoneId::ALL {
        assert_eq!(counter.zone(id).max_threshold(), 300);
        assert_eq!(counter.zone(id).min_threshold(), None);
    }
    assert_eq!(
        counter.telemetry.last_zone_config(ZoneId::Exit).and_then(|s| s.min_threshold_mm),
        None
    );

    let close = 200;
    let pairs = [(FLOOR, FLOOR), (FLOOR, close), (close, close), (close, FLOOR), (FLOOR, FLOOR)];
    let crossings = play(&mut counter, walk(&pairs));
    assert_eq!(crossings, vec![Direction::Entry]);
}

#[test]
fn test_recalibrate_command() {
    let mut counter = ready_counter(BASE_CONFIG);
    counter.sensor_mut().push_readings(vec![Reading::ok(1800); 4]);

    let (tx, mut rx) = mpsc::channel(4);
    tx.try_send(ControlCommand::Recalibrate).unwrap();
    counter.drain_commands(&mut rx);

    assert_eq!(counter.metrics.calibrations_total(), 2);
    assert_eq!(counter.zone(ZoneId::Entry).max_threshold(), 1530);
    assert!(counter.sensor().is_ranging());
    assert_eq!(counter.sampler.current_zone(), ZoneId::Entry);
    assert_eq!(counter.tracker.filling_size(), 1);
}

#[test]
fn test_reset_count_command() {
    let mut counter = ready_counter(BASE_CONFIG);
    play(&mut counter, walk(&ENTRY_WALK));
    assert_eq!(counter.count(), 1);

    counter.handle_command(ControlCommand::ResetCount);
    assert_eq!(counter.count(), 0);
    assert_eq!(counter.metrics.people_count(), 0);
    assert_eq!(counter.telemetry.last_count(), Some(0));
}

#[test]
fn test_distances_published_per_interval() {
    let mut counter = ready_counter(BASE_CONFIG);
    play(&mut counter, walk(&[(1900, 1950)]));

    let now = Instant::now();
    counter.maybe_publish_distances(now);
    counter.maybe_publish_distances(now + Duration::from_millis(10));
    counter.maybe_publish_distances(now + Duration::from_millis(1000));

    let distances: Vec<TelemetryEvent> = counter
        .telemetry
        .events()
        .into_iter()
        .filter(|e| matches!(e, TelemetryEvent::Distances { .. }))
        .collect();
    assert_eq!(distances.len(), 2);
    assert_eq!(distances[0], TelemetryEvent::Distances { entry_mm: 1900, exit_mm: 1950 });
}

#[test]
fn test_run_stops_on_shutdown() {
    let mut counter = ready_counter(BASE_CONFIG);
    let (_shutdown_tx, shutdown_rx) = watch::channel(true);
    let (_cmd_tx, cmd_rx) = mpsc::channel(4);

    counter.run(shutdown_rx, cmd_rx);

    assert!(!counter.sensor().is_ranging());
    assert_eq!(counter.metrics.ticks_total(), 0);
}

#[test]
fn test_run_refuses_without_setup() {
    let mut counter = create_counter(BASE_CONFIG, ScriptedSensor::default());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_cmd_tx, cmd_rx) = mpsc::channel(4);

    counter.run(shutdown_rx, cmd_rx);
    assert_eq!(counter.sensor().reads(), 0);
}

#[test]
fn test_recalibrate_ignored_before_setup() {
    let mut counter = create_counter(BASE_CONFIG, ScriptedSensor::default());
    counter.recalibrate();
    assert_eq!(counter.metrics.calibrations_total(), 0);
}
