//! Telemetry sinks and the typed egress channel feeding the MQTT publisher
//!
//! The control loop runs on a blocking thread and must never wait on the
//! network, so the production sink (`EgressSender`) only does a `try_send`
//! into a bounded channel. Messages are dropped when the channel is full.

use crate::domain::types::{Direction, SensorStatus, ZoneId};
use crate::domain::zone::ZoneSnapshot;
use crate::infra::metrics::Metrics;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

/// Current wall clock in epoch milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// One value published by the counter.
///
/// Serializes to the JSON body of the MQTT message (without envelope).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryEvent {
    Version { version: String },
    SensorStatus { status: i16 },
    Distances { entry_mm: u16, exit_mm: u16 },
    Presence { present: bool },
    Crossing { direction: Direction },
    PeopleCount { count: i64 },
    ZoneConfig(ZoneSnapshot),
}

impl TelemetryEvent {
    /// Topic below the configured base topic
    pub fn topic_suffix(&self) -> String {
        match self {
            TelemetryEvent::Version { .. } => "version".to_string(),
            TelemetryEvent::SensorStatus { .. } => "status".to_string(),
            TelemetryEvent::Distances { .. } => "distance".to_string(),
            TelemetryEvent::Presence { .. } => "presence".to_string(),
            TelemetryEvent::Crossing { .. } => "event".to_string(),
            TelemetryEvent::PeopleCount { .. } => "count".to_string(),
            TelemetryEvent::ZoneConfig(snapshot) => format!("zone/{}", snapshot.zone),
        }
    }

    /// Retained values are the ones a late subscriber needs to see
    pub fn retained(&self) -> bool {
        matches!(
            self,
            TelemetryEvent::Version { .. }
                | TelemetryEvent::PeopleCount { .. }
                | TelemetryEvent::ZoneConfig(_)
        )
    }
}

/// Destination for everything the counter publishes.
///
/// Every sink is optional: the default methods do nothing, so an
/// implementation only overrides `publish` (or individual sinks).
pub trait Telemetry: Send + Sync {
    fn publish(&self, _event: TelemetryEvent) {}

    fn version(&self, version: &str) {
        self.publish(TelemetryEvent::Version { version: version.to_string() });
    }

    fn sensor_status(&self, status: SensorStatus) {
        self.publish(TelemetryEvent::SensorStatus { status: status.0 });
    }

    fn distances(&self, entry_mm: u16, exit_mm: u16) {
        self.publish(TelemetryEvent::Distances { entry_mm, exit_mm });
    }

    fn presence(&self, present: bool) {
        self.publish(TelemetryEvent::Presence { present });
    }

    fn crossing(&self, direction: Direction) {
        self.publish(TelemetryEvent::Crossing { direction });
    }

    fn people_count(&self, count: i64) {
        self.publish(TelemetryEvent::PeopleCount { count });
    }

    fn zone_config(&self, snapshot: &ZoneSnapshot) {
        self.publish(TelemetryEvent::ZoneConfig(*snapshot));
    }
}

/// Sink that discards everything
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}

/// Message queued for the MQTT publisher
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryMessage {
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

/// Sender handle for telemetry messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<TelemetryMessage>,
    site_id: String,
    metrics: Option<Arc<Metrics>>,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<TelemetryMessage>, site_id: String) -> Self {
        Self { tx, site_id, metrics: None }
    }

    /// Count dropped messages in the given metrics
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Telemetry for EgressSender {
    fn publish(&self, event: TelemetryEvent) {
        let msg = TelemetryMessage { site: self.site_id.clone(), ts: epoch_ms(), event };
        // Use try_send to avoid blocking - drop if channel full
        if self.tx.try_send(msg).is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.record_telemetry_dropped();
            }
        }
    }
}

/// Create a new telemetry channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
) -> (EgressSender, mpsc::Receiver<TelemetryMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id), rx)
}

/// Sink that keeps everything in memory, for tests and diagnostics
#[derive(Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn crossings(&self) -> Vec<Direction> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Crossing { direction } => Some(*direction),
                _ => None,
            })
            .collect()
    }

    /// Last published people count
    pub fn last_count(&self) -> Option<i64> {
        self.events.lock().iter().rev().find_map(|e| match e {
            TelemetryEvent::PeopleCount { count } => Some(*count),
            _ => None,
        })
    }

    /// Last published configuration of a zone
    pub fn last_zone_config(&self, zone: ZoneId) -> Option<ZoneSnapshot> {
        self.events.lock().iter().rev().find_map(|e| match e {
            TelemetryEvent::ZoneConfig(snapshot) if snapshot.zone == zone => Some(*snapshot),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Telemetry for RecordingTelemetry {
    fn publish(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}

impl<T: Telemetry + ?Sized> Telemetry for Arc<T> {
    fn publish(&self, event: TelemetryEvent) {
        (**self).publish(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(zone: ZoneId) -> ZoneSnapshot {
        ZoneSnapshot {
            zone,
            roi_width: 6,
            roi_height: 16,
            roi_center: 167,
            min_threshold_mm: None,
            max_threshold_mm: 1530,
        }
    }

    #[test]
    fn test_topics_and_retention() {
        assert_eq!(TelemetryEvent::Presence { present: true }.topic_suffix(), "presence");
        assert_eq!(TelemetryEvent::ZoneConfig(snapshot(ZoneId::Exit)).topic_suffix(), "zone/exit");
        assert!(TelemetryEvent::PeopleCount { count: 2 }.retained());
        assert!(!TelemetryEvent::Crossing { direction: Direction::Entry }.retained());
    }

    #[test]
    fn test_message_json_is_flat() {
        let msg = TelemetryMessage {
            site: "door-1".to_string(),
            ts: 42,
            event: TelemetryEvent::Crossing { direction: Direction::Exit },
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["site"], "door-1");
        assert_eq!(json["direction"], "Exit");

        let msg = TelemetryMessage {
            site: "door-1".to_string(),
            ts: 42,
            event: TelemetryEvent::ZoneConfig(snapshot(ZoneId::Entry)),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["zone"], "entry");
        assert_eq!(json["max_threshold_mm"], 1530);
        assert!(json.get("min_threshold_mm").is_none());
    }

    #[test]
    fn test_egress_sender_counts_drops() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(1, "door".to_string());
        let sender = sender.with_metrics(metrics.clone());
        sender.people_count(1);
        sender.people_count(2);
        assert_eq!(metrics.telemetry_dropped_total(), 1);
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.event, TelemetryEvent::PeopleCount { count: 1 });
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingTelemetry::new();
        sink.crossing(Direction::Entry);
        sink.people_count(1);
        sink.zone_config(&snapshot(ZoneId::Entry));
        assert_eq!(sink.crossings(), vec![Direction::Entry]);
        assert_eq!(sink.last_count(), Some(1));
        assert_eq!(sink.last_zone_config(ZoneId::Entry).map(|s| s.max_threshold_mm), Some(1530));
        assert_eq!(sink.last_zone_config(ZoneId::Exit), None);
    }
}
