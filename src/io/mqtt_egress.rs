//! MQTT publisher for counter telemetry
//!
//! Publishes under the configured base topic:
//! - `<base>/count` - Running people count (retained)
//! - `<base>/event` - Crossing label, Entry or Exit
//! - `<base>/presence` - Someone in the doorway
//! - `<base>/distance` - Live entry/exit distances
//! - `<base>/status` - Sensor ranging status
//! - `<base>/version` - Firmware version (retained)
//! - `<base>/zone/<entry|exit>` - Thresholds and ROI after calibration (retained)

use crate::infra::config::Config;
use crate::io::telemetry::TelemetryMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the telemetry channel and publishes to MQTT topics.
pub struct MqttPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<TelemetryMessage>,
    base_topic: String,
}

impl MqttPublisher {
    /// Create a new MQTT publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<TelemetryMessage>) -> Self {
        let client_id = format!("roode-egress-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_egress_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_egress_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_egress_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, rx, base_topic: config.base_topic().to_string() }
    }

    /// Run the publisher loop until the shutdown signal is received
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(base_topic = %self.base_topic, "mqtt_egress_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_egress_shutdown");
                        // Drain remaining messages
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                Some(msg) = self.rx.recv() => {
                    self.publish_message(msg).await;
                }
            }
        }
    }

    async fn publish_message(&self, msg: TelemetryMessage) {
        let topic = topic_for(&self.base_topic, &msg);
        let retain = msg.event.retained();
        // Retained state must not be lost; live values are fire-and-forget
        let qos = if retain { QoS::AtLeastOnce } else { QoS::AtMostOnce };

        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, topic = %topic, "mqtt_egress_serialize_failed");
                return;
            }
        };
        if let Err(e) = self.client.publish(&topic, qos, retain, json.into_bytes()).await {
            debug!(error = %e, topic = %topic, "mqtt_egress_publish_failed");
        }
    }
}

/// Full topic of a message under the base topic
pub fn topic_for(base_topic: &str, msg: &TelemetryMessage) -> String {
    format!("{}/{}", base_topic.trim_end_matches('/'), msg.event.topic_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::telemetry::TelemetryEvent;

    #[test]
    fn test_topic_for() {
        let msg = TelemetryMessage {
            site: "door".to_string(),
            ts: 0,
            event: TelemetryEvent::PeopleCount { count: 3 },
        };
        assert_eq!(topic_for("roode", &msg), "roode/count");
        assert_eq!(topic_for("site/roode/", &msg), "site/roode/count");
    }
}
