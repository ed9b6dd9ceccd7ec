//! MQTT subscriber for operator commands
//!
//! Payloads on the command topic are plain text:
//! - `recalibrate` - rerun calibration before the next tick
//! - `reset_count` - set the running people count back to zero

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::counter::ControlCommand;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Parse a command payload; surrounding whitespace and case are ignored
pub fn parse_command(payload: &[u8]) -> Option<ControlCommand> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    if text.eq_ignore_ascii_case("recalibrate") {
        Some(ControlCommand::Recalibrate)
    } else if text.eq_ignore_ascii_case("reset_count") {
        Some(ControlCommand::ResetCount)
    } else {
        None
    }
}

/// Subscribe to the command topic and forward commands to the control loop
///
/// Commands are sent via try_send; the control loop drains them at the start
/// of a tick, so a full queue only means a command is already pending.
pub async fn start_command_listener(
    config: &Config,
    command_tx: mpsc::Sender<ControlCommand>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("roode-cmd-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);
    let topic = config.command_topic().to_string();
    client.subscribe(&topic, QoS::AtLeastOnce).await?;

    info!(topic = %topic, host = %config.mqtt_host(), port = %config.mqtt_port(), "command_listener_subscribed");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("command_listener_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(command) = parse_command(&publish.payload) else {
                            warn!(
                                topic = %publish.topic,
                                payload = %String::from_utf8_lossy(&publish.payload),
                                "unknown_command"
                            );
                            continue;
                        };
                        metrics.record_command();
                        info!(command = ?command, "command_received");
                        match command_tx.try_send(command) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                warn!(command = ?command, "command_dropped_queue_full");
                            }
                            Err(TrySendError::Closed(_)) => {
                                warn!("command_channel_closed");
                                return Ok(());
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("command_listener_connected");
                        // Clean sessions drop subscriptions on reconnect
                        if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                            warn!(error = %e, "command_resubscribe_failed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "command_listener_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
