//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `sensor` - Ranging sensor driver interface and a scripted test double
//! - `sim_sensor` - Simulated doorway for running without hardware
//! - `telemetry` - Telemetry sink and the typed channel feeding MQTT
//! - `mqtt_egress` - MQTT publisher for telemetry
//! - `mqtt_commands` - MQTT subscriber for operator commands
//! - `watchdog` - Liveness feed from the control loop
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod mqtt_commands;
pub mod mqtt_egress;
pub mod prometheus;
pub mod sensor;
pub mod sim_sensor;
pub mod telemetry;
pub mod watchdog;

// Re-export commonly used types
pub use mqtt_commands::start_command_listener;
pub use mqtt_egress::MqttPublisher;
pub use sensor::{RangingSensor, ScriptedSensor};
pub use sim_sensor::SimulatedSensor;
pub use telemetry::{create_egress_channel, EgressSender, NoopTelemetry, Telemetry, TelemetryEvent};
pub use watchdog::{MetricsWatchdog, NoopWatchdog, Watchdog};
