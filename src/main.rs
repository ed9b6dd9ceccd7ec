//! Roode - doorway people counter on a single multizone ToF sensor
//!
//! Splits the sensor's field of view into an entry and an exit zone and
//! counts people from the order in which the zones are occupied.
//!
//! Module structure:
//! - `domain/` - Zones and sensor vocabulary
//! - `io/` - External interfaces (sensor, MQTT, Prometheus)
//! - `services/` - Counting logic (sampler, path tracker, calibrator)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use roode_counter::infra::{Config, Metrics, SensorDriver};
use roode_counter::io::{
    create_egress_channel, start_command_listener, MetricsWatchdog, MqttPublisher, NoopTelemetry,
    SimulatedSensor, Telemetry,
};
use roode_counter::services::PeopleCounter;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Roode - ToF doorway people counter
#[derive(Parser, Debug)]
#[command(name = "roode-counter", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug shows per-tick zone classification
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("roode-counter starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        driver = ?config.sensor_driver(),
        sampling_size = %config.sampling_size(),
        invert_direction = %config.invert_direction(),
        calibration = %config.calibration_enabled(),
        manual = %config.manual_enabled(),
        mqtt_enabled = %config.mqtt_enabled(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    // Operator commands; only MQTT produces them, the control loop drains them
    let (command_tx, command_rx) = mpsc::channel(16);

    let telemetry: Arc<dyn Telemetry> = if config.mqtt_enabled() {
        let (egress_sender, egress_rx) = create_egress_channel(1000, config.site_id().to_string());

        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        let cmd_config = config.clone();
        let cmd_metrics = metrics.clone();
        let cmd_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) =
                start_command_listener(&cmd_config, command_tx, cmd_metrics, cmd_shutdown).await
            {
                error!(error = %e, "command_listener_error");
            }
        });

        Arc::new(egress_sender.with_metrics(metrics.clone()))
    } else {
        drop(command_tx);
        Arc::new(NoopTelemetry)
    };

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = roode_counter::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Periodic metrics summary in the log
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval.max(1)));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let sensor = match config.sensor_driver() {
        SensorDriver::Sim => SimulatedSensor::new(config.sim().clone(), config.advised_orientation()),
    };
    let watchdog = Box::new(MetricsWatchdog::new(metrics.clone()));
    let mut counter = PeopleCounter::new(config, sensor, metrics, telemetry, watchdog);

    // Sensor reads block: the control loop gets its own thread
    let control_shutdown = shutdown_rx.clone();
    let control = tokio::task::spawn_blocking(move || {
        if let Err(e) = counter.setup() {
            error!(error = %e, "setup_failed");
            return;
        }
        counter.run(control_shutdown, command_rx);
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown_signal_received");
    let _ = shutdown_tx.send(true);

    if let Err(e) = control.await {
        error!(error = %e, "control_loop_panicked");
    }

    info!("roode-counter shutdown complete");
    Ok(())
}
