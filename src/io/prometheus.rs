//! Prometheus metrics HTTP endpoint
//!
//! Exposes counter metrics in Prometheus text format at /metrics and the
//! sensor health at /health. Uses hyper for the HTTP server.
//!
//! Scrapes only read cumulative values; the periodic reporter owns the
//! reset-on-read summary.

use crate::infra::metrics::{Metrics, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a gauge that may go negative
fn write_signed_gauge(output: &mut String, name: &str, help: &str, site: &str, val: i64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} gauge");
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(
        &mut output,
        "roode_ticks_total",
        "Control-loop ticks run",
        MetricType::Counter,
        site,
        metrics.ticks_total(),
    );
    let (buckets, sum) = metrics.tick_latency_histogram();
    write_histogram(
        &mut output,
        "roode_tick_latency_us",
        "Control-loop tick latency in microseconds",
        site,
        &buckets,
        &METRICS_BUCKET_BOUNDS,
        sum,
    );

    write_signed_gauge(
        &mut output,
        "roode_people_count",
        "Running people count (entries minus exits)",
        site,
        metrics.people_count(),
    );
    write_metric(
        &mut output,
        "roode_entries_total",
        "Entry crossings detected",
        MetricType::Counter,
        site,
        metrics.entries_total(),
    );
    write_metric(
        &mut output,
        "roode_exits_total",
        "Exit crossings detected",
        MetricType::Counter,
        site,
        metrics.exits_total(),
    );
    write_metric(
        &mut output,
        "roode_paths_discarded_total",
        "Complete paths matching neither direction",
        MetricType::Counter,
        site,
        metrics.paths_discarded_total(),
    );
    write_metric(
        &mut output,
        "roode_presence",
        "Someone is in the doorway (0/1)",
        MetricType::Gauge,
        site,
        u64::from(metrics.presence()),
    );

    write_metric(
        &mut output,
        "roode_sensor_healthy",
        "Last two reads returned success (0/1)",
        MetricType::Gauge,
        site,
        u64::from(metrics.sensor_healthy()),
    );
    write_metric(
        &mut output,
        "roode_ranging_errors_total",
        "Transient ranging faults",
        MetricType::Counter,
        site,
        metrics.ranging_errors_total(),
    );
    write_metric(
        &mut output,
        "roode_calibrations_total",
        "Calibration runs",
        MetricType::Counter,
        site,
        metrics.calibrations_total(),
    );
    write_metric(
        &mut output,
        "roode_telemetry_dropped_total",
        "Telemetry messages dropped due to full channel",
        MetricType::Counter,
        site,
        metrics.telemetry_dropped_total(),
    );
    write_metric(
        &mut output,
        "roode_commands_total",
        "Operator commands received",
        MetricType::Counter,
        site,
        metrics.commands_total(),
    );
    write_metric(
        &mut output,
        "roode_watchdog_feeds_total",
        "Watchdog feeds by the control thread",
        MetricType::Counter,
        site,
        metrics.watchdog_feeds(),
    );
    write_metric(
        &mut output,
        "roode_watchdog_last_feed_ms",
        "Unix time of the latest watchdog feed in milliseconds",
        MetricType::Gauge,
        site,
        metrics.watchdog_last_feed_ms(),
    );

    output
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let resp = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => response(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics, &site_id),
        ),
        (&Method::GET, "/health") => {
            if metrics.sensor_healthy() {
                response(StatusCode::OK, "text/plain", "ok".to_string())
            } else {
                response(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "sensor_unhealthy".to_string())
            }
        }
        _ => response(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string()),
    };
    Ok(resp)
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prometheus_metrics() {
        let metrics = Metrics::new();
        metrics.record_tick(150);
        metrics.record_tick(250);
        metrics.record_entry();
        metrics.record_exit();
        metrics.record_exit();
        metrics.set_people_count(-1);

        let output = format_prometheus_metrics(&metrics, "shop");

        assert!(output.contains("roode_ticks_total{site=\"shop\"} 2"));
        assert!(output.contains("roode_tick_latency_us_bucket{site=\"shop\",le=\"200\"} 1"));
        assert!(output.contains("roode_tick_latency_us_sum{site=\"shop\"} 400"));
        assert!(output.contains("roode_people_count{site=\"shop\"} -1"));
        assert!(output.contains("roode_exits_total{site=\"shop\"} 2"));
    }

    #[test]
    fn test_scrape_does_not_reset_counters() {
        let metrics = Metrics::new();
        metrics.record_tick(100);
        format_prometheus_metrics(&metrics, "shop");
        let output = format_prometheus_metrics(&metrics, "shop");
        assert!(output.contains("roode_tick_latency_us_count{site=\"shop\"} 1"));
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(start_metrics_server(
            0,
            Arc::new(Metrics::new()),
            "shop".to_string(),
            shutdown_rx,
        ));
        tokio::task::yield_now().await;
        shutdown_tx.send(true).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server).await;
        assert!(result.unwrap().unwrap().is_ok());
    }
}
