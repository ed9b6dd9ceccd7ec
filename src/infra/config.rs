//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::{RangeMode, Roi, ZoneId};
use crate::io::sensor::DEFAULT_I2C_ADDRESS;
use crate::services::calibrator::CalibrationSettings;
use crate::services::sampler::MAX_WINDOW_SIZE;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Range mode names accepted by `[manual] mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualMode {
    Short,
    Medium,
    MediumLong,
    Long,
    Max,
    /// Long distance mode with `timing_budget_ms`
    Custom,
}

/// Ranging hardware behind the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorDriver {
    /// Simulated doorway
    Sim,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

fn default_site_id() -> String {
    "roode".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,
    /// Ranging offset to program at setup; absent leaves the sensor default
    #[serde(default)]
    pub offset_mm: Option<i16>,
    /// Crosstalk compensation to program at setup
    #[serde(default)]
    pub xtalk_cps: Option<u16>,
    #[serde(default)]
    pub invert_direction: bool,
    #[serde(default = "default_true")]
    pub advised_orientation: bool,
    /// Sliding window size per zone
    #[serde(default = "default_sampling_size")]
    pub sampling_size: usize,
    /// Period of live distance publishing
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_driver")]
    pub driver: SensorDriver,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            i2c_address: default_i2c_address(),
            offset_mm: None,
            xtalk_cps: None,
            invert_direction: false,
            advised_orientation: true,
            sampling_size: default_sampling_size(),
            update_interval_ms: default_update_interval_ms(),
            driver: default_driver(),
        }
    }
}

fn default_i2c_address() -> u8 {
    DEFAULT_I2C_ADDRESS
}

fn default_true() -> bool {
    true
}

fn default_sampling_size() -> usize {
    2
}

fn default_update_interval_ms() -> u64 {
    1000
}

fn default_driver() -> SensorDriver {
    SensorDriver::Sim
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ZoneRoiConfig {
    #[serde(default = "default_roi_width")]
    pub roi_width: u8,
    #[serde(default = "default_roi_height")]
    pub roi_height: u8,
}

impl Default for ZoneRoiConfig {
    fn default() -> Self {
        Self { roi_width: default_roi_width(), roi_height: default_roi_height() }
    }
}

fn default_roi_width() -> u8 {
    6
}

fn default_roi_height() -> u8 {
    16
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ZonesConfig {
    #[serde(default)]
    pub entry: ZoneRoiConfig,
    #[serde(default)]
    pub exit: ZoneRoiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub roi_calibration: bool,
    /// Sample pairs per calibration pass
    #[serde(default = "default_attempts")]
    pub attempts: usize,
    #[serde(default = "default_max_threshold_percentage")]
    pub max_threshold_percentage: u16,
    /// 0 leaves the minimum threshold unset
    #[serde(default)]
    pub min_threshold_percentage: u16,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            roi_calibration: false,
            attempts: default_attempts(),
            max_threshold_percentage: default_max_threshold_percentage(),
            min_threshold_percentage: 0,
        }
    }
}

fn default_attempts() -> usize {
    20
}

fn default_max_threshold_percentage() -> u16 {
    85
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_manual_mode")]
    pub mode: ManualMode,
    /// Only used by `mode = "custom"`
    #[serde(default = "default_manual_timing_budget")]
    pub timing_budget_ms: u16,
    /// Max threshold shared by both zones
    #[serde(default = "default_manual_threshold")]
    pub threshold_mm: u16,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: default_manual_mode(),
            timing_budget_ms: default_manual_timing_budget(),
            threshold_mm: default_manual_threshold(),
        }
    }
}

fn default_manual_mode() -> ManualMode {
    ManualMode::Long
}

fn default_manual_timing_budget() -> u16 {
    100
}

fn default_manual_threshold() -> u16 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Prefix for all published telemetry topics
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
    /// Topic for operator commands (recalibrate, reset_count)
    #[serde(default = "default_command_topic")]
    pub command_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            base_topic: default_base_topic(),
            command_topic: default_command_topic(),
        }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_base_topic() -> String {
    "roode".to_string()
}

fn default_command_topic() -> String {
    "roode/cmd".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: default_prometheus_port() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

fn default_prometheus_port() -> u16 {
    9100
}

/// Simulated doorway used when `driver = "sim"`
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Distance to the empty floor
    #[serde(default = "default_floor_mm")]
    pub floor_mm: u16,
    /// Distance to the top of a passing person
    #[serde(default = "default_person_mm")]
    pub person_mm: u16,
    /// Reads between the starts of two simulated crossings
    #[serde(default = "default_period_reads")]
    pub period_reads: u64,
    /// Reads spent in each of the three phases of a crossing
    #[serde(default = "default_phase_reads")]
    pub phase_reads: u64,
    /// Inject a transient ranging fault every N reads (0 disables)
    #[serde(default)]
    pub fault_every_reads: u64,
    /// Pace reads by the programmed inter-measurement period
    #[serde(default = "default_true")]
    pub realtime: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            floor_mm: default_floor_mm(),
            person_mm: default_person_mm(),
            period_reads: default_period_reads(),
            phase_reads: default_phase_reads(),
            fault_every_reads: 0,
            realtime: true,
        }
    }
}

fn default_floor_mm() -> u16 {
    2200
}

fn default_person_mm() -> u16 {
    1000
}

fn default_period_reads() -> u64 {
    300
}

fn default_phase_reads() -> u64 {
    6
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    #[serde(default)]
    pub zones: ZonesConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub manual: ManualConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    config_file: String,
    sensor: SensorConfig,
    zones: ZonesConfig,
    calibration: CalibrationConfig,
    manual: ManualConfig,
    mqtt: MqttConfig,
    metrics: MetricsConfig,
    sim: SimConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Parse configuration held in memory
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("Failed to parse config")?;
        Ok(Self::from_toml(toml_config, "inline".to_string()))
    }

    fn from_toml(mut toml_config: TomlConfig, config_file: String) -> Self {
        toml_config.sensor.sampling_size = toml_config.sensor.sampling_size.clamp(1, MAX_WINDOW_SIZE);
        toml_config.calibration.attempts = toml_config.calibration.attempts.max(1);
        let calibration = &mut toml_config.calibration;
        if calibration.min_threshold_percentage >= calibration.max_threshold_percentage
            && calibration.min_threshold_percentage != 0
        {
            warn!(
                min_threshold_percentage = calibration.min_threshold_percentage,
                max_threshold_percentage = calibration.max_threshold_percentage,
                "min_threshold_percentage_not_below_max_ignored"
            );
            calibration.min_threshold_percentage = 0;
        }
        Self {
            site_id: toml_config.site.id,
            config_file,
            sensor: toml_config.sensor,
            zones: toml_config.zones,
            calibration: toml_config.calibration,
            manual: toml_config.manual,
            mqtt: toml_config.mqtt,
            metrics: toml_config.metrics,
            sim: toml_config.sim,
        }
    }

    /// Load the given file, falling back to defaults when it is missing or invalid
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Configured ROI of a zone, with its center taken from the mounting orientation
    pub fn initial_roi(&self, zone: ZoneId) -> Roi {
        let (entry_center, exit_center) = if self.sensor.advised_orientation {
            (167, 231)
        } else {
            (195, 60)
        };
        let (roi, center) = match zone {
            ZoneId::Entry => (self.zones.entry, entry_center),
            ZoneId::Exit => (self.zones.exit, exit_center),
        };
        Roi { width: roi.roi_width, height: roi.roi_height, center }
    }

    pub fn calibration_settings(&self) -> CalibrationSettings {
        CalibrationSettings {
            attempts: self.calibration.attempts,
            max_threshold_percentage: self.calibration.max_threshold_percentage,
            min_threshold_percentage: self.calibration.min_threshold_percentage,
            roi_calibration: self.calibration.roi_calibration,
            advised_orientation: self.sensor.advised_orientation,
            entry_roi: self.initial_roi(ZoneId::Entry),
            exit_roi: self.initial_roi(ZoneId::Exit),
        }
    }

    /// Range mode forced by `[manual]`, if enabled
    pub fn manual_range_mode(&self) -> Option<RangeMode> {
        if !self.manual.enabled {
            return None;
        }
        Some(match self.manual.mode {
            ManualMode::Short => RangeMode::Short,
            ManualMode::Medium => RangeMode::Medium,
            ManualMode::MediumLong => RangeMode::MediumLong,
            ManualMode::Long => RangeMode::Long,
            ManualMode::Max => RangeMode::Max,
            ManualMode::Custom => RangeMode::Custom(self.manual.timing_budget_ms),
        })
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn i2c_address(&self) -> u8 {
        self.sensor.i2c_address
    }

    pub fn offset_mm(&self) -> Option<i16> {
        self.sensor.offset_mm
    }

    pub fn xtalk_cps(&self) -> Option<u16> {
        self.sensor.xtalk_cps
    }

    pub fn invert_direction(&self) -> bool {
        self.sensor.invert_direction
    }

    pub fn advised_orientation(&self) -> bool {
        self.sensor.advised_orientation
    }

    pub fn sampling_size(&self) -> usize {
        self.sensor.sampling_size
    }

    pub fn update_interval_ms(&self) -> u64 {
        self.sensor.update_interval_ms
    }

    pub fn sensor_driver(&self) -> SensorDriver {
        self.sensor.driver
    }

    pub fn calibration_enabled(&self) -> bool {
        self.calibration.enabled
    }

    pub fn roi_calibration(&self) -> bool {
        self.calibration.roi_calibration
    }

    pub fn calibration_attempts(&self) -> usize {
        self.calibration.attempts
    }

    pub fn max_threshold_percentage(&self) -> u16 {
        self.calibration.max_threshold_percentage
    }

    pub fn min_threshold_percentage(&self) -> u16 {
        self.calibration.min_threshold_percentage
    }

    pub fn manual_enabled(&self) -> bool {
        self.manual.enabled
    }

    pub fn manual_threshold_mm(&self) -> u16 {
        self.manual.threshold_mm
    }

    pub fn mqtt_enabled(&self) -> bool {
        self.mqtt.enabled
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt.host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt.port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt.username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt.password.as_deref()
    }

    pub fn base_topic(&self) -> &str {
        &self.mqtt.base_topic
    }

    pub fn command_topic(&self) -> &str {
        &self.mqtt.command_topic
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics.interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.metrics.prometheus_port
    }

    pub fn sim(&self) -> &SimConfig {
        &self.sim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "roode");
        assert_eq!(config.i2c_address(), 0x29);
        assert_eq!(config.sampling_size(), 2);
        assert_eq!(config.calibration_attempts(), 20);
        assert_eq!(config.max_threshold_percentage(), 85);
        assert_eq!(config.min_threshold_percentage(), 0);
        assert!(config.calibration_enabled());
        assert!(!config.manual_enabled());
        assert_eq!(config.manual_range_mode(), None);
        assert_eq!(config.base_topic(), "roode");
        assert_eq!(config.prometheus_port(), 9100);
        assert_eq!(config.sensor_driver(), SensorDriver::Sim);
    }

    #[test]
    fn test_initial_roi_follows_orientation() {
        let config = Config::default();
        assert_eq!(config.initial_roi(ZoneId::Entry), Roi { width: 6, height: 16, center: 167 });
        assert_eq!(config.initial_roi(ZoneId::Exit).center, 231);

        let toml_config: TomlConfig =
            toml::from_str("[sensor]\nadvised_orientation = false\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.initial_roi(ZoneId::Entry).center, 195);
        assert_eq!(config.initial_roi(ZoneId::Exit).center, 60);
    }

    #[test]
    fn test_manual_custom_mode() {
        let toml_config: TomlConfig = toml::from_str(
            "[manual]\nenabled = true\nmode = \"custom\"\ntiming_budget_ms = 70\nthreshold_mm = 1500\n",
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.manual_range_mode(), Some(RangeMode::Custom(70)));
        assert_eq!(config.manual_threshold_mm(), 1500);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let toml_config: TomlConfig =
            toml::from_str("[sensor]\nsampling_size = 64\n[calibration]\nattempts = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.sampling_size(), MAX_WINDOW_SIZE);
        assert_eq!(config.calibration_attempts(), 1);
    }

    #[test]
    fn test_min_percentage_not_below_max_is_dropped() {
        let config = Config::from_toml_str(
            "[calibration]\nmax_threshold_percentage = 50\nmin_threshold_percentage = 60\n",
        )
        .unwrap();
        assert_eq!(config.max_threshold_percentage(), 50);
        assert_eq!(config.min_threshold_percentage(), 0);

        let config = Config::from_toml_str("[calibration]\nmin_threshold_percentage = 20\n").unwrap();
        assert_eq!(config.min_threshold_percentage(), 20);
    }

    #[test]
    fn test_default_i2c_address() {
        assert_eq!(Config::default().i2c_address(), DEFAULT_I2C_ADDRESS);
    }

    #[test]
    fn test_resolve_config_path_from_args() {
        let args = vec!["roode-counter".to_string(), "--config=site.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "site.toml");
        let args =
            vec!["roode-counter".to_string(), "--config".to_string(), "other.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "other.toml");
    }
}
