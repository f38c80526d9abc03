//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::Pose;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct RobotConfig {
    /// Robot identifier used in client ids and log context
    #[serde(default = "default_robot_id")]
    pub id: String,
    /// Camera feed passed to the banknote recognition service
    #[serde(default = "default_camera_feed")]
    pub camera_feed: String,
}

fn default_robot_id() -> String {
    "baxter".to_string()
}

fn default_camera_feed() -> String {
    "/cameras/head_camera/image".to_string()
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self { id: default_robot_id(), camera_feed: default_camera_feed() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    /// Hand-pose sensing service base URL
    pub pose_url: String,
    /// Banknote recognition service base URL
    pub recognizer_url: String,
    /// Motion planner service base URL (may embed basic-auth credentials)
    pub planner_url: String,
    /// Per-request HTTP timeout; recognition blocks for multiple seconds
    #[serde(default = "default_service_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_service_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensingConfig {
    /// Body-tracker user slot to query
    #[serde(default = "default_user_id")]
    pub user_id: u32,
    /// Freshness window for sensed poses (stale strictly beyond this)
    #[serde(default = "default_max_pose_age_secs")]
    pub max_pose_age_secs: u64,
    /// Pause before re-sensing after a stale or wait cycle
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_user_id() -> u32 {
    1
}

fn default_max_pose_age_secs() -> u64 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            max_pose_age_secs: default_max_pose_age_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// Drive the calibration sweep at startup; when false the inventories
    /// are built from the poses below without touching the planner
    #[serde(default = "default_calibrate")]
    pub calibrate: bool,
    /// Banknotes on each side beyond the calibrated one
    #[serde(default = "default_extra_slots")]
    pub extra_slots: usize,
    /// Spacing between synthesized slots along x (meters)
    #[serde(default = "default_spacing_m")]
    pub spacing_m: f64,
    /// Approach height above a banknote before descending to pick it
    #[serde(default = "default_approach_offset_m")]
    pub approach_offset_m: f64,
    /// Fallback first-slot poses for calibrate = false: [x,y,z,qx,qy,qz,qw]
    #[serde(default = "default_left_pose")]
    pub left_initial_pose: [f64; 7],
    #[serde(default = "default_right_pose")]
    pub right_initial_pose: [f64; 7],
}

fn default_calibrate() -> bool {
    true
}

fn default_extra_slots() -> usize {
    2
}

fn default_spacing_m() -> f64 {
    0.10
}

fn default_approach_offset_m() -> f64 {
    0.10
}

fn default_left_pose() -> [f64; 7] {
    [0.60, 0.30, -0.10, 0.0, 1.0, 0.0, 0.0]
}

fn default_right_pose() -> [f64; 7] {
    [0.60, -0.30, -0.10, 0.0, 1.0, 0.0, 0.0]
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            calibrate: default_calibrate(),
            extra_slots: default_extra_slots(),
            spacing_m: default_spacing_m(),
            approach_offset_m: default_approach_offset_m(),
            left_initial_pose: default_left_pose(),
            right_initial_pose: default_right_pose(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Value credited to the ledger per dispensed banknote
    #[serde(default = "default_dispense_unit_value")]
    pub dispense_unit_value: i64,
    /// MQTT topic delivering `{ "amount_due": <n> }` session requests
    #[serde(default = "default_till_topic")]
    pub till_topic: String,
    /// File path for session receipts (JSONL format)
    #[serde(default = "default_receipt_file")]
    pub receipt_file: String,
}

fn default_dispense_unit_value() -> i64 {
    1
}

fn default_till_topic() -> String {
    "cashier/till".to_string()
}

fn default_receipt_file() -> String {
    "receipts.jsonl".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dispense_unit_value: default_dispense_unit_value(),
            till_topic: default_till_topic(),
            receipt_file: default_receipt_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    /// MQTT topic the head screen renderer subscribes to
    #[serde(default = "default_display_topic")]
    pub topic: String,
    /// Delay between idle-animation frames
    #[serde(default = "default_frame_delay_ms")]
    pub frame_delay_ms: u64,
}

fn default_display_topic() -> String {
    "cashier/display".to_string()
}

fn default_frame_delay_ms() -> u64 {
    1000
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { topic: default_display_topic(), frame_delay_ms: default_frame_delay_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { bind_address: default_broker_bind_address(), port: default_broker_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub robot: RobotConfig,
    pub mqtt: MqttConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub sensing: SensingConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    robot_id: String,
    camera_feed: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    pose_url: String,
    recognizer_url: String,
    planner_url: String,
    service_timeout_ms: u64,
    user_id: u32,
    max_pose_age_secs: u64,
    sense_retry_delay_ms: u64,
    calibrate: bool,
    extra_slots: usize,
    spacing_m: f64,
    approach_offset_m: f64,
    left_initial_pose: [f64; 7],
    right_initial_pose: [f64; 7],
    dispense_unit_value: i64,
    till_topic: String,
    receipt_file: String,
    display_topic: String,
    frame_delay_ms: u64,
    metrics_interval_secs: u64,
    broker_bind_address: String,
    broker_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            robot_id: default_robot_id(),
            camera_feed: default_camera_feed(),
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_username: None,
            mqtt_password: None,
            pose_url: "http://localhost:9101".to_string(),
            recognizer_url: "http://localhost:9102".to_string(),
            planner_url: "http://localhost:9103".to_string(),
            service_timeout_ms: default_service_timeout_ms(),
            user_id: default_user_id(),
            max_pose_age_secs: default_max_pose_age_secs(),
            sense_retry_delay_ms: default_retry_delay_ms(),
            calibrate: default_calibrate(),
            extra_slots: default_extra_slots(),
            spacing_m: default_spacing_m(),
            approach_offset_m: default_approach_offset_m(),
            left_initial_pose: default_left_pose(),
            right_initial_pose: default_right_pose(),
            dispense_unit_value: default_dispense_unit_value(),
            till_topic: default_till_topic(),
            receipt_file: default_receipt_file(),
            display_topic: default_display_topic(),
            frame_delay_ms: default_frame_delay_ms(),
            metrics_interval_secs: default_metrics_interval(),
            broker_bind_address: default_broker_bind_address(),
            broker_port: default_broker_port(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            robot_id: toml_config.robot.id,
            camera_feed: toml_config.robot.camera_feed,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            pose_url: toml_config.services.pose_url,
            recognizer_url: toml_config.services.recognizer_url,
            planner_url: toml_config.services.planner_url,
            service_timeout_ms: toml_config.services.timeout_ms,
            user_id: toml_config.sensing.user_id,
            max_pose_age_secs: toml_config.sensing.max_pose_age_secs,
            sense_retry_delay_ms: toml_config.sensing.retry_delay_ms,
            calibrate: toml_config.inventory.calibrate,
            extra_slots: toml_config.inventory.extra_slots,
            spacing_m: toml_config.inventory.spacing_m,
            approach_offset_m: toml_config.inventory.approach_offset_m,
            left_initial_pose: toml_config.inventory.left_initial_pose,
            right_initial_pose: toml_config.inventory.right_initial_pose,
            dispense_unit_value: toml_config.session.dispense_unit_value,
            till_topic: toml_config.session.till_topic,
            receipt_file: toml_config.session.receipt_file,
            display_topic: toml_config.display.topic,
            frame_delay_ms: toml_config.display.frame_delay_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Determine config file path from explicit path or environment
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }
        "config/dev.toml".to_string()
    }

    /// Build a `Pose` from a `[x,y,z,qx,qy,qz,qw]` config array
    pub fn pose_from_array(values: [f64; 7]) -> Pose {
        Pose::new(
            values[0], values[1], values[2], values[3], values[4], values[5], values[6],
        )
    }

    // Getters for all config fields
    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    pub fn camera_feed(&self) -> &str {
        &self.camera_feed
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn pose_url(&self) -> &str {
        &self.pose_url
    }

    pub fn recognizer_url(&self) -> &str {
        &self.recognizer_url
    }

    pub fn planner_url(&self) -> &str {
        &self.planner_url
    }

    pub fn service_timeout_ms(&self) -> u64 {
        self.service_timeout_ms
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn max_pose_age_secs(&self) -> u64 {
        self.max_pose_age_secs
    }

    pub fn sense_retry_delay_ms(&self) -> u64 {
        self.sense_retry_delay_ms
    }

    pub fn calibrate(&self) -> bool {
        self.calibrate
    }

    pub fn extra_slots(&self) -> usize {
        self.extra_slots
    }

    pub fn spacing_m(&self) -> f64 {
        self.spacing_m
    }

    pub fn approach_offset_m(&self) -> f64 {
        self.approach_offset_m
    }

    pub fn left_initial_pose(&self) -> [f64; 7] {
        self.left_initial_pose
    }

    pub fn right_initial_pose(&self) -> [f64; 7] {
        self.right_initial_pose
    }

    pub fn dispense_unit_value(&self) -> i64 {
        self.dispense_unit_value
    }

    pub fn till_topic(&self) -> &str {
        &self.till_topic
    }

    pub fn receipt_file(&self) -> &str {
        &self.receipt_file
    }

    pub fn display_topic(&self) -> &str {
        &self.display_topic
    }

    pub fn frame_delay_ms(&self) -> u64 {
        self.frame_delay_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to shorten the sensing retry delay
    #[cfg(test)]
    pub fn with_sense_retry_delay_ms(mut self, ms: u64) -> Self {
        self.sense_retry_delay_ms = ms;
        self
    }

    /// Builder method for tests to set the dispense unit value
    #[cfg(test)]
    pub fn with_dispense_unit_value(mut self, value: i64) -> Self {
        self.dispense_unit_value = value;
        self
    }
}
