//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config / -c <path> command line argument
//! 2. CONFIG_FILE environment variable
//!
//! After loading, a few environment variables override file values:
//! `TESLAMATE_MQTT_USER`, `TESLAMATE_MQTT_PASS`, `TESTING`.

use crate::domain::types::{FieldKind, TopicPath, TrackerId};
use crate::domain::TrackerTopics;
use crate::error::AgentError;
use anyhow::Context;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// How long to wait for a SUBACK before counting the attempt as failed
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
    /// Capacity of the shared inbound message channel
    #[serde(default = "default_inbound_capacity")]
    pub inbound_capacity: usize,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_ack_timeout_secs() -> u64 {
    10
}

fn default_inbound_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeConfig {
    #[serde(default = "default_subscribe_attempts")]
    pub attempts: u32,
    #[serde(default = "default_subscribe_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            attempts: default_subscribe_attempts(),
            interval_secs: default_subscribe_interval_secs(),
        }
    }
}

fn default_subscribe_attempts() -> u32 {
    5
}

fn default_subscribe_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_disconnect_grace_ms")]
    pub disconnect_grace_ms: u64,
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            disconnect_grace_ms: default_disconnect_grace_ms(),
            quiescence_ms: default_quiescence_ms(),
        }
    }
}

fn default_disconnect_grace_ms() -> u64 {
    250
}

fn default_quiescence_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    60
}

/// Geofence label transition that triggers a door action
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeofenceConfig {
    #[serde(default)]
    pub close: Option<TriggerConfig>,
    #[serde(default)]
    pub open: Option<TriggerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HttpOpenerConfig {
    pub open_url: String,
    pub close_url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_http_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MqttOpenerConfig {
    /// Broker host; defaults to the telemetry broker
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub topic: String,
    #[serde(default = "default_open_payload")]
    pub open_payload: String,
    #[serde(default = "default_close_payload")]
    pub close_payload: String,
}

fn default_open_payload() -> String {
    "open".to_string()
}

fn default_close_payload() -> String {
    "close".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OpenerConfig {
    Http(HttpOpenerConfig),
    Mqtt(MqttOpenerConfig),
    /// Log actions without driving any hardware
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub id: u32,
    #[serde(default)]
    pub geofence_topic: Option<String>,
    #[serde(default)]
    pub latitude_topic: Option<String>,
    #[serde(default)]
    pub longitude_topic: Option<String>,
}

impl TrackerConfig {
    pub fn tracker_id(&self) -> TrackerId {
        TrackerId(self.id)
    }

    /// Explicit topics where configured, TeslaMate layout otherwise
    pub fn topics(&self) -> TrackerTopics {
        let defaults = TrackerTopics::teslamate(self.tracker_id());
        TrackerTopics {
            geofence: self.geofence_topic.clone().unwrap_or(defaults.geofence),
            latitude: self.latitude_topic.clone().unwrap_or(defaults.latitude),
            longitude: self.longitude_topic.clone().unwrap_or(defaults.longitude),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoorConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Minimum time between two actions on this door
    #[serde(default)]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub geofence: GeofenceConfig,
    pub opener: OpenerConfig,
    pub trackers: Vec<TrackerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub testing: bool,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub subscribe: SubscribeConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub doors: Vec<DoorConfig>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    config_file: String,
    testing: bool,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_client_id: Option<String>,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_use_tls: bool,
    mqtt_skip_tls_verify: bool,
    mqtt_keep_alive_secs: u64,
    mqtt_ack_timeout_secs: u64,
    inbound_capacity: usize,
    subscribe_attempts: u32,
    subscribe_interval_secs: u64,
    disconnect_grace_ms: u64,
    quiescence_ms: u64,
    metrics_interval_secs: u64,
    doors: Vec<DoorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_file: "default".to_string(),
            testing: false,
            mqtt_host: "localhost".to_string(),
            mqtt_port: default_mqtt_port(),
            mqtt_client_id: None,
            mqtt_username: None,
            mqtt_password: None,
            mqtt_use_tls: false,
            mqtt_skip_tls_verify: false,
            mqtt_keep_alive_secs: default_keep_alive_secs(),
            mqtt_ack_timeout_secs: default_ack_timeout_secs(),
            inbound_capacity: default_inbound_capacity(),
            subscribe_attempts: default_subscribe_attempts(),
            subscribe_interval_secs: default_subscribe_interval_secs(),
            disconnect_grace_ms: default_disconnect_grace_ms(),
            quiescence_ms: default_quiescence_ms(),
            metrics_interval_secs: default_metrics_interval_secs(),
            doors: Vec::new(),
        }
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> Option<String> {
        if let Some(path) = cli_path {
            return Some(path.to_string());
        }
        env::var("CONFIG_FILE").ok().filter(|p| !p.is_empty())
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", source))?;

        let config = Self {
            config_file: source.to_string(),
            testing: toml_config.testing,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_client_id: toml_config.mqtt.client_id.filter(|id| !id.is_empty()),
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            mqtt_use_tls: toml_config.mqtt.use_tls,
            mqtt_skip_tls_verify: toml_config.mqtt.skip_tls_verify,
            mqtt_keep_alive_secs: toml_config.mqtt.keep_alive_secs,
            mqtt_ack_timeout_secs: toml_config.mqtt.ack_timeout_secs,
            inbound_capacity: toml_config.mqtt.inbound_capacity,
            subscribe_attempts: toml_config.subscribe.attempts,
            subscribe_interval_secs: toml_config.subscribe.interval_secs,
            disconnect_grace_ms: toml_config.shutdown.disconnect_grace_ms,
            quiescence_ms: toml_config.shutdown.quiescence_ms,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            doors: toml_config.doors,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides using an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(user) = lookup("TESLAMATE_MQTT_USER") {
            tracing::debug!("TESLAMATE_MQTT_USER defined, overriding config");
            self.mqtt_username = Some(user);
        }
        if let Some(pass) = lookup("TESLAMATE_MQTT_PASS") {
            tracing::debug!("TESLAMATE_MQTT_PASS defined, overriding config");
            self.mqtt_password = Some(pass);
        }
        if let Some(testing) = lookup("TESTING") {
            match parse_bool(&testing) {
                Some(value) => {
                    self.testing = value;
                    tracing::debug!(testing = %self.testing, "TESTING defined, overriding config");
                }
                None => {
                    tracing::warn!(value = %testing, testing = %self.testing, "TESTING not a boolean, ignored");
                }
            }
        }
    }

    /// Structural checks the router and workers rely on
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.doors.is_empty() {
            return Err(AgentError::Config("at least one door must be configured".to_string()));
        }
        if self.subscribe_attempts == 0 {
            return Err(AgentError::Config("subscribe.attempts must be at least 1".to_string()));
        }
        if self.mqtt_keep_alive_secs < 5 {
            return Err(AgentError::Config("mqtt.keep_alive_secs must be at least 5".to_string()));
        }
        if self.mqtt_ack_timeout_secs == 0 {
            return Err(AgentError::Config("mqtt.ack_timeout_secs must be at least 1".to_string()));
        }
        if self.metrics_interval_secs == 0 {
            return Err(AgentError::Config("metrics.interval_secs must be at least 1".to_string()));
        }
        if self.inbound_capacity == 0 {
            return Err(AgentError::Config("mqtt.inbound_capacity must be at least 1".to_string()));
        }

        let mut seen = FxHashSet::default();
        for (index, door) in self.doors.iter().enumerate() {
            if door.trackers.is_empty() {
                return Err(AgentError::Config(format!("door {} has no trackers", index)));
            }
            for tracker in &door.trackers {
                let id = tracker.tracker_id();
                if !seen.insert(id) {
                    return Err(AgentError::Config(format!(
                        "tracker {} is assigned to more than one door",
                        id
                    )));
                }
                for (field, topic) in tracker.topics().iter() {
                    Self::check_topic(id, field, topic)?;
                }
            }
        }
        Ok(())
    }

    /// The router resolves trackers positionally, so a topic must decode
    /// back to its own tracker and field.
    fn check_topic(id: TrackerId, field: FieldKind, topic: &str) -> Result<(), AgentError> {
        match TopicPath::parse(topic) {
            Ok(path) if path.tracker_id == id && path.field == field => Ok(()),
            Ok(_) => Err(AgentError::Config(format!(
                "topic '{}' does not resolve to tracker {} {}",
                topic,
                id,
                field.as_str()
            ))),
            Err(e) => Err(AgentError::Config(format!("topic '{}': {}", topic, e))),
        }
    }

    /// Subscription topics of a configured tracker
    pub fn tracker_topics(&self, id: TrackerId) -> TrackerTopics {
        self.doors
            .iter()
            .flat_map(|door| &door.trackers)
            .find(|tracker| tracker.tracker_id() == id)
            .map(TrackerConfig::topics)
            .unwrap_or_else(|| TrackerTopics::teslamate(id))
    }

    /// Human readable name of a door
    pub fn door_name(&self, index: usize) -> String {
        self.doors
            .get(index)
            .and_then(|d| d.name.clone())
            .unwrap_or_else(|| format!("door_{}", index))
    }

    // Getters for all config fields
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn testing(&self) -> bool {
        self.testing
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_client_id(&self) -> Option<&str> {
        self.mqtt_client_id.as_deref()
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_use_tls(&self) -> bool {
        self.mqtt_use_tls
    }

    pub fn mqtt_skip_tls_verify(&self) -> bool {
        self.mqtt_skip_tls_verify
    }

    pub fn mqtt_keep_alive_secs(&self) -> u64 {
        self.mqtt_keep_alive_secs
    }

    pub fn mqtt_ack_timeout_secs(&self) -> u64 {
        self.mqtt_ack_timeout_secs
    }

    pub fn inbound_capacity(&self) -> usize {
        self.inbound_capacity
    }

    pub fn subscribe_attempts(&self) -> u32 {
        self.subscribe_attempts
    }

    pub fn subscribe_interval_secs(&self) -> u64 {
        self.subscribe_interval_secs
    }

    pub fn disconnect_grace_ms(&self) -> u64 {
        self.disconnect_grace_ms
    }

    pub fn quiescence_ms(&self) -> u64 {
        self.quiescence_ms
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn doors(&self) -> &[DoorConfig] {
        &self.doors
    }
}

/// Boolean spellings accepted for environment flags
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[mqtt]
host = "teslamate"

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1 }]
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.subscribe_attempts(), 5);
        assert_eq!(config.subscribe_interval_secs(), 5);
        assert_eq!(config.disconnect_grace_ms(), 250);
        assert_eq!(config.quiescence_ms(), 250);
        assert!(config.doors().is_empty());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(MINIMAL, "inline").unwrap();
        assert_eq!(config.mqtt_host(), "teslamate");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.mqtt_keep_alive_secs(), 30);
        assert_eq!(config.mqtt_ack_timeout_secs(), 10);
        assert!(config.mqtt_client_id().is_none());
        assert!(!config.testing());
        assert_eq!(config.doors().len(), 1);
        assert_eq!(config.doors()[0].opener, OpenerConfig::None);
        assert_eq!(config.door_name(0), "door_0");
    }

    #[test]
    fn test_default_tracker_topics() {
        let config = Config::from_toml_str(MINIMAL, "inline").unwrap();
        let topics = config.doors()[0].trackers[0].topics();
        assert_eq!(topics.geofence, "teslamate/cars/1/geofence");
        assert_eq!(topics.latitude, "teslamate/cars/1/latitude");
        assert_eq!(topics.longitude, "teslamate/cars/1/longitude");
    }

    #[test]
    fn test_rejects_duplicate_tracker() {
        let content = r#"
[mqtt]
host = "teslamate"

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1 }]

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1 }]
"#;
        let err = Config::from_toml_str(content, "inline").unwrap_err();
        assert!(format!("{:#}", err).contains("more than one door"));
    }

    #[test]
    fn test_rejects_topic_for_other_tracker() {
        let content = r#"
[mqtt]
host = "teslamate"

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1, latitude_topic = "teslamate/cars/2/latitude" }]
"#;
        let err = Config::from_toml_str(content, "inline").unwrap_err();
        assert!(format!("{:#}", err).contains("does not resolve"));
    }

    #[test]
    fn test_rejects_no_doors() {
        let err = Config::from_toml_str("[mqtt]\nhost = \"x\"\n", "inline").unwrap_err();
        assert!(format!("{:#}", err).contains("at least one door"));
    }

    #[test]
    fn test_rejects_zero_metrics_interval() {
        let content = format!("{}\n[metrics]\ninterval_secs = 0\n", MINIMAL);
        let err = Config::from_toml_str(&content, "inline").unwrap_err();
        assert!(format!("{:#}", err).contains("metrics.interval_secs"));
    }

    #[test]
    fn test_rejects_zero_ack_timeout() {
        let content = r#"
[mqtt]
host = "teslamate"
ack_timeout_secs = 0

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1 }]
"#;
        let err = Config::from_toml_str(content, "inline").unwrap_err();
        assert!(format!("{:#}", err).contains("mqtt.ack_timeout_secs"));
    }

    #[test]
    fn test_testing_flag_spellings() {
        let cases = [
            ("t", true),
            ("T", true),
            ("True", true),
            ("1", true),
            ("f", false),
            ("0", false),
            ("FALSE", false),
        ];
        for (raw, expected) in cases {
            let mut config = Config::from_toml_str(MINIMAL, "inline").unwrap();
            config.testing = !expected;
            config.apply_overrides_from(|key| (key == "TESTING").then(|| raw.to_string()));
            assert_eq!(config.testing(), expected, "TESTING={}", raw);
        }
    }

    #[test]
    fn test_unparseable_testing_flag_ignored() {
        let mut config = Config::from_toml_str(MINIMAL, "inline").unwrap();
        config.testing = true;
        config.apply_overrides_from(|key| (key == "TESTING").then(|| "yes please".to_string()));
        assert!(config.testing());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::from_toml_str(MINIMAL, "inline").unwrap();
        config.apply_overrides_from(|key| match key {
            "TESLAMATE_MQTT_USER" => Some("car".to_string()),
            "TESLAMATE_MQTT_PASS" => Some("secret".to_string()),
            "TESTING" => Some("true".to_string()),
            _ => None,
        });
        assert_eq!(config.mqtt_username(), Some("car"));
        assert_eq!(config.mqtt_password(), Some("secret"));
        assert!(config.testing());
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        assert_eq!(
            Config::resolve_config_path(Some("/app/config/config.toml")),
            Some("/app/config/config.toml".to_string())
        );
    }
}
