//! Integration tests for configuration loading

use geogdo_agent::domain::{TrackerId, TrackerTopics};
use geogdo_agent::infra::config::{HttpMethod, OpenerConfig};
use geogdo_agent::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

const FULL_CONFIG: &str = r#"
testing = true

[mqtt]
host = "broker.local"
port = 8883
username = "teslamate"
password = "secret"
use_tls = true
keep_alive_secs = 20
inbound_capacity = 64

[subscribe]
attempts = 3
interval_secs = 2

[shutdown]
disconnect_grace_ms = 500
quiescence_ms = 100

[metrics]
interval_secs = 15

[[doors]]
name = "main_garage"
cooldown_secs = 120

[doors.geofence]
close = { from = "home", to = "not_home" }
open = { from = "not_home", to = "home" }

[doors.opener]
type = "http"
open_url = "http://admin:pw@relay.local/open"
close_url = "http://admin:pw@relay.local/close"
method = "get"

[[doors.trackers]]
id = 1

[[doors.trackers]]
id = 2
geofence_topic = "tm/cars/2/geofence"

[[doors]]
name = "side_door"

[doors.opener]
type = "mqtt"
topic = "garage/side/set"

[[doors.trackers]]
id = 3
"#;

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(FULL_CONFIG);
    let config = Config::from_file(temp_file.path()).unwrap();

    assert!(config.testing());
    assert_eq!(config.mqtt_host(), "broker.local");
    assert_eq!(config.mqtt_port(), 8883);
    assert_eq!(config.mqtt_username(), Some("teslamate"));
    assert!(config.mqtt_use_tls());
    assert!(!config.mqtt_skip_tls_verify());
    assert_eq!(config.mqtt_keep_alive_secs(), 20);
    assert_eq!(config.mqtt_ack_timeout_secs(), 10);
    assert_eq!(config.inbound_capacity(), 64);
    assert_eq!(config.subscribe_attempts(), 3);
    assert_eq!(config.subscribe_interval_secs(), 2);
    assert_eq!(config.disconnect_grace_ms(), 500);
    assert_eq!(config.quiescence_ms(), 100);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.doors().len(), 2);
}

#[test]
fn test_openers_parsed_by_type() {
    let temp_file = write_config(FULL_CONFIG);
    let config = Config::from_file(temp_file.path()).unwrap();

    match &config.doors()[0].opener {
        OpenerConfig::Http(http) => {
            assert_eq!(http.method, HttpMethod::Get);
            assert_eq!(http.timeout_ms, 5000);
            assert_eq!(http.close_url, "http://admin:pw@relay.local/close");
        }
        other => panic!("expected http opener, got {:?}", other),
    }

    match &config.doors()[1].opener {
        OpenerConfig::Mqtt(mqtt) => {
            assert_eq!(mqtt.topic, "garage/side/set");
            assert_eq!(mqtt.open_payload, "open");
            assert_eq!(mqtt.close_payload, "close");
            assert_eq!(mqtt.host, None);
        }
        other => panic!("expected mqtt opener, got {:?}", other),
    }
}

#[test]
fn test_tracker_topics_default_and_explicit() {
    let temp_file = write_config(FULL_CONFIG);
    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.tracker_topics(TrackerId(1)), TrackerTopics::teslamate(TrackerId(1)));

    let explicit = config.tracker_topics(TrackerId(2));
    assert_eq!(explicit.geofence, "tm/cars/2/geofence");
    assert_eq!(explicit.latitude, "teslamate/cars/2/latitude");
}

#[test]
fn test_env_overrides_after_load() {
    let temp_file = write_config(FULL_CONFIG);
    let mut config = Config::from_file(temp_file.path()).unwrap();

    config.apply_overrides_from(|key| match key {
        "TESLAMATE_MQTT_USER" => Some("env-user".to_string()),
        "TESLAMATE_MQTT_PASS" => Some("env-pass".to_string()),
        "TESTING" => Some("false".to_string()),
        _ => None,
    });

    assert_eq!(config.mqtt_username(), Some("env-user"));
    assert_eq!(config.mqtt_password(), Some("env-pass"));
    assert!(!config.testing());
}

#[test]
fn test_duplicate_tracker_rejected() {
    let temp_file = write_config(
        r#"
[mqtt]
host = "localhost"

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1 }]

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1 }]
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("more than one door"));
}

#[test]
fn test_mismatched_topic_rejected() {
    let temp_file = write_config(
        r#"
[mqtt]
host = "localhost"

[[doors]]
opener = { type = "none" }
trackers = [{ id = 1, latitude_topic = "teslamate/cars/9/latitude" }]
"#,
    );

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_missing_file_is_error() {
    assert!(Config::from_file("/nonexistent/config.toml").is_err());
}
