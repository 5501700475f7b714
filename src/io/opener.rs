//! Actuator construction from door configuration

use crate::domain::{Door, DoorAction, DoorId, DoorOpener, LabelTrigger, OpenerError};
use crate::error::AgentError;
use crate::infra::config::{Config, OpenerConfig, TriggerConfig};
use crate::io::http_opener::HttpOpener;
use crate::io::mqtt_opener::MqttOpener;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Logs actions and drives nothing
pub struct NoopOpener {
    door: String,
}

impl NoopOpener {
    pub fn new(door: impl Into<String>) -> Self {
        Self { door: door.into() }
    }
}

#[async_trait]
impl DoorOpener for NoopOpener {
    fn kind(&self) -> &'static str {
        "none"
    }

    async fn set_state(&self, action: DoorAction) -> Result<(), OpenerError> {
        info!(door = %self.door, action = %action, "noop_opener_action");
        Ok(())
    }

    async fn process_shutdown(&self) -> Result<(), OpenerError> {
        Ok(())
    }
}

pub fn build_opener(
    door_name: &str,
    opener: &OpenerConfig,
    config: &Config,
) -> Result<Arc<dyn DoorOpener>, AgentError> {
    let opener: Arc<dyn DoorOpener> = match opener {
        OpenerConfig::Http(http) => Arc::new(
            HttpOpener::new(http)
                .map_err(|e| AgentError::Config(format!("door {}: {}", door_name, e)))?,
        ),
        OpenerConfig::Mqtt(mqtt) => Arc::new(MqttOpener::new(mqtt, config)),
        OpenerConfig::None => Arc::new(NoopOpener::new(door_name)),
    };
    info!(door = %door_name, opener = %opener.kind(), "door_opener_ready");
    Ok(opener)
}

fn label_trigger(trigger: Option<&TriggerConfig>) -> LabelTrigger {
    trigger
        .map(|t| LabelTrigger { from: t.from.clone(), to: t.to.clone() })
        .unwrap_or_default()
}

/// Build every configured door with its triggers and actuator
pub fn build_doors(config: &Config) -> Result<Vec<Door>, AgentError> {
    config
        .doors()
        .iter()
        .enumerate()
        .map(|(index, door)| {
            let name = config.door_name(index);
            let opener = build_opener(&name, &door.opener, config)?;
            let trackers = door.trackers.iter().map(|t| t.tracker_id()).collect();
            Ok(Door::new(DoorId(index), name, trackers, opener)
                .with_triggers(
                    label_trigger(door.geofence.close.as_ref()),
                    label_trigger(door.geofence.open.as_ref()),
                )
                .with_cooldown(Duration::from_secs(door.cooldown_secs)))
        })
        .collect()
}
