//! Garage doors and the actuator interface they drive

use crate::domain::types::{DoorAction, DoorId, TrackerId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Actuator failures. Never escalated past the evaluator or shutdown path.
#[derive(Debug, Error)]
pub enum OpenerError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("opener is shut down")]
    ShutDown,
}

/// Door actuator back-end (HTTP, MQTT command, ...)
#[async_trait]
pub trait DoorOpener: Send + Sync {
    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Command the door to open or close
    async fn set_state(&self, action: DoorAction) -> Result<(), OpenerError>;

    /// Stop any in-flight action and refuse new ones
    async fn process_shutdown(&self) -> Result<(), OpenerError>;
}

/// Open/close rule expressed as a geofence label transition.
/// An empty `from` or `to` matches any label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTrigger {
    pub from: String,
    pub to: String,
}

impl LabelTrigger {
    pub fn matches(&self, previous: &str, current: &str) -> bool {
        if self.from.is_empty() && self.to.is_empty() {
            return false;
        }
        (self.from.is_empty() || self.from == previous) && (self.to.is_empty() || self.to == current)
    }
}

/// A controllable garage door owning one or more trackers and one actuator
pub struct Door {
    id: DoorId,
    name: String,
    trackers: Vec<TrackerId>,
    close_trigger: LabelTrigger,
    open_trigger: LabelTrigger,
    cooldown: Duration,
    opener: Arc<dyn DoorOpener>,
}

impl Door {
    pub fn new(
        id: DoorId,
        name: impl Into<String>,
        trackers: Vec<TrackerId>,
        opener: Arc<dyn DoorOpener>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            trackers,
            close_trigger: LabelTrigger::default(),
            open_trigger: LabelTrigger::default(),
            cooldown: Duration::ZERO,
            opener,
        }
    }

    pub fn with_triggers(mut self, close: LabelTrigger, open: LabelTrigger) -> Self {
        self.close_trigger = close;
        self.open_trigger = open;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn id(&self) -> DoorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn trackers(&self) -> &[TrackerId] {
        &self.trackers
    }

    pub fn close_trigger(&self) -> &LabelTrigger {
        &self.close_trigger
    }

    pub fn open_trigger(&self) -> &LabelTrigger {
        &self.open_trigger
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn opener(&self) -> &Arc<dyn DoorOpener> {
        &self.opener
    }
}

impl std::fmt::Debug for Door {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Door")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("trackers", &self.trackers)
            .field("opener", &self.opener.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(from: &str, to: &str) -> LabelTrigger {
        LabelTrigger { from: from.to_string(), to: to.to_string() }
    }

    #[test]
    fn test_trigger_exact_match() {
        let t = trigger("home", "not_home");
        assert!(t.matches("home", "not_home"));
        assert!(!t.matches("work", "not_home"));
        assert!(!t.matches("home", "work"));
    }

    #[test]
    fn test_trigger_wildcards() {
        // Leaving home for anywhere
        let t = trigger("home", "");
        assert!(t.matches("home", "work"));
        assert!(t.matches("home", ""));
        assert!(!t.matches("work", "home"));

        // Arriving home from anywhere
        let t = trigger("", "home");
        assert!(t.matches("", "home"));
        assert!(t.matches("work", "home"));
    }

    #[test]
    fn test_empty_trigger_never_matches() {
        assert!(!LabelTrigger::default().matches("home", "work"));
    }
}
