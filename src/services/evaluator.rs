//! Label-transition geofence evaluator
//!
//! Acts on externally supplied geofence labels (e.g. TeslaMate geofence
//! names). A door is closed or opened when a tracker's label moves along
//! one of the door's configured `from -> to` transitions. Location-only
//! updates never drive this evaluator.

use crate::domain::{Door, DoorAction, DoorId, EvaluationTrigger, TrackerState};
use crate::services::dispatch::Evaluator;
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct LabelTransitionEvaluator {
    /// Evaluate but never drive actuators
    testing: bool,
    /// Last action time per door, shared by every tracker of that door
    last_action: Mutex<FxHashMap<DoorId, Instant>>,
}

impl LabelTransitionEvaluator {
    pub fn new(testing: bool) -> Self {
        Self { testing, last_action: Mutex::new(FxHashMap::default()) }
    }

    fn action_for(door: &Door, previous: &str, current: &str) -> Option<DoorAction> {
        if door.close_trigger().matches(previous, current) {
            Some(DoorAction::Close)
        } else if door.open_trigger().matches(previous, current) {
            Some(DoorAction::Open)
        } else {
            None
        }
    }

    /// Reserve the door for an action unless it is cooling down.
    /// Returns false when the previous action is too recent.
    fn try_reserve(&self, door: &Door) -> bool {
        let now = Instant::now();
        let mut last_action = self.last_action.lock();
        if let Some(last) = last_action.get(&door.id()) {
            if now.duration_since(*last) < door.cooldown() {
                return false;
            }
        }
        last_action.insert(door.id(), now);
        true
    }
}

#[async_trait]
impl Evaluator for LabelTransitionEvaluator {
    async fn evaluate(&self, tracker: &TrackerState, door: &Door, trigger: EvaluationTrigger) {
        if trigger != EvaluationTrigger::LabelChanged {
            return;
        }

        let labels = tracker.labels();
        if !labels.changed() {
            debug!(tracker_id = %tracker.id(), label = %labels.current, "geofence_unchanged");
            return;
        }

        let Some(action) = Self::action_for(door, &labels.previous, &labels.current) else {
            return;
        };

        info!(
            tracker_id = %tracker.id(),
            door = %door.name(),
            from = %labels.previous,
            to = %labels.current,
            action = %action,
            "geofence_trigger_matched"
        );

        if !self.try_reserve(door) {
            info!(
                door = %door.name(),
                cooldown_secs = %door.cooldown().as_secs(),
                "door_cooldown_active"
            );
            return;
        }

        if self.testing {
            warn!(door = %door.name(), action = %action, "testing_mode_action_skipped");
            return;
        }

        match door.opener().set_state(action).await {
            Ok(()) => {
                info!(door = %door.name(), action = %action, opener = %door.opener().kind(), "door_action_sent");
            }
            Err(e) => {
                error!(
                    door = %door.name(),
                    action = %action,
                    opener = %door.opener().kind(),
                    error = %e,
                    "door_action_failed"
                );
            }
        }
    }
}
