//! Per-tracker worker - serializes merge and evaluation for one vehicle
//!
//! Each tracker gets one long-lived worker consuming its update channel in
//! arrival order. The worker is the only writer of the tracker's state and
//! awaits each evaluation before taking the next update, so a tracker never
//! evaluates concurrently with itself. Workers for different trackers run
//! independently.

use crate::domain::{Door, EvaluationTrigger, TrackerState, TrackerUpdate};
use crate::services::dispatch::Dispatcher;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct TrackerWorker {
    state: TrackerState,
    door: Arc<Door>,
    rx: mpsc::UnboundedReceiver<TrackerUpdate>,
    dispatcher: Dispatcher,
}

impl TrackerWorker {
    pub fn new(
        state: TrackerState,
        door: Arc<Door>,
        rx: mpsc::UnboundedReceiver<TrackerUpdate>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self { state, door, rx, dispatcher }
    }

    /// Run until every sender for this tracker is dropped
    pub async fn run(mut self) {
        info!(tracker_id = %self.state.id(), door = %self.door.name(), "tracker_worker_started");

        while let Some(update) = self.rx.recv().await {
            self.apply(update).await;
        }

        info!(tracker_id = %self.state.id(), "tracker_worker_stopped");
    }

    /// Merge one update and evaluate if warranted
    pub async fn apply(&mut self, update: TrackerUpdate) {
        match update {
            TrackerUpdate::Location(delta) => {
                if self.state.merge_location(delta) {
                    self.dispatcher
                        .dispatch(&self.state, &self.door, EvaluationTrigger::LocationUpdated)
                        .await;
                } else {
                    debug!(tracker_id = %self.state.id(), delta = ?delta, "location_incomplete");
                }
            }
            TrackerUpdate::Label(label) => {
                self.state.record_label(label);
                info!(
                    tracker_id = %self.state.id(),
                    previous = %self.state.labels().previous,
                    current = %self.state.labels().current,
                    "geofence_received"
                );
                self.dispatcher
                    .dispatch(&self.state, &self.door, EvaluationTrigger::LabelChanged)
                    .await;
            }
        }
    }
}
