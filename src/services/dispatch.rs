//! Evaluation dispatch
//!
//! Hands a tracker's current state to the geofence evaluator. The result
//! of an evaluation is never consumed here; evaluators log and contain
//! their own failures.

use crate::domain::{Door, EvaluationTrigger, TrackerState};
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Geofence evaluation step. Implementations decide, from the tracker's
/// state and label transition, whether to command the door.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, tracker: &TrackerState, door: &Door, trigger: EvaluationTrigger);
}

/// Cheap-to-clone handle shared by all tracker workers
#[derive(Clone)]
pub struct Dispatcher {
    evaluator: Arc<dyn Evaluator>,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(evaluator: Arc<dyn Evaluator>, metrics: Arc<Metrics>) -> Self {
        Self { evaluator, metrics }
    }

    pub async fn dispatch(&self, tracker: &TrackerState, door: &Door, trigger: EvaluationTrigger) {
        let start = Instant::now();
        debug!(
            tracker_id = %tracker.id(),
            door = %door.name(),
            trigger = %trigger.as_str(),
            "evaluation_dispatched"
        );

        self.evaluator.evaluate(tracker, door, trigger).await;

        let latency_us = start.elapsed().as_micros() as u64;
        self.metrics.record_evaluation(latency_us);
    }
}
