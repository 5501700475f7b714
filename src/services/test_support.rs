//! Shared fakes for service tests

use crate::domain::{
    Door, DoorAction, DoorId, DoorOpener, EvaluationTrigger, Location, OpenerError, TrackerId,
    TrackerState, TrackerTopics,
};
use crate::domain::types::GeofenceLabels;
use crate::infra::metrics::Metrics;
use crate::services::dispatch::{Dispatcher, Evaluator};
use crate::services::fleet::Fleet;
use crate::services::tracker_worker::TrackerWorker;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Snapshot of what an evaluator saw
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Evaluation {
    pub tracker_id: TrackerId,
    pub trigger: EvaluationTrigger,
    pub location: Location,
    pub labels: GeofenceLabels,
}

/// Evaluator that reports every call on a channel
pub(crate) struct RecordingEvaluator {
    tx: mpsc::UnboundedSender<Evaluation>,
}

impl RecordingEvaluator {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Evaluation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl Evaluator for RecordingEvaluator {
    async fn evaluate(&self, tracker: &TrackerState, _door: &Door, trigger: EvaluationTrigger) {
        let _ = self.tx.send(Evaluation {
            tracker_id: tracker.id(),
            trigger,
            location: tracker.location(),
            labels: tracker.labels().clone(),
        });
    }
}

/// Evaluator that never finishes, simulating a hung actuator call
pub(crate) struct StuckEvaluator {
    pub entered: mpsc::UnboundedSender<TrackerId>,
}

#[async_trait]
impl Evaluator for StuckEvaluator {
    async fn evaluate(&self, tracker: &TrackerState, _door: &Door, _trigger: EvaluationTrigger) {
        let _ = self.entered.send(tracker.id());
        std::future::pending::<()>().await;
    }
}

#[derive(Default)]
pub(crate) struct RecordingOpener {
    pub actions: Mutex<Vec<DoorAction>>,
    pub shutdowns: AtomicU32,
}

impl RecordingOpener {
    pub fn shutdown_count(&self) -> u32 {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DoorOpener for RecordingOpener {
    fn kind(&self) -> &'static str {
        "recording"
    }

    async fn set_state(&self, action: DoorAction) -> Result<(), OpenerError> {
        self.actions.lock().push(action);
        Ok(())
    }

    async fn process_shutdown(&self) -> Result<(), OpenerError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One door per tracker id, TeslaMate topics, recording openers
pub(crate) fn test_fleet(
    evaluator: Arc<dyn Evaluator>,
    tracker_ids: &[u32],
) -> (Arc<Fleet>, Vec<TrackerWorker>, Vec<Arc<RecordingOpener>>, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    let mut openers = Vec::new();
    let doors = tracker_ids
        .iter()
        .enumerate()
        .map(|(index, &id)| {
            let opener = Arc::new(RecordingOpener::default());
            openers.push(opener.clone());
            Door::new(DoorId(index), format!("door_{}", index), vec![TrackerId(id)], opener)
        })
        .collect();

    let dispatcher = Dispatcher::new(evaluator, metrics.clone());
    let (fleet, workers) = Fleet::build(doors, TrackerTopics::teslamate, dispatcher);
    (Arc::new(fleet), workers, openers, metrics)
}

pub(crate) fn spawn_workers(workers: Vec<TrackerWorker>) {
    for worker in workers {
        tokio::spawn(worker.run());
    }
}

pub(crate) async fn next_evaluation(rx: &mut mpsc::UnboundedReceiver<Evaluation>) -> Evaluation {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for evaluation")
        .expect("evaluator channel closed")
}

/// Assert nothing else arrives within a short window
pub(crate) async fn assert_no_evaluation(rx: &mut mpsc::UnboundedReceiver<Evaluation>) {
    let extra = timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(extra.is_err(), "unexpected evaluation: {:?}", extra);
}
