//! Tracker registry
//!
//! Built once at startup and never modified afterwards. The router resolves
//! tracker ids here; the shutdown coordinator walks the doors.

use crate::domain::{Door, TrackerId, TrackerState, TrackerTopics, TrackerUpdate};
use crate::services::dispatch::Dispatcher;
use crate::services::tracker_worker::TrackerWorker;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Router-side handle to one tracker's worker
#[derive(Debug)]
pub struct TrackerHandle {
    id: TrackerId,
    topics: TrackerTopics,
    tx: mpsc::UnboundedSender<TrackerUpdate>,
}

impl TrackerHandle {
    pub fn id(&self) -> TrackerId {
        self.id
    }

    /// Queue an update without waiting. Returns false if the worker is gone.
    pub fn send(&self, update: TrackerUpdate) -> bool {
        self.tx.send(update).is_ok()
    }
}

pub struct Fleet {
    doors: Vec<Arc<Door>>,
    trackers: FxHashMap<TrackerId, TrackerHandle>,
}

impl Fleet {
    /// Create handles and workers for every tracker of every door.
    /// Workers are returned unspawned.
    pub fn build<F>(doors: Vec<Door>, topics_for: F, dispatcher: Dispatcher) -> (Self, Vec<TrackerWorker>)
    where
        F: Fn(TrackerId) -> TrackerTopics,
    {
        let doors: Vec<Arc<Door>> = doors.into_iter().map(Arc::new).collect();
        let mut trackers = FxHashMap::default();
        let mut workers = Vec::new();

        for door in &doors {
            for &id in door.trackers() {
                if trackers.contains_key(&id) {
                    warn!(tracker_id = %id, door = %door.name(), "duplicate_tracker_ignored");
                    continue;
                }
                let (tx, rx) = mpsc::unbounded_channel();
                let state = TrackerState::new(id);
                workers.push(TrackerWorker::new(state, door.clone(), rx, dispatcher.clone()));
                trackers.insert(id, TrackerHandle { id, topics: topics_for(id), tx });
            }
        }

        (Self { doors, trackers }, workers)
    }

    pub fn get(&self, id: TrackerId) -> Option<&TrackerHandle> {
        self.trackers.get(&id)
    }

    pub fn doors(&self) -> &[Arc<Door>] {
        &self.doors
    }

    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Every topic to subscribe, ordered by tracker id for stable logs
    pub fn subscription_topics(&self) -> Vec<String> {
        let mut handles: Vec<&TrackerHandle> = self.trackers.values().collect();
        handles.sort_by_key(|h| h.id);
        handles
            .into_iter()
            .flat_map(|h| h.topics.iter().map(|(_, topic)| topic.to_string()).collect::<Vec<_>>())
            .collect()
    }
}
