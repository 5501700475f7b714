//! Telemetry router - resolves inbound messages to tracker workers
//!
//! A single loop drains the shared inbound channel. Routing never awaits
//! evaluation: every accepted message becomes a `TrackerUpdate` queued on
//! the tracker's unbounded channel, so one slow vehicle cannot stall the
//! others. Label updates travel through the same channel as location
//! deltas, which keeps label- and location-driven evaluations of one
//! tracker strictly serialized.

use crate::domain::{FieldKind, InboundMessage, LocationDelta, TopicPath, TrackerId, TrackerUpdate};
use crate::infra::metrics::{DropReason, Metrics};
use crate::services::fleet::Fleet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What happened to a routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Forwarded(TrackerId, FieldKind),
    Dropped(DropReason),
    /// Tracker worker has stopped; only happens during teardown
    WorkerStopped(TrackerId),
}

pub struct Router {
    fleet: Arc<Fleet>,
    metrics: Arc<Metrics>,
}

impl Router {
    pub fn new(fleet: Arc<Fleet>, metrics: Arc<Metrics>) -> Self {
        Self { fleet, metrics }
    }

    /// Route messages until shutdown is signalled or the inbound channel closes
    pub async fn run(
        &self,
        mut inbound_rx: mpsc::Receiver<InboundMessage>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(trackers = %self.fleet.tracker_count(), "router_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("router_shutdown");
                        break;
                    }
                }
                message = inbound_rx.recv() => {
                    match message {
                        Some(m) => {
                            self.route(m);
                        }
                        None => {
                            info!("router_inbound_closed");
                            break;
                        }
                    }
                }
            }
        }

        // Stop accepting; anything still queued is discarded
        inbound_rx.close();
    }

    /// Route one message. Never blocks.
    pub fn route(&self, message: InboundMessage) -> RouteOutcome {
        let path = match TopicPath::parse(&message.topic) {
            Ok(path) => path,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "malformed_topic_dropped");
                return self.drop_message(DropReason::MalformedTopic);
            }
        };

        let Some(tracker) = self.fleet.get(path.tracker_id) else {
            warn!(topic = %message.topic, tracker_id = %path.tracker_id, "unknown_tracker_dropped");
            return self.drop_message(DropReason::UnknownTracker);
        };

        let Ok(payload) = std::str::from_utf8(&message.payload) else {
            warn!(tracker_id = %path.tracker_id, field = %path.field.as_str(), "invalid_utf8_payload_dropped");
            return self.drop_message(DropReason::MalformedPayload);
        };
        let update = match path.field {
            FieldKind::Geofence => TrackerUpdate::Label(payload.to_string()),
            FieldKind::Latitude | FieldKind::Longitude => {
                let Some(value) = parse_coordinate(payload) else {
                    warn!(
                        tracker_id = %path.tracker_id,
                        field = %path.field.as_str(),
                        payload = %payload,
                        "malformed_coordinate_dropped"
                    );
                    return self.drop_message(DropReason::MalformedPayload);
                };
                debug!(
                    tracker_id = %path.tracker_id,
                    field = %path.field.as_str(),
                    value = %value,
                    "coordinate_received"
                );
                if path.field == FieldKind::Latitude {
                    TrackerUpdate::Location(LocationDelta::Latitude(value))
                } else {
                    TrackerUpdate::Location(LocationDelta::Longitude(value))
                }
            }
        };

        if !tracker.send(update) {
            warn!(tracker_id = %path.tracker_id, "tracker_worker_stopped");
            return RouteOutcome::WorkerStopped(path.tracker_id);
        }

        self.metrics.record_update_forwarded();
        RouteOutcome::Forwarded(path.tracker_id, path.field)
    }

    fn drop_message(&self, reason: DropReason) -> RouteOutcome {
        self.metrics.record_dropped(reason);
        RouteOutcome::Dropped(reason)
    }
}

/// Parse a decimal coordinate; rejects NaN and infinities
fn parse_coordinate(payload: &str) -> Option<f64> {
    payload.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
