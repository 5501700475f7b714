//! Per-vehicle tracker state

use crate::domain::types::{FieldKind, GeofenceLabels, Location, LocationDelta, TrackerId};

/// The three telemetry topics subscribed for one tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerTopics {
    pub geofence: String,
    pub latitude: String,
    pub longitude: String,
}

impl TrackerTopics {
    /// Topic layout published by TeslaMate: `teslamate/cars/<id>/<field>`
    pub fn teslamate(id: TrackerId) -> Self {
        Self {
            geofence: format!("teslamate/cars/{}/geofence", id),
            latitude: format!("teslamate/cars/{}/latitude", id),
            longitude: format!("teslamate/cars/{}/longitude", id),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKind, &str)> {
        [
            (FieldKind::Geofence, self.geofence.as_str()),
            (FieldKind::Latitude, self.latitude.as_str()),
            (FieldKind::Longitude, self.longitude.as_str()),
        ]
        .into_iter()
    }
}

/// Mutable state of one tracked vehicle.
///
/// Owned by the tracker's worker task, which is the only writer. Evaluators
/// receive a shared borrow.
#[derive(Debug, Clone)]
pub struct TrackerState {
    id: TrackerId,
    location: Location,
    labels: GeofenceLabels,
}

impl TrackerState {
    pub fn new(id: TrackerId) -> Self {
        Self { id, location: Location::default(), labels: GeofenceLabels::default() }
    }

    pub fn id(&self) -> TrackerId {
        self.id
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn labels(&self) -> &GeofenceLabels {
        &self.labels
    }

    /// Merge a single-coordinate update. Returns true when both coordinates
    /// are now known.
    pub(crate) fn merge_location(&mut self, delta: LocationDelta) -> bool {
        self.location.apply(delta);
        self.location.is_defined()
    }

    pub(crate) fn record_label(&mut self, label: String) {
        self.labels.record(label);
    }
}
