//! Shared types for the telemetry pipeline

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Newtype wrapper for tracker (vehicle) IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackerId(pub u32);

impl std::fmt::Display for TrackerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a door in the fleet, assigned in configuration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct DoorId(pub usize);

impl std::fmt::Display for DoorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Field carried by a telemetry topic (segment 3 of the topic path)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Geofence,
    Latitude,
    Longitude,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Geofence => "geofence",
            FieldKind::Latitude => "latitude",
            FieldKind::Longitude => "longitude",
        }
    }
}

impl std::str::FromStr for FieldKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "geofence" => Ok(FieldKind::Geofence),
            "latitude" => Ok(FieldKind::Latitude),
            "longitude" => Ok(FieldKind::Longitude),
            _ => Err(()),
        }
    }
}

/// Why a topic could not be routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// Fewer than four `/`-separated segments
    TooShort,
    /// Segment 2 is not an integer
    InvalidTrackerId(String),
    /// Segment 3 is not a known field
    UnknownField(String),
}

impl std::fmt::Display for TopicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopicError::TooShort => write!(f, "topic has fewer than 4 segments"),
            TopicError::InvalidTrackerId(s) => write!(f, "invalid tracker id segment '{}'", s),
            TopicError::UnknownField(s) => write!(f, "unknown field segment '{}'", s),
        }
    }
}

/// Positional view of a telemetry topic: `<prefix>/<prefix>/<tracker_id>/<field>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicPath {
    pub tracker_id: TrackerId,
    pub field: FieldKind,
}

impl TopicPath {
    /// Parse the fixed positional layout. Segments after the fourth are ignored.
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let mut segments = topic.split('/');
        let (Some(_), Some(_), Some(id), Some(field)) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(TopicError::TooShort);
        };

        let tracker_id = id
            .parse::<u32>()
            .map(TrackerId)
            .map_err(|_| TopicError::InvalidTrackerId(id.to_string()))?;
        let field = field.parse().map_err(|_| TopicError::UnknownField(field.to_string()))?;

        Ok(Self { tracker_id, field })
    }
}

/// A message received from the broker, forwarded untouched to the router
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}

/// Latest known position of a tracker. Each coordinate is independently
/// optional, so 0.0 is a real coordinate rather than "no data".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Location {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

impl Location {
    pub fn is_defined(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }

    /// Overwrite only the coordinate carried by `delta`
    pub fn apply(&mut self, delta: LocationDelta) {
        match delta {
            LocationDelta::Latitude(lat) => self.lat = Some(lat),
            LocationDelta::Longitude(lng) => self.lng = Some(lng),
        }
    }
}

/// Partial location update carrying exactly one coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationDelta {
    Latitude(f64),
    Longitude(f64),
}

/// Previous/current geofence label pair
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeofenceLabels {
    pub previous: String,
    pub current: String,
}

impl GeofenceLabels {
    /// Shift current into previous and store the new label
    pub fn record(&mut self, label: String) {
        self.previous = std::mem::replace(&mut self.current, label);
    }

    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// Work item queued on a tracker's channel
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    Label(String),
    Location(LocationDelta),
}

/// What caused an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationTrigger {
    LabelChanged,
    LocationUpdated,
}

impl EvaluationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationTrigger::LabelChanged => "label",
            EvaluationTrigger::LocationUpdated => "location",
        }
    }
}

/// Command for a door actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorAction {
    Open,
    Close,
}

impl DoorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorAction::Open => "open",
            DoorAction::Close => "close",
        }
    }
}

impl std::fmt::Display for DoorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
