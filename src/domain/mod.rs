//! Domain models - trackers, doors and telemetry types
//!
//! This module contains the canonical data types used throughout the system:
//! - `TrackerState` - per-vehicle location and geofence label history
//! - `Door` - garage door owning trackers and an actuator
//! - `TopicPath` - positional decoding of telemetry topics
//! - `LocationDelta` / `TrackerUpdate` - work items for tracker workers

pub mod door;
pub mod tracker;
pub mod types;

pub use door::{Door, DoorOpener, LabelTrigger, OpenerError};
pub use tracker::{TrackerState, TrackerTopics};
pub use types::{
    DoorAction, DoorId, EvaluationTrigger, FieldKind, InboundMessage, Location, LocationDelta,
    TopicPath, TrackerId, TrackerUpdate,
};
