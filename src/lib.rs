//! geogdo-agent library
//!
//! Geofence-driven garage door agent fed by TeslaMate MQTT telemetry.
//! Exposes modules for integration testing and the binary.

pub mod domain;
pub mod error;
pub mod infra;
pub mod io;
pub mod services;

pub use error::AgentError;
