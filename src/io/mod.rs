//! IO modules - external system interfaces
//!
//! - `mqtt` - telemetry broker connection and subscriptions
//! - `subscribe` - subscription retry policy
//! - `http_opener` / `mqtt_opener` - door actuators
//! - `opener` - actuator selection from config

pub mod http_opener;
pub mod mqtt;
pub mod mqtt_opener;
pub mod opener;
pub mod subscribe;

pub use mqtt::{ConnectionManager, MqttSession};
pub use opener::{build_doors, build_opener, NoopOpener};
pub use subscribe::RetryPolicy;
