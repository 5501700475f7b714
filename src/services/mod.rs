//! Services - telemetry routing, per-tracker state and evaluation
//!
//! - `router` - single loop resolving inbound messages to trackers
//! - `tracker_worker` - per-tracker location merger
//! - `fleet` - immutable tracker registry
//! - `dispatch` - evaluation hand-off
//! - `evaluator` - geofence label transition rules
//! - `shutdown` - ordered shutdown

pub mod dispatch;
pub mod evaluator;
pub mod fleet;
pub mod router;
pub mod shutdown;
pub mod tracker_worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatch::{Dispatcher, Evaluator};
pub use evaluator::LabelTransitionEvaluator;
pub use fleet::Fleet;
pub use router::Router;
pub use shutdown::{wait_for_signal, BrokerSession, ShutdownCoordinator};
pub use tracker_worker::TrackerWorker;
