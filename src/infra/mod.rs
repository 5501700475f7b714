//! Infrastructure - configuration, metrics and logging
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (TOML loading, env overrides, validation)
//! - `metrics` - Lock-free metrics collection
//! - `logging` - tracing subscriber setup

pub mod config;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use config::{Config, DoorConfig, OpenerConfig};
pub use metrics::{DropReason, Metrics};
