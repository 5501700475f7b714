//! Fatal error conditions
//!
//! Anything that reaches `main` as an `AgentError` ends the process.
//! Dropped messages and actuator failures are logged where they happen
//! and never become an `AgentError`.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    #[error("could not connect to mqtt broker: {0}")]
    Connect(String),

    #[error("unable to subscribe to topic {topic} after {attempts} attempts")]
    SubscriptionExhausted { topic: String, attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}
