//! Topic subscription with bounded retry
//!
//! Each topic gets `attempts` tries with a fixed `interval` between them.
//! Running out of attempts on any topic is fatal for the process.

use crate::error::AgentError;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("subscribe request not queued: {0}")]
    Request(String),

    #[error("no suback within {0:?}")]
    Timeout(Duration),

    #[error("broker rejected subscription")]
    Rejected,

    #[error("connection closed")]
    ConnectionClosed,
}

/// Fixed-interval retry, no backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per topic, including the first
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 5, interval: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.subscribe_attempts(),
            interval: Duration::from_secs(config.subscribe_interval_secs()),
        }
    }
}

#[async_trait]
pub trait TopicSubscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<(), SubscribeError>;
}

/// Subscribe one topic. Returns the number of failed attempts before success.
pub async fn subscribe_with_retry(
    subscriber: &dyn TopicSubscriber,
    topic: &str,
    policy: RetryPolicy,
    metrics: &Metrics,
) -> Result<u32, AgentError> {
    let mut failures = 0;

    for attempt in 1..=policy.attempts {
        match subscriber.subscribe(topic).await {
            Ok(()) => {
                debug!(topic = %topic, attempt = %attempt, "topic_subscribed");
                return Ok(failures);
            }
            Err(e) => {
                failures += 1;
                metrics.record_subscribe_failure();
                warn!(topic = %topic, attempt = %attempt, max_attempts = %policy.attempts, error = %e, "subscribe_failed");
                if attempt < policy.attempts {
                    sleep(policy.interval).await;
                }
            }
        }
    }

    Err(AgentError::SubscriptionExhausted { topic: topic.to_string(), attempts: policy.attempts })
}

/// Subscribe every topic in order, stopping at the first exhausted one
pub async fn subscribe_all(
    subscriber: &dyn TopicSubscriber,
    topics: &[String],
    policy: RetryPolicy,
    metrics: &Metrics,
) -> Result<(), AgentError> {
    for topic in topics {
        subscribe_with_retry(subscriber, topic, policy, metrics).await?;
    }
    info!(topics = %topics.len(), "subscriptions_established");
    Ok(())
}
