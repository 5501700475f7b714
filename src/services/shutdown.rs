//! Shutdown coordination
//!
//! Sequence on SIGINT/SIGTERM:
//! 1. flip the shutdown watch so the router and connection loop stop taking work
//! 2. disconnect from the broker, bounded by the grace period
//! 3. tell every door actuator to stop, each bounded by the grace period
//! 4. wait a fixed quiescence period
//!
//! In-flight evaluations are neither cancelled nor awaited. Every failure
//! here is logged and swallowed.

use crate::domain::Door;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

/// Broker session that can be closed at shutdown
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn disconnect(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct ShutdownCoordinator {
    disconnect_grace: Duration,
    quiescence: Duration,
}

impl ShutdownCoordinator {
    pub fn new(disconnect_grace: Duration, quiescence: Duration) -> Self {
        Self { disconnect_grace, quiescence }
    }

    pub async fn run(
        &self,
        shutdown_tx: &watch::Sender<bool>,
        broker: &dyn BrokerSession,
        doors: &[Arc<Door>],
    ) {
        info!("shutdown_started");
        shutdown_tx.send_replace(true);

        match timeout(self.disconnect_grace, broker.disconnect()).await {
            Ok(Ok(())) => info!("broker_disconnected"),
            Ok(Err(e)) => warn!(error = %e, "broker_disconnect_failed"),
            Err(_) => warn!(grace_ms = %self.disconnect_grace.as_millis(), "broker_disconnect_timeout"),
        }

        for door in doors {
            match timeout(self.disconnect_grace, door.opener().process_shutdown()).await {
                Ok(Ok(())) => info!(door = %door.name(), "door_opener_stopped"),
                Ok(Err(e)) => warn!(door = %door.name(), error = %e, "door_opener_stop_failed"),
                Err(_) => warn!(door = %door.name(), "door_opener_stop_timeout"),
            }
        }

        sleep(self.quiescence).await;
        info!("shutdown_complete");
    }
}

/// Resolve on ctrl-c, or SIGTERM on unix
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_unavailable");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }

    info!("shutdown_signal_received");
}
