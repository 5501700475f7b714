//! geogdo-agent - geofence-driven garage door agent
//!
//! Subscribes to TeslaMate telemetry over MQTT and opens or closes garage
//! doors when a vehicle's geofence label changes.
//!
//! Module structure:
//! - `domain/` - trackers, doors, telemetry types
//! - `io/` - broker connection, subscription retry, door actuators
//! - `services/` - router, tracker workers, evaluation, shutdown
//! - `infra/` - config, metrics, logging

use anyhow::Context;
use clap::Parser;
use geogdo_agent::infra::{logging, Config, Metrics};
use geogdo_agent::io::{build_doors, ConnectionManager};
use geogdo_agent::services::{
    wait_for_signal, Dispatcher, Fleet, LabelTransitionEvaluator, Router, ShutdownCoordinator,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Geofence-triggered garage door agent
#[derive(Parser, Debug)]
#[command(
    name = "geogdo-agent",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"),
    about
)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let args = Args::parse();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "geogdo-agent starting");

    let config_path = Config::resolve_config_path(args.config.as_deref())
        .context("no configuration file given: use --config or CONFIG_FILE")?;
    let config = Config::load(&config_path)?;

    info!(
        config_file = %config.config_file(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        tls = %config.mqtt_use_tls(),
        doors = %config.doors().len(),
        testing = %config.testing(),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let evaluator = Arc::new(LabelTransitionEvaluator::new(config.testing()));
    let dispatcher = Dispatcher::new(evaluator, metrics.clone());

    let doors = build_doors(&config)?;
    let (fleet, workers) = Fleet::build(doors, |id| config.tracker_topics(id), dispatcher);
    let fleet = Arc::new(fleet);
    info!(trackers = %fleet.tracker_count(), "fleet_ready");

    for worker in workers {
        tokio::spawn(worker.run());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity());

    let (connection, session) =
        ConnectionManager::connect(&config, fleet.subscription_topics(), metrics.clone(), inbound_tx)
            .await
            .inspect_err(|e| error!(error = %e, "mqtt_connect_failed"))?;

    // Readiness follows the subscription state of the current connection
    let mut ready = connection.ready();
    tokio::spawn(async move {
        while ready.changed().await.is_ok() {
            if *ready.borrow_and_update() {
                info!("agent_ready");
            } else {
                warn!("agent_not_ready: resubscribing");
            }
        }
    });

    let mut connection_task = tokio::spawn(connection.run(shutdown_rx.clone()));

    let router = Router::new(fleet.clone(), metrics.clone());
    let router_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        router.run(inbound_rx, router_shutdown).await;
    });

    // Periodic metrics summary
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let coordinator = ShutdownCoordinator::new(
        Duration::from_millis(config.disconnect_grace_ms()),
        Duration::from_millis(config.quiescence_ms()),
    );

    tokio::select! {
        _ = wait_for_signal() => {
            coordinator.run(&shutdown_tx, &session, fleet.doors()).await;
        }
        result = &mut connection_task => {
            match result {
                Ok(Ok(())) => info!("mqtt_connection_closed"),
                Ok(Err(e)) => {
                    error!(error = %e, "fatal_error");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error = %e, "mqtt_task_failed");
                    return Err(e.into());
                }
            }
        }
    }

    info!("geogdo-agent shutdown complete");
    Ok(())
}
