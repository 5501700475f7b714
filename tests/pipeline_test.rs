//! End-to-end routing: config -> fleet -> router -> workers -> evaluator

use async_trait::async_trait;
use geogdo_agent::domain::{Door, DoorAction, EvaluationTrigger, InboundMessage, TrackerId, TrackerState};
use geogdo_agent::infra::{Config, Metrics};
use geogdo_agent::io::build_doors;
use geogdo_agent::services::{Dispatcher, Evaluator, Fleet, LabelTransitionEvaluator, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

const CONFIG: &str = r#"
[mqtt]
host = "localhost"

[[doors]]
name = "garage"
geofence.close = { from = "home", to = "not_home" }
geofence.open = { from = "not_home", to = "home" }
opener = { type = "none" }
trackers = [{ id = 7 }, { id = 8 }]
"#;

/// Forwards to the real evaluator, then reports what it saw
struct Probe {
    inner: LabelTransitionEvaluator,
    tx: mpsc::UnboundedSender<Seen>,
}

#[async_trait]
impl Evaluator for Probe {
    async fn evaluate(&self, tracker: &TrackerState, door: &Door, trigger: EvaluationTrigger) {
        self.inner.evaluate(tracker, door, trigger).await;
        let labels = tracker.labels();
        let _ = self.tx.send((tracker.id(), trigger, labels.previous.clone(), labels.current.clone()));
    }
}

type Seen = (TrackerId, EvaluationTrigger, String, String);

async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_messages_flow_to_evaluator() {
    let config = Config::from_toml_str(CONFIG, "inline").unwrap();
    let metrics = Arc::new(Metrics::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let probe = Arc::new(Probe { inner: LabelTransitionEvaluator::new(true), tx });

    let doors = build_doors(&config).unwrap();
    let (fleet, workers) =
        Fleet::build(doors, |id| config.tracker_topics(id), Dispatcher::new(probe, metrics.clone()));
    let fleet = Arc::new(fleet);
    for worker in workers {
        tokio::spawn(worker.run());
    }

    assert_eq!(
        fleet.subscription_topics(),
        vec![
            "teslamate/cars/7/geofence",
            "teslamate/cars/7/latitude",
            "teslamate/cars/7/longitude",
            "teslamate/cars/8/geofence",
            "teslamate/cars/8/latitude",
            "teslamate/cars/8/longitude",
        ]
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let router = Router::new(fleet.clone(), metrics.clone());
    let router_task = tokio::spawn(async move { router.run(inbound_rx, shutdown_rx).await });

    inbound_tx.send(InboundMessage::new("teslamate/cars/42/geofence", "home")).await.unwrap();
    inbound_tx.send(InboundMessage::new("teslamate/cars/7/geofence", "home")).await.unwrap();
    inbound_tx.send(InboundMessage::new("teslamate/cars/7/geofence", "not_home")).await.unwrap();

    let first = next(&mut rx).await;
    assert_eq!(first, (TrackerId(7), EvaluationTrigger::LabelChanged, String::new(), "home".to_string()));
    let second = next(&mut rx).await;
    assert_eq!(second, (TrackerId(7), EvaluationTrigger::LabelChanged, "home".to_string(), "not_home".to_string()));

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), router_task).await.unwrap().unwrap();

    assert_eq!(metrics.updates_forwarded(), 2);

    // Testing mode: nothing is sent, but the opener stays usable
    assert!(fleet.doors()[0].opener().set_state(DoorAction::Close).await.is_ok());
}
