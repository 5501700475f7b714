//! Door control by publishing commands to an MQTT topic
//!
//! Uses its own client so command traffic does not share the request
//! queue of the telemetry connection.

use crate::domain::{DoorAction, DoorOpener, OpenerError};
use crate::infra::config::{Config, MqttOpenerConfig};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct MqttOpener {
    client: AsyncClient,
    topic: String,
    open_payload: String,
    close_payload: String,
    stopped: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl MqttOpener {
    /// Connection settings not given for the opener fall back to the
    /// telemetry broker's.
    pub fn new(config: &MqttOpenerConfig, telemetry: &Config) -> Self {
        let host = config.host.as_deref().unwrap_or(telemetry.mqtt_host());
        let port = config.port.unwrap_or(telemetry.mqtt_port());
        let client_id = format!("geogdo-opener-{}", Uuid::now_v7());

        let mut mqttoptions = MqttOptions::new(client_id, host, port);
        mqttoptions.set_keep_alive(Duration::from_secs(telemetry.mqtt_keep_alive_secs()));
        mqttoptions.set_clean_session(true);

        let username = config.username.as_deref().or(telemetry.mqtt_username());
        let password = config.password.as_deref().or(telemetry.mqtt_password());
        if let Some(username) = username {
            mqttoptions.set_credentials(username, password.unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        debug!("mqtt_opener_eventloop_stopped");
                        return;
                    }
                    result = eventloop.poll() => match result {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => info!("mqtt_opener_connected"),
                        Ok(Event::Incoming(Packet::PubAck(ack))) => debug!(pkid = %ack.pkid, "mqtt_opener_puback"),
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "mqtt_opener_error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        });

        Self {
            client,
            topic: config.topic.clone(),
            open_payload: config.open_payload.clone(),
            close_payload: config.close_payload.clone(),
            stopped: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    fn payload(&self, action: DoorAction) -> &str {
        match action {
            DoorAction::Open => &self.open_payload,
            DoorAction::Close => &self.close_payload,
        }
    }
}

#[async_trait]
impl DoorOpener for MqttOpener {
    fn kind(&self) -> &'static str {
        "mqtt"
    }

    async fn set_state(&self, action: DoorAction) -> Result<(), OpenerError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(OpenerError::ShutDown);
        }

        // QoS 1: a command lost during a reconnect is retried by the client
        self.client
            .try_publish(&self.topic, QoS::AtLeastOnce, false, self.payload(action).as_bytes().to_vec())
            .map_err(|e| OpenerError::Publish(e.to_string()))?;

        info!(topic = %self.topic, action = %action, "mqtt_opener_published");
        Ok(())
    }

    async fn process_shutdown(&self) -> Result<(), OpenerError> {
        self.stopped.store(true, Ordering::Release);
        let result = self.client.try_disconnect().map_err(|e| OpenerError::Publish(e.to_string()));
        // Give the event loop a moment to flush the DISCONNECT
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.shutdown_tx.send_replace(true);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opener_config() -> MqttOpenerConfig {
        MqttOpenerConfig {
            // Nothing listens here; requests only need to be queued
            host: Some("127.0.0.1".to_string()),
            port: Some(1),
            username: None,
            password: None,
            topic: "garage/door/set".to_string(),
            open_payload: "OPEN".to_string(),
            close_payload: "CLOSE".to_string(),
        }
    }

    #[tokio::test]
    async fn test_payload_selection() {
        let opener = MqttOpener::new(&opener_config(), &Config::default());
        assert_eq!(opener.payload(DoorAction::Open), "OPEN");
        assert_eq!(opener.payload(DoorAction::Close), "CLOSE");
    }

    #[tokio::test]
    async fn test_set_state_queues_publish() {
        let opener = MqttOpener::new(&opener_config(), &Config::default());
        assert!(opener.set_state(DoorAction::Open).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_after_shutdown() {
        let opener = MqttOpener::new(&opener_config(), &Config::default());
        let _ = opener.process_shutdown().await;
        assert!(matches!(opener.set_state(DoorAction::Close).await, Err(OpenerError::ShutDown)));
    }
}
