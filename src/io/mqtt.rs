//! MQTT connection manager for TeslaMate telemetry
//!
//! Owns the rumqttc event loop. Every CONNACK starts a fresh subscription
//! pass over all tracker topics; every PUBLISH is handed to the router via
//! `try_send` so the event loop never waits on downstream work.

use crate::domain::InboundMessage;
use crate::error::AgentError;
use crate::infra::config::Config;
use crate::infra::metrics::{DropReason, Metrics};
use crate::io::subscribe::{subscribe_all, RetryPolicy, SubscribeError, TopicSubscriber};
use crate::services::shutdown::BrokerSession;
use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubAck,
    SubscribeReasonCode, TlsConfiguration, Transport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Request queue depth between the client handle and the event loop
const REQUEST_CAPACITY: usize = 100;

/// Source of broker events. `EventLoop` in production.
#[async_trait]
pub trait EventSource: Send {
    async fn poll(&mut self) -> Result<Event, ConnectionError>;
}

#[async_trait]
impl EventSource for EventLoop {
    async fn poll(&mut self) -> Result<Event, ConnectionError> {
        EventLoop::poll(self).await
    }
}

/// Subscribe traffic seen by the event loop
#[derive(Debug)]
pub enum SubscribeEvent {
    /// SUBSCRIBE written with this packet id
    Sent(u16),
    Acked(SubAck),
}

/// Subscribes through the shared client, one topic at a time. The packet id
/// of the first SUBSCRIBE sent after the request identifies its SUBACK.
pub struct MqttSubscriber {
    client: AsyncClient,
    events: Mutex<mpsc::UnboundedReceiver<SubscribeEvent>>,
    ack_timeout: Duration,
}

impl MqttSubscriber {
    pub fn new(
        client: AsyncClient,
        events: mpsc::UnboundedReceiver<SubscribeEvent>,
        ack_timeout: Duration,
    ) -> Self {
        Self { client, events: Mutex::new(events), ack_timeout }
    }
}

#[async_trait]
impl TopicSubscriber for MqttSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<(), SubscribeError> {
        let mut events = self.events.lock().await;
        // Left over from a superseded pass
        while events.try_recv().is_ok() {}

        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| SubscribeError::Request(e.to_string()))?;

        let deadline = tokio::time::Instant::now() + self.ack_timeout;
        let mut pkid = None;
        loop {
            let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                Err(_) => return Err(SubscribeError::Timeout(self.ack_timeout)),
                Ok(None) => return Err(SubscribeError::ConnectionClosed),
                Ok(Some(event)) => event,
            };
            match event {
                SubscribeEvent::Sent(id) if pkid.is_none() => pkid = Some(id),
                SubscribeEvent::Acked(ack) if Some(ack.pkid) == pkid => {
                    let accepted = ack
                        .return_codes
                        .iter()
                        .all(|code| matches!(code, SubscribeReasonCode::Success(_)));
                    return if accepted { Ok(()) } else { Err(SubscribeError::Rejected) };
                }
                other => debug!(topic, event = ?other, "mqtt_subscribe_event_ignored"),
            }
        }
    }
}

/// Cloneable handle used by the shutdown coordinator
#[derive(Clone)]
pub struct MqttSession {
    client: AsyncClient,
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn disconnect(&self) -> anyhow::Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

pub struct ConnectionManager {
    events: Box<dyn EventSource>,
    subscriber: Arc<dyn TopicSubscriber>,
    subscribe_events: mpsc::UnboundedSender<SubscribeEvent>,
    topics: Arc<Vec<String>>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    ready_tx: Arc<watch::Sender<bool>>,
}

impl ConnectionManager {
    /// Connect and wait for the first CONNACK. Any failure before that is fatal.
    pub async fn connect(
        config: &Config,
        topics: Vec<String>,
        metrics: Arc<Metrics>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Result<(Self, MqttSession), AgentError> {
        let (client, mut eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
        eventloop.network_options.set_connection_timeout(config.mqtt_ack_timeout_secs());

        info!(
            host = %config.mqtt_host(),
            port = %config.mqtt_port(),
            tls = %config.mqtt_use_tls(),
            credentials = %config.mqtt_username().is_some(),
            "mqtt_connecting"
        );

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(e) => return Err(AgentError::Connect(e.to_string())),
            }
        }
        metrics.record_connection();
        info!("mqtt_connected");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let subscriber = MqttSubscriber::new(
            client.clone(),
            events_rx,
            Duration::from_secs(config.mqtt_ack_timeout_secs()),
        );
        let manager = Self::new(
            Box::new(eventloop),
            Arc::new(subscriber),
            events_tx,
            topics,
            RetryPolicy::from_config(config),
            metrics,
            inbound_tx,
        );
        Ok((manager, MqttSession { client }))
    }

    /// Manager over an already connected event source
    pub fn new(
        events: Box<dyn EventSource>,
        subscriber: Arc<dyn TopicSubscriber>,
        subscribe_events: mpsc::UnboundedSender<SubscribeEvent>,
        topics: Vec<String>,
        policy: RetryPolicy,
        metrics: Arc<Metrics>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            events,
            subscriber,
            subscribe_events,
            topics: Arc::new(topics),
            policy,
            metrics,
            inbound_tx,
            ready_tx: Arc::new(ready_tx),
        }
    }

    /// True once every topic of the current connection is subscribed
    pub fn ready(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Drive the connection until shutdown completes or a subscription pass
    /// gives up. Reconnects after errors with a one second pause.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), AgentError> {
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<AgentError>(1);
        // The first CONNACK was consumed by connect()
        let mut pass = Some(self.spawn_subscription_pass(fatal_tx.clone()));
        let mut draining = false;
        let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

        loop {
            tokio::select! {
                changed = shutdown.changed(), if !draining => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("mqtt_draining");
                        draining = true;
                        if let Some(handle) = pass.take() {
                            handle.abort();
                        }
                    }
                }
                Some(err) = fatal_rx.recv() => {
                    error!(error = %err, "mqtt_subscription_failed");
                    return Err(err);
                }
                result = self.events.poll() => {
                    match result {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let message = InboundMessage::new(publish.topic, publish.payload);
                            if !forward_publish(&self.inbound_tx, &self.metrics, message, &mut last_drop_warn) {
                                info!("inbound_channel_closed");
                                return Ok(());
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            self.metrics.record_connection();
                            self.ready_tx.send_if_modified(|ready| std::mem::replace(ready, false));
                            info!("mqtt_reconnected");
                            if let Some(handle) = pass.take() {
                                handle.abort();
                            }
                            if !draining {
                                pass = Some(self.spawn_subscription_pass(fatal_tx.clone()));
                            }
                        }
                        Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                            let _ = self.subscribe_events.send(SubscribeEvent::Sent(pkid));
                        }
                        Ok(Event::Incoming(Packet::SubAck(ack))) => {
                            debug!(pkid = %ack.pkid, "mqtt_suback");
                            let _ = self.subscribe_events.send(SubscribeEvent::Acked(ack));
                        }
                        Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                            info!("mqtt_disconnected");
                            return Ok(());
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if draining {
                                return Ok(());
                            }
                            self.ready_tx.send_if_modified(|ready| std::mem::replace(ready, false));
                            error!(error = %e, "mqtt_error");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    fn spawn_subscription_pass(&self, fatal_tx: mpsc::Sender<AgentError>) -> JoinHandle<()> {
        let subscriber = self.subscriber.clone();
        let topics = self.topics.clone();
        let policy = self.policy;
        let metrics = self.metrics.clone();
        let ready_tx = self.ready_tx.clone();

        tokio::spawn(async move {
            match subscribe_all(subscriber.as_ref(), &topics, policy, &metrics).await {
                Ok(()) => {
                    ready_tx.send_replace(true);
                }
                Err(e) => {
                    let _ = fatal_tx.send(e).await;
                }
            }
        })
    }
}

/// Hand a publish to the router without blocking.
/// Returns false once the router side is gone.
fn forward_publish(
    inbound_tx: &mpsc::Sender<InboundMessage>,
    metrics: &Metrics,
    message: InboundMessage,
    last_drop_warn: &mut Instant,
) -> bool {
    metrics.record_message_received();
    match inbound_tx.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            metrics.record_dropped(DropReason::InboundFull);
            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                warn!(topic = %message.topic, "inbound_message_dropped: channel full");
                *last_drop_warn = Instant::now();
            }
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

fn mqtt_options(config: &Config) -> MqttOptions {
    let client_id = config
        .mqtt_client_id()
        .map(str::to_string)
        .unwrap_or_else(|| format!("geogdo-{}", Uuid::now_v7()));

    let mut options = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    options.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs()));
    options.set_clean_session(true);

    if let Some(username) = config.mqtt_username() {
        options.set_credentials(username, config.mqtt_password().unwrap_or_default());
    }

    if config.mqtt_use_tls() {
        if config.mqtt_skip_tls_verify() {
            warn!("mqtt_tls_verification_disabled");
            options.set_transport(Transport::tls_with_config(insecure_tls()));
        } else {
            options.set_transport(Transport::tls_with_default_config());
        }
    }

    options
}

fn insecure_tls() -> TlsConfiguration {
    let client_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::SkipServerVerification))
        .with_no_client_auth();
    TlsConfiguration::Rustls(Arc::new(client_config))
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    /// Accepts any server certificate
    #[derive(Debug)]
    pub(super) struct SkipServerVerification;

    impl ServerCertVerifier for SkipServerVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
