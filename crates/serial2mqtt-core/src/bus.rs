//! MQTT bus adapter
//!
//! The serial side runs on blocking threads, so publishing goes through the
//! [`BusPublisher`] trait, implemented for [`AsyncClient`] with the
//! non-blocking `try_publish`. Incoming publishes are pulled off the event
//! loop task and queued as [`InboundMessage`]s for the serial writer.

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

/// Default broker port when the URL carries none
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Requests buffered between the client handle and the event loop
pub const CLIENT_CAPACITY: usize = 10;

/// Inbound messages buffered for the serial writer
pub const INBOUND_QUEUE_CAPACITY: usize = 64;

/// Pause after a connection error before polling again
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Bus errors
#[derive(Error, Debug)]
pub enum BusError {
    /// The client request queue rejected the publish
    #[error("Publish failed: {0}")]
    Publish(#[from] rumqttc::ClientError),

    /// The value could not be serialized
    #[error("Encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Something that can publish to the bus
pub trait BusPublisher: Send + Sync {
    /// Queue one publish; never blocks on the network
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool)
        -> Result<(), BusError>;

    /// Serialize `value` as compact JSON and publish it
    fn publish_json<T: serde::Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BusError>
    where
        Self: Sized,
    {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic, payload, qos, retain)
    }
}

impl BusPublisher for AsyncClient {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BusError> {
        self.try_publish(topic, qos, retain, payload)?;
        Ok(())
    }
}

impl<P: BusPublisher + ?Sized> BusPublisher for std::sync::Arc<P> {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BusError> {
        (**self).publish(topic, payload, qos, retain)
    }
}

/// One message received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full topic as delivered by the broker
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Message with the given topic and payload
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Map a numeric QoS level; anything above 2 is rejected
pub fn qos_from_u8(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    /// Broker host name
    pub host: String,
    /// Broker port
    pub port: u16,
    /// User name; empty connects anonymously
    pub username: String,
    /// Password
    pub password: String,
    /// MQTT client id
    pub client_id: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
}

impl MqttSettings {
    /// Client id with a random suffix, so several bridges can share a broker
    pub fn generate_client_id() -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("serial2mqtt-{}", &id[..8])
    }

    /// Build the rumqttc options
    pub fn to_options(&self) -> MqttOptions {
        let mut opts = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        opts.set_keep_alive(self.keep_alive);
        if !self.username.is_empty() {
            opts.set_credentials(self.username.clone(), self.password.clone());
        }
        opts
    }

    /// Create the client handle and its (not yet polled) event loop
    pub fn connect(&self) -> (AsyncClient, EventLoop) {
        AsyncClient::new(self.to_options(), CLIENT_CAPACITY)
    }
}

/// Queue one inbound message without waiting for the serial writer.
///
/// A full or closed queue drops the message, so a slow serial link never
/// stalls the event loop and its keep-alive pings. Returns whether the
/// message was queued.
pub fn forward_inbound(tx: &mpsc::Sender<InboundMessage>, msg: InboundMessage) -> bool {
    match tx.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(msg)) => {
            warn!(topic = %msg.topic, "inbound queue full, dropping message");
            false
        }
        Err(TrySendError::Closed(msg)) => {
            warn!(topic = %msg.topic, "inbound queue closed, dropping message");
            false
        }
    }
}

/// Drive the event loop on a tokio task.
///
/// On every ConnAck `subscription` is (re)subscribed at QoS 1, so a broker
/// restart does not lose the subscription. Incoming publishes are forwarded
/// to `inbound` in arrival order.
pub fn spawn_event_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    subscription: Option<String>,
    inbound: Option<mpsc::Sender<InboundMessage>>,
    span: Span,
) -> JoinHandle<()> {
    let task = async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    if let Some(topic) = &subscription {
                        match client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                            Ok(()) => info!(topic = %topic, "subscribed"),
                            Err(e) => warn!(topic = %topic, error = %e, "subscribe failed"),
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    debug!(topic = %p.topic, len = p.payload.len(), "message received");
                    if let Some(tx) = &inbound {
                        forward_inbound(tx, InboundMessage::new(p.topic, p.payload.to_vec()));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    };
    tokio::spawn(task.instrument(span))
}
