//! EP-Solar Tracer telemetry
//!
//! Polls the charge controller on a fixed period and publishes every sensor
//! report it answers with. The session runs inside the reconnect supervisor:
//! channel faults end the session, everything else is logged and skipped.

mod sensor;

pub use sensor::{SensorReading, SENSOR_PAYLOAD_LEN};

use rumqttc::QoS;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn, Span};

use crate::bus::{BusError, BusPublisher};
use crate::protocol::commands::query_frame;
use crate::protocol::{
    ByteChannel, ChannelWriter, Command, DecodeOutcome, Frame, FrameDecoder, ProtocolError,
};
use crate::schedule::{now_ms, Scheduler};

/// Published telemetry document: frame header plus the decoded reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TracerMessage {
    /// Responding controller
    pub controller_id: u8,
    /// Command code, `0xA0`
    pub command: u8,
    /// Payload length from the header
    pub data_length: u8,
    /// Footer CRC as received
    pub crc: u16,
    /// Absent when the payload is too short to decode
    #[serde(flatten)]
    pub reading: Option<SensorReading>,
}

impl TracerMessage {
    /// Build the message for a sensor data frame; other commands yield `None`
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.kind() != Command::SensorData {
            return None;
        }
        Some(Self {
            controller_id: frame.controller_id,
            command: frame.command,
            data_length: frame.payload_length(),
            crc: frame.crc,
            reading: SensorReading::parse(frame.payload()),
        })
    }
}

/// Settings of the telemetry loop
#[derive(Debug, Clone, PartialEq)]
pub struct TracerConfig {
    /// Topic readings are published to
    pub read_topic: String,
    /// Topic of the `{"online": ...}` availability message
    pub online_topic: String,
    /// Publish QoS
    pub qos: QoS,
    /// Publish retain flag
    pub retain: bool,
    /// Query period; 0 disables querying
    pub query_period_secs: u64,
    /// Sync scan budget of the decoder
    pub max_sync_scan: usize,
}

/// Publish the availability document, e.g. `{"online": true}`
pub fn publish_availability<P: BusPublisher>(
    publisher: &P,
    config: &TracerConfig,
    online: bool,
) -> Result<(), BusError> {
    let payload = format!("{{\"online\": {}}}", online);
    publisher.publish(&config.online_topic, payload.into_bytes(), config.qos, config.retain)
}

/// Clock returning wall time in milliseconds
pub type Clock = Box<dyn Fn() -> i64 + Send>;

/// The telemetry loop for one open link
pub struct TracerSession<P: BusPublisher> {
    decoder: FrameDecoder,
    scheduler: Scheduler,
    publisher: P,
    read_topic: String,
    qos: QoS,
    retain: bool,
    query: Vec<u8>,
    clock: Clock,
    shutdown: Arc<AtomicBool>,
    published: u64,
    span: Span,
}

impl<P: BusPublisher> TracerSession<P> {
    /// Create a session using the wall clock
    pub fn new(config: &TracerConfig, publisher: P, span: Span) -> Result<Self, ProtocolError> {
        Self::with_clock(config, publisher, Box::new(now_ms), span)
    }

    /// Create a session with an explicit clock; the first query is due at
    /// the clock's current time
    pub fn with_clock(
        config: &TracerConfig,
        publisher: P,
        clock: Clock,
        span: Span,
    ) -> Result<Self, ProtocolError> {
        let query = query_frame()?.to_bytes();
        let scheduler = Scheduler::from_period_secs(config.query_period_secs, clock());

        Ok(Self {
            decoder: FrameDecoder::new(config.max_sync_scan),
            scheduler,
            publisher,
            read_topic: config.read_topic.clone(),
            qos: config.qos,
            retain: config.retain,
            query,
            clock,
            shutdown: Arc::new(AtomicBool::new(false)),
            published: 0,
            span,
        })
    }

    /// Flag that ends [`run`](Self::run) cleanly once set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Number of readings published so far
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Scheduler state, for inspection
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// One iteration: send the query when due, then decode one frame.
    ///
    /// Returns the published message, if any. Only channel faults are errors;
    /// a failed publish is logged and the reading dropped.
    pub fn step(
        &mut self,
        channel: &mut dyn ByteChannel,
        writer: &ChannelWriter,
    ) -> Result<Option<TracerMessage>, ProtocolError> {
        let _enter = self.span.enter();

        if self.scheduler.poll((self.clock)()) {
            writer.write_all(&self.query)?;
            debug!(next_ms = self.scheduler.next_fire_ms(), "query sent");
        }

        let frame = match self.decoder.decode_frame(channel)? {
            DecodeOutcome::Frame(frame) => frame,
            DecodeOutcome::Rejected(reject) => {
                trace!(reason = %reject, "no frame");
                return Ok(None);
            }
        };

        let Some(message) = TracerMessage::from_frame(&frame) else {
            debug!(command = frame.command, len = frame.payload().len(), "ignoring frame");
            return Ok(None);
        };
        if message.reading.is_none() {
            debug!(len = frame.payload().len(), "sensor payload too short");
        }

        match self
            .publisher
            .publish_json(&self.read_topic, &message, self.qos, self.retain)
        {
            Ok(()) => {
                self.published += 1;
                info!(topic = %self.read_topic, "published reading");
                Ok(Some(message))
            }
            Err(e) => {
                warn!(topic = %self.read_topic, error = %e, "publish failed");
                Ok(None)
            }
        }
    }

    /// Loop [`step`](Self::step) until a channel fault or shutdown
    pub fn run(
        &mut self,
        channel: &mut dyn ByteChannel,
        writer: &ChannelWriter,
    ) -> Result<(), ProtocolError> {
        while !self.shutdown.load(Ordering::Relaxed) {
            self.step(channel, writer)?;
        }
        Ok(())
    }
}
