//! Serial line ↔ MQTT bridge
//!
//! Forwards newline-delimited JSON from a microcontroller to the bus and bus
//! messages back to the microcontroller. The serial thread runs
//! [`LineBridge::run_session`] under the reconnect supervisor; a second
//! thread drains the inbound queue with [`LineBridge::serve_inbound`]. Both
//! share the bridge through an `Arc`.

mod line_reader;
mod message;

pub use line_reader::{trim_line_ending, LineReader, DEFAULT_MAX_LINE_LENGTH};
pub use message::{
    translate_inbound, translate_line, BridgeMessage, Direction, MsgValue, SpacedFormatter,
    DEFAULT_SUBTOPIC, LOG_SUBTOPIC,
};

use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Span};

use crate::bus::{BusPublisher, InboundMessage};
use crate::protocol::{ByteChannel, ChannelWriter, ProtocolError};

/// Settings of the line bridge
#[derive(Debug, Clone, PartialEq)]
pub struct LineBridgeConfig {
    /// Prefix of outbound topics, without trailing `/`
    pub publish_prefix: String,
    /// Prefix of subscribed topics, without trailing `/#`
    pub subscribe_prefix: String,
    /// QoS used when a line names none
    pub default_qos: QoS,
    /// Retain flag used when a line names none
    pub default_retain: bool,
    /// Longest line forwarded, in bytes
    pub max_line_length: usize,
}

impl LineBridgeConfig {
    /// Topic filter to subscribe to
    pub fn subscription(&self) -> String {
        format!("{}/#", self.subscribe_prefix)
    }
}

/// Bidirectional line bridge
pub struct LineBridge<P: BusPublisher> {
    config: LineBridgeConfig,
    publisher: P,
    shutdown: AtomicBool,
    span: Span,
}

impl<P: BusPublisher> LineBridge<P> {
    /// Bridge publishing through `publisher`, logging under `span`
    pub fn new(config: LineBridgeConfig, publisher: P, span: Span) -> Self {
        Self {
            config,
            publisher,
            shutdown: AtomicBool::new(false),
            span,
        }
    }

    /// Active settings
    pub fn config(&self) -> &LineBridgeConfig {
        &self.config
    }

    /// Make [`run_session`](Self::run_session) return cleanly after the
    /// current line
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Translate and publish one raw serial line.
    ///
    /// Returns the published message; `None` when the line was dropped.
    pub fn handle_line(&self, raw: &[u8]) -> Option<BridgeMessage> {
        let _enter = self.span.enter();

        let line = match std::str::from_utf8(trim_line_ending(raw)) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "could not decode line as utf-8, dropping");
                return None;
            }
        };

        let message = translate_line(line, self.config.default_qos, self.config.default_retain);
        let topic = message.bus_topic(&self.config.publish_prefix);
        let payload = message.payload.to_bus_payload();
        let len = payload.len();

        match self
            .publisher
            .publish(&topic, payload, message.qos, message.retain)
        {
            Ok(()) => {
                info!(topic = %topic, len, "published");
                Some(message)
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "publish failed, dropping line");
                None
            }
        }
    }

    /// Read and forward one line; `Ok(None)` when the link was quiet
    pub fn pump(
        &self,
        channel: &mut dyn ByteChannel,
        reader: &mut LineReader,
    ) -> Result<Option<BridgeMessage>, ProtocolError> {
        match reader.read_line(channel)? {
            Some(line) => Ok(self.handle_line(&line)),
            None => Ok(None),
        }
    }

    /// Forward lines until a channel fault or shutdown.
    ///
    /// The partial line buffer lives for one session only.
    pub fn run_session(
        &self,
        channel: &mut dyn ByteChannel,
        _writer: &ChannelWriter,
    ) -> Result<(), ProtocolError> {
        info!(parent: &self.span, "listening to serial port");
        let mut reader = LineReader::new(self.config.max_line_length);

        while !self.shutdown.load(Ordering::Relaxed) {
            self.pump(channel, &mut reader)?;
        }
        Ok(())
    }

    /// Write one bus message to the serial side.
    ///
    /// Returns the line written. Messages are dropped, and logged, when the
    /// payload is not UTF-8 or the link is closed.
    pub fn deliver_inbound(&self, msg: &InboundMessage, writer: &ChannelWriter) -> Option<String> {
        let _enter = self.span.enter();

        let Some(message) =
            translate_inbound(&msg.topic, &msg.payload, &self.config.subscribe_prefix)
        else {
            error!(topic = %msg.topic, "ignoring payload not convertible to utf-8");
            return None;
        };

        let line = match message.to_serial_line() {
            Ok(line) => line,
            Err(e) => {
                error!(topic = %msg.topic, error = %e, "could not encode message");
                return None;
            }
        };

        match writer.write_all(line.as_bytes()) {
            Ok(()) => {
                info!(line = %line.trim_end(), "sent to serial");
                Some(line)
            }
            Err(ProtocolError::NotConnected) => {
                warn!(topic = %msg.topic, "could not send to closed serial, dropping message");
                None
            }
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "serial write failed, dropping message");
                None
            }
        }
    }

    /// Drain the inbound queue until every sender is gone.
    ///
    /// Blocking; run it on its own thread, never inside the async runtime.
    pub fn serve_inbound(&self, mut inbound: mpsc::Receiver<InboundMessage>, writer: ChannelWriter) {
        while let Some(msg) = inbound.blocking_recv() {
            debug!(parent: &self.span, topic = %msg.topic, "inbound message");
            self.deliver_inbound(&msg, &writer);
        }
        info!(parent: &self.span, "inbound queue closed");
    }
}
