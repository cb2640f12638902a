//! # serial2mqtt Core Library
//!
//! Bridges devices on a serial line to an MQTT broker.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A line bridge: newline-delimited JSON from a microcontroller to MQTT
//!   topics, and MQTT messages back as JSON lines
//! - EP-Solar Tracer telemetry: binary frame decoding, sensor payload parsing
//!   and periodic querying
//! - Serial link supervision with fixed-interval reconnects
//! - Options file handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use serial2mqtt_core::prelude::*;
//!
//! let options = Options::load(Path::new(DEFAULT_OPTIONS_PATH))?;
//! let (client, eventloop) = options.mqtt_settings()?.connect();
//!
//! let config = options.tracer()?;
//! let mut session = TracerSession::new(&config, client, tracing::info_span!("tracer"))?;
//! let mut supervisor = ReconnectSupervisor::new(
//!     options.serial_opener(Mode::Tracer)?,
//!     options.reconnect_interval(),
//!     tracing::info_span!("serial"),
//! );
//! supervisor.open()?;
//! supervisor.run(|channel, writer| session.run(channel, writer));
//! ```

pub mod bridge;
pub mod bus;
pub mod config;
pub mod protocol;
pub mod schedule;
pub mod tracer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bridge::{BridgeMessage, LineBridge, LineBridgeConfig, MsgValue};
    pub use crate::bus::{BusPublisher, InboundMessage, MqttSettings};
    pub use crate::config::{ConfigError, Mode, Options, DEFAULT_OPTIONS_PATH};
    pub use crate::protocol::{
        ChannelWriter, Frame, FrameDecoder, ProtocolError, ReconnectSupervisor, SerialOpener,
    };
    pub use crate::schedule::Scheduler;
    pub use crate::tracer::{SensorReading, TracerConfig, TracerMessage, TracerSession};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
