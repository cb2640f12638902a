//! Add-on options
//!
//! Options are read from a JSON file (`/data/options.json` under the
//! supervisor). Every key is optional; two defaults depend on the mode the
//! bridge runs in, so those keys stay `None` until resolved.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::bridge::LineBridgeConfig;
use crate::bus::{qos_from_u8, MqttSettings, DEFAULT_MQTT_PORT};
use crate::protocol::{SerialOpener, DEFAULT_MAX_SYNC_SCAN};
use crate::tracer::TracerConfig;

/// Default location of the options file
pub const DEFAULT_OPTIONS_PATH: &str = "/data/options.json";

/// Keep-alive interval of the broker connection
pub const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Configuration errors; all fatal at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Could not read options file {path}: {source}")]
    Read {
        /// Options file path
        path: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The file is not valid JSON or has mistyped values
    #[error("Malformed options file: {0}")]
    Parse(#[from] serde_json::Error),

    /// `mqtt_address` is not a URL
    #[error("Invalid mqtt_address {address:?}: {reason}")]
    InvalidAddress {
        /// Value as configured
        address: String,
        /// Parser message
        reason: String,
    },

    /// `mqtt_address` uses a scheme other than `mqtt`
    #[error("Incorrect option mqtt_address, expecting mqtt protocol, got {0:?}. Example: \"mqtt://homeassistant\"")]
    UnsupportedScheme(String),

    /// Zero baud rate
    #[error("Invalid serial_baud: {0}")]
    InvalidBaudRate(u32),

    /// QoS level above 2
    #[error("Invalid mqtt_publish_qos: {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
}

/// Which bridge the process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// JSON lines ↔ MQTT
    Bridge,
    /// EP-Solar Tracer telemetry
    Tracer,
}

impl Mode {
    /// Baud rate when `serial_baud` is unset
    pub fn default_baud_rate(self) -> u32 {
        match self {
            Mode::Bridge => 74880,
            Mode::Tracer => 9600,
        }
    }

    /// Retain flag when `mqtt_publish_retain` is unset
    pub fn default_retain(self) -> bool {
        match self {
            Mode::Bridge => false,
            Mode::Tracer => true,
        }
    }
}

/// Contents of the options file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Device path, or `tcp://host:port` for a serial-over-TCP server
    pub serial_port: String,
    /// Baud rate; mode default when unset
    pub serial_baud: Option<u32>,
    /// Read/write timeout of the link
    pub serial_timeout_sec: u64,
    /// Pause between reconnect attempts
    pub reconnect_interval_sec: u64,

    /// Broker URL, `mqtt://host[:port]`
    pub mqtt_address: String,
    /// Broker user; empty disables authentication
    pub mqtt_username: String,
    /// Broker password
    pub mqtt_password: String,
    /// Prefix of outbound bridge topics
    pub mqtt_publish_topic: String,
    /// Subscription of the bridge, usually ending in `#`
    pub mqtt_subscribe_topic: String,
    /// Base topic of the tracer mode
    pub mqtt_topic: String,
    /// Default publish QoS level
    pub mqtt_publish_qos: u8,
    /// Retain flag; mode default when unset
    pub mqtt_publish_retain: Option<bool>,

    /// Tracer query period; 0 disables querying
    pub query_period_sec: u64,
    /// Longest serial line forwarded, in bytes
    pub max_line_length: usize,
    /// Bytes scanned for a frame marker before giving up
    pub max_sync_scan: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            serial_baud: None,
            serial_timeout_sec: 100,
            reconnect_interval_sec: 30,
            mqtt_address: "mqtt://homeassistant".to_string(),
            mqtt_username: "mqtt".to_string(),
            mqtt_password: String::new(),
            mqtt_publish_topic: "arduino/read".to_string(),
            mqtt_subscribe_topic: "arduino/write".to_string(),
            mqtt_topic: "epsolar_tracer/".to_string(),
            mqtt_publish_qos: 0,
            mqtt_publish_retain: None,
            query_period_sec: 600,
            max_line_length: crate::bridge::DEFAULT_MAX_LINE_LENGTH,
            max_sync_scan: DEFAULT_MAX_SYNC_SCAN,
        }
    }
}

impl Options {
    /// Load options from `path`.
    ///
    /// A missing file yields the defaults (with a warning); any other read
    /// failure or malformed JSON is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "options file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Parse options from JSON text
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Check every value that is fatal when wrong
    pub fn validate(&self, mode: Mode) -> Result<(), ConfigError> {
        self.baud_rate(mode)?;
        self.publish_qos()?;
        self.mqtt_settings()?;
        Ok(())
    }

    /// Baud rate for `mode`; zero is rejected
    pub fn baud_rate(&self, mode: Mode) -> Result<u32, ConfigError> {
        match self.serial_baud.unwrap_or_else(|| mode.default_baud_rate()) {
            0 => Err(ConfigError::InvalidBaudRate(0)),
            baud => Ok(baud),
        }
    }

    /// Configured retain flag or the mode default
    pub fn retain(&self, mode: Mode) -> bool {
        self.mqtt_publish_retain.unwrap_or_else(|| mode.default_retain())
    }

    /// Default publish QoS
    pub fn publish_qos(&self) -> Result<rumqttc::QoS, ConfigError> {
        qos_from_u8(self.mqtt_publish_qos).ok_or(ConfigError::InvalidQos(self.mqtt_publish_qos))
    }

    /// Link read/write timeout
    pub fn serial_timeout(&self) -> Duration {
        Duration::from_secs(self.serial_timeout_sec)
    }

    /// Pause between reconnect attempts
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_sec)
    }

    /// Opener for the configured serial link
    pub fn serial_opener(&self, mode: Mode) -> Result<SerialOpener, ConfigError> {
        Ok(SerialOpener {
            address: self.serial_port.clone(),
            baud_rate: self.baud_rate(mode)?,
            timeout: self.serial_timeout(),
        })
    }

    /// Broker settings from `mqtt_address` and the credentials
    pub fn mqtt_settings(&self) -> Result<MqttSettings, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidAddress {
            address: self.mqtt_address.clone(),
            reason,
        };

        let url = Url::parse(&self.mqtt_address).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "mqtt" {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?;

        Ok(MqttSettings {
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_MQTT_PORT),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            client_id: MqttSettings::generate_client_id(),
            keep_alive: MQTT_KEEP_ALIVE,
        })
    }

    /// Line bridge settings
    pub fn line_bridge(&self) -> Result<LineBridgeConfig, ConfigError> {
        Ok(LineBridgeConfig {
            publish_prefix: publish_prefix(&self.mqtt_publish_topic),
            subscribe_prefix: subscribe_prefix(&self.mqtt_subscribe_topic),
            default_qos: self.publish_qos()?,
            default_retain: self.retain(Mode::Bridge),
            max_line_length: self.max_line_length,
        })
    }

    /// Tracer telemetry settings
    pub fn tracer(&self) -> Result<TracerConfig, ConfigError> {
        let base = publish_prefix(&self.mqtt_topic);
        Ok(TracerConfig {
            read_topic: format!("{}/read", base),
            online_topic: format!("{}/online", base),
            qos: self.publish_qos()?,
            retain: self.retain(Mode::Tracer),
            query_period_secs: self.query_period_sec,
            max_sync_scan: self.max_sync_scan,
        })
    }
}

/// Publish prefix: one trailing `/` removed
pub fn publish_prefix(topic: &str) -> String {
    topic.strip_suffix('/').unwrap_or(topic).to_string()
}

/// Subscribe prefix: a trailing `#`, then a trailing `/` removed
pub fn subscribe_prefix(topic: &str) -> String {
    let topic = topic.strip_suffix('#').unwrap_or(topic);
    topic.strip_suffix('/').unwrap_or(topic).to_string()
}
