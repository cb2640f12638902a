//! Protocol commands
//!
//! Defines the command codes of the EP-Solar Tracer protocol.

use serde::{Deserialize, Serialize};

use super::{Frame, FrameBuilder, ProtocolError};

/// Controller id used by the upstream query command
pub const QUERY_CONTROLLER_ID: u8 = 0x16;

/// Protocol commands for charge controller communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Real-time sensor data (0xA0), both the query and its answer
    SensorData,

    /// Any command this bridge does not interpret; payload is kept raw
    Other(u8),
}

impl Command {
    /// Get the command byte
    pub fn code(&self) -> u8 {
        match self {
            Command::SensorData => 0xA0,
            Command::Other(code) => *code,
        }
    }
}

impl From<u8> for Command {
    fn from(code: u8) -> Self {
        match code {
            0xA0 => Command::SensorData,
            other => Command::Other(other),
        }
    }
}

/// Frame asking the controller for a sensor data report
pub fn query_frame() -> Result<Frame, ProtocolError> {
    FrameBuilder::new(QUERY_CONTROLLER_ID, Command::SensorData).build()
}
