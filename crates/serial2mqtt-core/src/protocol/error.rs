//! Protocol errors

use std::fmt;
use thiserror::Error;

/// Channel-level errors.
///
/// These are the only failures that leave the decode or bridge loop; the
/// reconnect supervisor reacts to every one of them by closing the channel.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No link is attached to the writer
    #[error("Not connected to serial port")]
    NotConnected,

    /// Malformed `tcp://` address
    #[error("Invalid port address: {0}")]
    InvalidAddress(String),

    /// Frame payload does not fit the length byte
    #[error("Payload too large: {0} bytes (max 255)")]
    PayloadTooLarge(usize),

    /// Read or write fault on an open link
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        ProtocolError::SerialError(e.to_string())
    }
}

/// Part of a frame that was being read when it got cut short
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSection {
    /// Controller id, command and length
    Header,
    /// Length-prefixed data
    Payload,
    /// CRC and terminator
    Footer,
}

impl fmt::Display for FrameSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameSection::Header => "header",
            FrameSection::Payload => "payload",
            FrameSection::Footer => "footer",
        };
        f.write_str(name)
    }
}

/// Why a decode attempt produced no frame.
///
/// Rejections are expected events on a lossy link: the caller logs them and
/// scans again from the current stream position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameReject {
    /// The link went quiet before the marker was complete
    #[error("read timeout while waiting for sync after {scanned} bytes")]
    SyncTimeout {
        /// Bytes consumed before the timeout
        scanned: usize,
    },

    /// Scan budget exhausted
    #[error("no sync marker found within {scanned} bytes")]
    NoSyncFound {
        /// Bytes consumed, equal to the budget
        scanned: usize,
    },

    /// The link went quiet inside a frame
    #[error("truncated {section}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Section being read
        section: FrameSection,
        /// Bytes the section needs
        expected: usize,
        /// Bytes received
        actual: usize,
    },

    /// Last footer byte is not `0x7F`
    #[error("incorrect footer terminator {0:#04x}")]
    BadFooter(u8),
}
