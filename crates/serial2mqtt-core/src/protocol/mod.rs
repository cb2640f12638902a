//! Serial Protocol Communication
//!
//! Implements the EP-Solar Tracer binary telemetry protocol and the channel
//! plumbing shared with the line bridge.
//!
//! Wire format, all integers little-endian:
//!
//! ```text
//! [sync: EB 90 EB 90 EB 90][controller_id][command][payload_length]
//! [payload: payload_length bytes][crc: 2][terminator: 7F]
//! ```

pub mod channel;
pub mod commands;
mod decoder;
mod error;
mod frame;
pub mod serial;
mod supervisor;

pub use channel::{read_byte, read_up_to, ByteChannel, SerialChannel, TcpChannel};
pub use commands::Command;
pub use decoder::{advance_sync, DecodeOutcome, FrameDecoder};
pub use error::{FrameReject, FrameSection, ProtocolError};
pub use frame::{Frame, FrameBuilder};
pub use serial::{list_ports, open_channel, PortInfo};
pub use supervisor::{
    ChannelOpener, ChannelState, ChannelWriter, ReconnectSupervisor, SerialOpener,
};

use std::time::Duration;

/// Synchronization marker that starts every frame
pub const SYNC_MARKER: [u8; 6] = [0xEB, 0x90, 0xEB, 0x90, 0xEB, 0x90];

/// Terminator byte closing every frame footer
pub const FRAME_TERMINATOR: u8 = 0x7F;

/// Header size: controller id, command, payload length
pub const HEADER_LEN: usize = 3;

/// Footer size: 2 byte CRC plus terminator
pub const FOOTER_LEN: usize = 3;

/// Maximum number of bytes scanned while looking for the sync marker
pub const DEFAULT_MAX_SYNC_SCAN: usize = 1024;

/// Blocking read/write timeout for the serial port
pub const DEFAULT_SERIAL_TIMEOUT: Duration = Duration::from_secs(100);

/// Wait between two reopen attempts after a disconnect
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(30);
