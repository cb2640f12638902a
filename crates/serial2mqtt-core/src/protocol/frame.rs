//! Frame encoding
//!
//! A [`Frame`] is one validated protocol unit. Frames are only produced by
//! the decoder after the footer checked out, or built locally with
//! [`FrameBuilder`] for the upstream query command.
//!
//! Frame format:
//! - 6 bytes: sync marker `EB 90 EB 90 EB 90`
//! - 1 byte: controller id
//! - 1 byte: command
//! - 1 byte: payload length
//! - N bytes: payload
//! - 2 bytes: CRC (little-endian, carried but not verified by the controller firmware)
//! - 1 byte: terminator `7F`

use byteorder::{ByteOrder, LittleEndian};

use super::{Command, ProtocolError, FOOTER_LEN, FRAME_TERMINATOR, HEADER_LEN, SYNC_MARKER};

/// A decoded protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Controller the frame came from (or is addressed to)
    pub controller_id: u8,
    /// Raw command byte
    pub command: u8,
    /// CRC field from the footer
    pub crc: u16,
    payload: Vec<u8>,
}

impl Frame {
    /// Assemble a frame from decoded parts.
    ///
    /// Fails when the payload cannot be described by the one byte length field.
    pub fn new(
        controller_id: u8,
        command: u8,
        payload: Vec<u8>,
        crc: u16,
    ) -> Result<Self, ProtocolError> {
        if payload.len() > u8::MAX as usize {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        Ok(Self {
            controller_id,
            command,
            crc,
            payload,
        })
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Value of the header length field
    pub fn payload_length(&self) -> u8 {
        // Bounded by the check in `new`
        self.payload.len() as u8
    }

    /// Command decoded from the raw byte
    pub fn kind(&self) -> Command {
        Command::from(self.command)
    }

    /// Encode the frame including sync marker and footer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());

        bytes.extend_from_slice(&SYNC_MARKER);
        bytes.push(self.controller_id);
        bytes.push(self.command);
        bytes.push(self.payload_length());
        bytes.extend_from_slice(&self.payload);

        let mut crc_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut crc_bytes, self.crc);
        bytes.extend_from_slice(&crc_bytes);
        bytes.push(FRAME_TERMINATOR);

        bytes
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        SYNC_MARKER.len() + HEADER_LEN + self.payload.len() + FOOTER_LEN
    }
}

/// Builder for constructing frames
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    controller_id: u8,
    command: u8,
    crc: u16,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Start a frame for the given controller and command
    pub fn new(controller_id: u8, command: Command) -> Self {
        Self {
            controller_id,
            command: command.code(),
            crc: 0,
            payload: Vec::new(),
        }
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.payload.push(b);
        self
    }

    /// Add a 16-bit value (little-endian)
    pub fn u16_le(mut self, value: u16) -> Self {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Set the footer CRC field
    pub fn crc(mut self, crc: u16) -> Self {
        self.crc = crc;
        self
    }

    /// Build the frame
    pub fn build(self) -> Result<Frame, ProtocolError> {
        Frame::new(self.controller_id, self.command, self.payload, self.crc)
    }
}
