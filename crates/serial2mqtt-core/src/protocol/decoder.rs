//! Frame decoding
//!
//! Recovers frames from an unsynchronized byte stream. The decoder hunts for
//! the sync marker one byte at a time, then reads the fixed header, the
//! length-prefixed payload and the footer. Every attempt starts from scratch
//! and only moves forward through the stream.

use byteorder::{ByteOrder, LittleEndian};
use std::io::Read;

use super::{
    read_byte, read_up_to, Frame, FrameReject, FrameSection, ProtocolError,
    DEFAULT_MAX_SYNC_SCAN, FOOTER_LEN, FRAME_TERMINATOR, HEADER_LEN, SYNC_MARKER,
};

/// Result of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete, validated frame
    Frame(Frame),
    /// No frame; scanning should simply continue
    Rejected(FrameReject),
}

impl DecodeOutcome {
    /// The frame, if the attempt produced one
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            DecodeOutcome::Frame(frame) => Some(frame),
            DecodeOutcome::Rejected(_) => None,
        }
    }
}

/// Advance the sync matcher by one byte and return the new match length.
///
/// A byte that breaks the match but equals the first marker byte counts as
/// the start of a new match, which handles the repeating `EB 90` pattern.
pub fn advance_sync(offset: usize, byte: u8) -> usize {
    if offset < SYNC_MARKER.len() && byte == SYNC_MARKER[offset] {
        offset + 1
    } else if byte == SYNC_MARKER[0] {
        1
    } else {
        0
    }
}

/// Stateless frame decoder
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_sync_scan: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SYNC_SCAN)
    }
}

impl FrameDecoder {
    /// Create a decoder that gives up on sync after `max_sync_scan` bytes
    pub fn new(max_sync_scan: usize) -> Self {
        Self {
            max_sync_scan: max_sync_scan.max(SYNC_MARKER.len()),
        }
    }

    /// Scanned-byte budget while seeking the marker
    pub fn max_sync_scan(&self) -> usize {
        self.max_sync_scan
    }

    /// Read the next frame from `channel`.
    ///
    /// Timeouts, truncation and a bad terminator come back as
    /// [`DecodeOutcome::Rejected`]; only I/O faults of the channel itself are
    /// returned as errors.
    pub fn decode_frame<R: Read + ?Sized>(
        &self,
        channel: &mut R,
    ) -> Result<DecodeOutcome, ProtocolError> {
        if let Some(reject) = self.synchronize(channel)? {
            return Ok(DecodeOutcome::Rejected(reject));
        }

        let header = read_up_to(channel, HEADER_LEN)?;
        if header.len() < HEADER_LEN {
            return Ok(truncated(FrameSection::Header, HEADER_LEN, header.len()));
        }
        let (controller_id, command, payload_length) = (header[0], header[1], header[2]);

        let expected = payload_length as usize;
        let payload = read_up_to(channel, expected)?;
        if payload.len() < expected {
            return Ok(truncated(FrameSection::Payload, expected, payload.len()));
        }

        let footer = read_up_to(channel, FOOTER_LEN)?;
        if footer.len() < FOOTER_LEN {
            return Ok(truncated(FrameSection::Footer, FOOTER_LEN, footer.len()));
        }
        if footer[2] != FRAME_TERMINATOR {
            return Ok(DecodeOutcome::Rejected(FrameReject::BadFooter(footer[2])));
        }
        let crc = LittleEndian::read_u16(&footer[0..2]);

        let frame = Frame::new(controller_id, command, payload, crc)?;
        Ok(DecodeOutcome::Frame(frame))
    }

    /// Consume bytes until the full marker was seen.
    ///
    /// Returns `None` once synchronized.
    fn synchronize<R: Read + ?Sized>(
        &self,
        channel: &mut R,
    ) -> Result<Option<FrameReject>, ProtocolError> {
        let mut sync_offset = 0;
        let mut scanned = 0;

        loop {
            let byte = match read_byte(channel)? {
                Some(b) => b,
                None => return Ok(Some(FrameReject::SyncTimeout { scanned })),
            };
            scanned += 1;

            sync_offset = advance_sync(sync_offset, byte);
            if sync_offset == SYNC_MARKER.len() {
                return Ok(None);
            }
            if scanned >= self.max_sync_scan {
                return Ok(Some(FrameReject::NoSyncFound { scanned }));
            }
        }
    }
}

fn truncated(section: FrameSection, expected: usize, actual: usize) -> DecodeOutcome {
    DecodeOutcome::Rejected(FrameReject::Truncated {
        section,
        expected,
        actual,
    })
}
