//! Connection management
//!
//! Handles the channel lifecycle: open, run a session, close on fault and
//! reopen at a fixed interval. The supervisor is the only component that
//! opens or closes the link; everything else writes through the shared
//! [`ChannelWriter`].

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Span};

use super::{open_channel, ByteChannel, ProtocolError};

/// Channel state as seen by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Link open, session running
    Open,
    /// Link released, waiting to reopen
    Closed,
}

/// Something that can (re)open the physical link
pub trait ChannelOpener: Send {
    /// Try once to open the link
    fn open(&mut self) -> Result<Box<dyn ByteChannel>, ProtocolError>;
}

impl<F> ChannelOpener for F
where
    F: FnMut() -> Result<Box<dyn ByteChannel>, ProtocolError> + Send,
{
    fn open(&mut self) -> Result<Box<dyn ByteChannel>, ProtocolError> {
        self()
    }
}

/// Opens a serial device (or `tcp://` server) from configuration
#[derive(Debug, Clone)]
pub struct SerialOpener {
    /// Device path or `tcp://host:port`
    pub address: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read/write timeout
    pub timeout: Duration,
}

impl ChannelOpener for SerialOpener {
    fn open(&mut self) -> Result<Box<dyn ByteChannel>, ProtocolError> {
        open_channel(&self.address, self.baud_rate, self.timeout)
    }
}

/// The single serialized write path to the link.
///
/// Holds a cloned write handle while the link is open. All writers, the
/// query scheduler and the inbound bus messages alike, take the same lock, so
/// concurrent writes never interleave inside one message.
#[derive(Clone, Default)]
pub struct ChannelWriter {
    slot: Arc<Mutex<Option<Box<dyn ByteChannel>>>>,
}

impl ChannelWriter {
    /// Create a writer with no link attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a link is currently attached
    pub fn is_open(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Write all bytes and flush.
    ///
    /// Returns [`ProtocolError::NotConnected`] while the link is closed.
    pub fn write_all(&self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let mut slot = self.slot.lock();
        let channel = slot.as_mut().ok_or(ProtocolError::NotConnected)?;
        channel.write_all(bytes)?;
        channel.flush()?;
        Ok(())
    }

    fn attach(&self, channel: Box<dyn ByteChannel>) {
        *self.slot.lock() = Some(channel);
    }

    fn detach(&self) {
        self.slot.lock().take();
    }
}

/// Keeps a session running across physical disconnects
pub struct ReconnectSupervisor<O: ChannelOpener> {
    opener: O,
    retry_interval: Duration,
    channel: Option<Box<dyn ByteChannel>>,
    writer: ChannelWriter,
    reconnects: u64,
    span: Span,
}

impl<O: ChannelOpener> ReconnectSupervisor<O> {
    /// Create a supervisor; the link stays closed until [`open`](Self::open)
    /// or [`run`](Self::run)
    pub fn new(opener: O, retry_interval: Duration, span: Span) -> Self {
        Self {
            opener,
            retry_interval,
            channel: None,
            writer: ChannelWriter::new(),
            reconnects: 0,
            span,
        }
    }

    /// Handle to the shared write path
    pub fn writer(&self) -> ChannelWriter {
        self.writer.clone()
    }

    /// Current channel state
    pub fn state(&self) -> ChannelState {
        if self.channel.is_some() {
            ChannelState::Open
        } else {
            ChannelState::Closed
        }
    }

    /// Number of successful reopen cycles so far
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Try once to open the link and attach its write half
    pub fn open(&mut self) -> Result<(), ProtocolError> {
        let channel = self.opener.open()?;
        let write_half = channel.try_clone()?;
        self.writer.attach(write_half);
        self.channel = Some(channel);
        Ok(())
    }

    /// Release both halves of the link
    fn close(&mut self) {
        self.writer.detach();
        self.channel = None;
    }

    /// Retry opening until it succeeds, sleeping the fixed interval in between
    fn reconnect(&mut self) {
        loop {
            match self.open() {
                Ok(()) => {
                    self.reconnects += 1;
                    info!(reconnects = self.reconnects, "reconnection to serial successful");
                    return;
                }
                Err(e) => {
                    info!(
                        wait_secs = self.retry_interval.as_secs_f64(),
                        error = %e,
                        "reconnection attempt failed"
                    );
                    std::thread::sleep(self.retry_interval);
                }
            }
        }
    }

    /// Run `session` until it finishes cleanly.
    ///
    /// A session error closes the link, which is then reopened without limit
    /// before the session is started again on the fresh link. Only a session
    /// returning `Ok(())` ends the run.
    pub fn run<F>(&mut self, mut session: F)
    where
        F: FnMut(&mut dyn ByteChannel, &ChannelWriter) -> Result<(), ProtocolError>,
    {
        let span = self.span.clone();
        let _enter = span.enter();

        loop {
            if self.channel.is_none() {
                info!("disconnected, will attempt reconnect");
                self.reconnect();
            }

            let Some(channel) = self.channel.as_mut() else {
                continue;
            };

            debug!("starting session");
            let result = session(channel.as_mut(), &self.writer);
            self.close();

            match result {
                Ok(()) => {
                    info!("session finished");
                    return;
                }
                Err(e) => warn!(error = %e, "serial disconnected"),
            }
        }
    }
}
