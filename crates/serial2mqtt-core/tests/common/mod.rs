//! Shared test doubles: an in-memory serial link and a recording publisher

#![allow(dead_code)]

use rumqttc::QoS;
use serial2mqtt_core::bus::{BusError, BusPublisher};
use serial2mqtt_core::protocol::ByteChannel;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory duplex link.
///
/// Reads drain the scripted input and then time out, like a quiet serial
/// port. With `fail_when_drained` set, a drained link reports a broken pipe
/// instead, like an unplugged adapter. Clones share both buffers.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    input: Arc<Mutex<VecDeque<u8>>>,
    output: Arc<Mutex<Vec<u8>>>,
    fail_when_drained: bool,
    fail_writes: bool,
}

impl MemoryChannel {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: Arc::new(Mutex::new(input.iter().copied().collect())),
            ..Self::default()
        }
    }

    /// Link that faults once its input is used up
    pub fn faulting(input: &[u8]) -> Self {
        Self {
            fail_when_drained: true,
            ..Self::new(input)
        }
    }

    /// Link whose writes always fail
    pub fn read_only(input: &[u8]) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(input)
        }
    }

    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().unwrap().extend(bytes.iter().copied());
    }

    pub fn remaining_input(&self) -> usize {
        self.input.lock().unwrap().len()
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.output.lock().unwrap().clone()
    }

    pub fn written_string(&self) -> String {
        String::from_utf8(self.written()).unwrap()
    }
}

impl Read for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut input = self.input.lock().unwrap();
        if input.is_empty() {
            let kind = if self.fail_when_drained {
                io::ErrorKind::BrokenPipe
            } else {
                io::ErrorKind::TimedOut
            };
            return Err(io::Error::from(kind));
        }
        let n = buf.len().min(input.len());
        for (slot, byte) in buf.iter_mut().zip(input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MemoryChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.output.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteChannel for MemoryChannel {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn ByteChannel>> {
        Ok(Box::new(self.clone()))
    }
}

/// One recorded publish
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl Published {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap()
    }

    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

/// Publisher that records every publish
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Published> {
        self.published.lock().unwrap().last().cloned()
    }
}

impl BusPublisher for RecordingPublisher {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), BusError> {
        self.published.lock().unwrap().push(Published {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }
}

/// Encode a raw frame; the terminator is a parameter so tests can corrupt it
pub fn frame_bytes(controller_id: u8, command: u8, payload: &[u8], crc: u16, terminator: u8) -> Vec<u8> {
    let mut bytes = vec![0xEB, 0x90, 0xEB, 0x90, 0xEB, 0x90];
    bytes.extend_from_slice(&[controller_id, command, payload.len() as u8]);
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.push(terminator);
    bytes
}

/// 23-byte sensor payload: 12.20 V battery, 1.50 A load, 25 °C
pub fn scenario_payload() -> Vec<u8> {
    let mut payload = vec![0u8; 23];
    payload[0..2].copy_from_slice(&1220u16.to_le_bytes());
    payload[6..8].copy_from_slice(&150u16.to_le_bytes());
    payload[20] = 55;
    payload
}

/// Install a test subscriber once; output only shows for failing tests
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
