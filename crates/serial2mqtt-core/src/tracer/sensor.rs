//! Sensor data payload
//!
//! Decodes the payload of a `0xA0` report into typed values. All fields sit
//! at fixed offsets; bytes 4, 5, 15 and 19 are reserved and skipped.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Minimum payload length of a sensor data report
pub const SENSOR_PAYLOAD_LEN: usize = 23;

/// Raw temperature byte of 0 corresponds to this many degrees below zero
const TEMP_OFFSET: i16 = 30;

/// One reading of the charge controller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Battery voltage (V)
    #[serde(rename = "batt_volt")]
    pub battery_voltage: f64,
    /// Photovoltaic panel voltage (V)
    #[serde(rename = "pv_volt")]
    pub pv_voltage: f64,
    /// Load current (A)
    pub load_current: f64,
    /// Battery overdischarge threshold (V)
    pub batt_overdischarge_volt: f64,
    /// Battery full threshold (V)
    pub batt_full_volt: f64,
    /// Load output switched on
    pub load_on: bool,
    /// Load overload fault
    pub load_overload: bool,
    /// Load short-circuit fault
    pub load_short: bool,
    /// Battery overload fault
    pub batt_overload: bool,
    /// Battery below the overdischarge threshold
    pub batt_overdischarge: bool,
    /// Battery full
    pub batt_full: bool,
    /// Battery temperature (°C)
    pub batt_temp: i16,
    /// Charge current (A)
    pub charge_current: f64,
    /// Derived: battery voltage × load current (W)
    pub load_power: f64,
    /// Derived: battery voltage × charge current (W)
    pub charge_power: f64,
}

impl SensorReading {
    /// Parse a sensor data payload.
    ///
    /// Returns `None` for payloads shorter than [`SENSOR_PAYLOAD_LEN`]; a
    /// reading is either complete or absent.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < SENSOR_PAYLOAD_LEN {
            return None;
        }

        let battery_voltage = centi(payload, 0);
        let load_current = centi(payload, 6);
        let charge_current = centi(payload, 21);

        Some(Self {
            battery_voltage,
            pv_voltage: centi(payload, 2),
            load_current,
            batt_overdischarge_volt: centi(payload, 8),
            batt_full_volt: centi(payload, 10),
            load_on: flag(payload, 12),
            load_overload: flag(payload, 13),
            load_short: flag(payload, 14),
            batt_overload: flag(payload, 16),
            batt_overdischarge: flag(payload, 17),
            batt_full: flag(payload, 18),
            batt_temp: i16::from(payload[20]) - TEMP_OFFSET,
            charge_current,
            load_power: battery_voltage * load_current,
            charge_power: battery_voltage * charge_current,
        })
    }
}

/// Little-endian u16 in hundredths
fn centi(data: &[u8], offset: usize) -> f64 {
    f64::from(LittleEndian::read_u16(&data[offset..offset + 2])) / 100.0
}

fn flag(data: &[u8], offset: usize) -> bool {
    data[offset] > 0
}
