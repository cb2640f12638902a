mod common;

use common::scenario_payload;
use serial2mqtt_core::tracer::{SensorReading, SENSOR_PAYLOAD_LEN};

/// Small deterministic byte generator
struct Lcg(u32);

impl Lcg {
    fn next_byte(&mut self) -> u8 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (self.0 >> 16) as u8
    }

    fn payload(&mut self, len: usize) -> Vec<u8> {
        (0..len).map(|_| self.next_byte()).collect()
    }
}

#[test]
fn test_short_payloads_never_parse() {
    let mut rng = Lcg(7);
    for len in 0..SENSOR_PAYLOAD_LEN {
        for _ in 0..20 {
            assert!(SensorReading::parse(&rng.payload(len)).is_none(), "len {}", len);
        }
    }
}

#[test]
fn test_derived_power_law() {
    let mut rng = Lcg(42);
    for i in 0..500 {
        let payload = rng.payload(SENSOR_PAYLOAD_LEN + i % 4);
        let r = SensorReading::parse(&payload).expect("reading");
        assert_eq!(r.load_power, r.battery_voltage * r.load_current);
        assert_eq!(r.charge_power, r.battery_voltage * r.charge_current);
    }
}

#[test]
fn test_scenario_values() {
    let r = SensorReading::parse(&scenario_payload()).unwrap();
    assert_eq!(r.battery_voltage, 12.20);
    assert_eq!(r.pv_voltage, 0.0);
    assert_eq!(r.load_current, 1.50);
    assert_eq!(r.batt_temp, 25);
    assert!((r.load_power - 18.30).abs() < 1e-9);
    assert_eq!(r.charge_power, 0.0);
}

#[test]
fn test_full_field_layout() {
    let mut payload = vec![0u8; SENSOR_PAYLOAD_LEN];
    payload[2..4].copy_from_slice(&1875u16.to_le_bytes());
    payload[8..10].copy_from_slice(&1110u16.to_le_bytes());
    payload[10..12].copy_from_slice(&1440u16.to_le_bytes());
    payload[13] = 1;
    payload[16] = 1;
    payload[17] = 1;
    payload[21..23].copy_from_slice(&325u16.to_le_bytes());

    let r = SensorReading::parse(&payload).unwrap();
    assert_eq!(r.pv_voltage, 18.75);
    assert_eq!(r.batt_overdischarge_volt, 11.10);
    assert_eq!(r.batt_full_volt, 14.40);
    assert!(!r.load_on);
    assert!(r.load_overload);
    assert!(r.batt_overload);
    assert!(r.batt_overdischarge);
    assert!(!r.batt_full);
    assert_eq!(r.charge_current, 3.25);
}

#[test]
fn test_serialized_keys() {
    let r = SensorReading::parse(&scenario_payload()).unwrap();
    let json = serde_json::to_value(r).unwrap();
    let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "batt_full",
            "batt_full_volt",
            "batt_overdischarge",
            "batt_overdischarge_volt",
            "batt_overload",
            "batt_temp",
            "batt_volt",
            "charge_current",
            "charge_power",
            "load_current",
            "load_on",
            "load_overload",
            "load_power",
            "load_short",
            "pv_volt",
        ]
    );
    assert_eq!(json["batt_temp"], 25);
}
