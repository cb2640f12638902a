//! Line ↔ bus message translation
//!
//! Outbound lines are JSON objects of the form
//! `{"topic": "temp", "msg": {...}, "qos": 1, "retain": true}`; anything
//! else is forwarded verbatim to the `log` sub-topic. Inbound bus messages
//! become one line `{"topic": "<sub-topic>", "msg": <value>}\n`.

use rumqttc::QoS;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::io;

use crate::bus::qos_from_u8;

/// Sub-topic used when a line object names none
pub const DEFAULT_SUBTOPIC: &str = "data";

/// Sub-topic for raw, unstructured lines
pub const LOG_SUBTOPIC: &str = "log";

/// Which way a message travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Serial line to bus
    Outbound,
    /// Bus to serial line
    Inbound,
}

/// The `msg` of a bridged message
#[derive(Debug, Clone, PartialEq)]
pub enum MsgValue {
    /// Any JSON value other than a string
    Structured(Value),
    /// Plain text
    Text(String),
    /// No message; a line object without `msg` or with `msg: null`
    Absent,
}

impl MsgValue {
    /// Classify the `msg` member of a line object
    pub fn from_member(member: Option<Value>) -> Self {
        match member {
            None | Some(Value::Null) => MsgValue::Absent,
            Some(Value::String(text)) => MsgValue::Text(text),
            Some(value) => MsgValue::Structured(value),
        }
    }

    /// Classify a bus payload: valid JSON is structured, anything else text
    pub fn from_payload(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => MsgValue::Structured(value),
            Err(_) => MsgValue::Text(text.to_string()),
        }
    }

    /// Bytes published to the bus: compact JSON for structured values, the
    /// text itself otherwise
    pub fn to_bus_payload(&self) -> Vec<u8> {
        match self {
            MsgValue::Structured(value) => value.to_string().into_bytes(),
            MsgValue::Text(text) => text.clone().into_bytes(),
            MsgValue::Absent => Vec::new(),
        }
    }

    fn as_json(&self) -> Value {
        match self {
            MsgValue::Structured(value) => value.clone(),
            MsgValue::Text(text) => Value::String(text.clone()),
            MsgValue::Absent => Value::Null,
        }
    }
}

/// One message crossing the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeMessage {
    /// Sub-topic below the publish or subscribe prefix
    pub topic: String,
    /// Message body
    pub payload: MsgValue,
    /// Publish QoS; outbound only
    pub qos: QoS,
    /// Publish retain flag; outbound only
    pub retain: bool,
    /// Which way the message travels
    pub direction: Direction,
}

impl BridgeMessage {
    /// Full bus topic below `prefix`
    pub fn bus_topic(&self, prefix: &str) -> String {
        format!("{}/{}", prefix, self.topic)
    }

    /// Encode as one serial line, newline included
    pub fn to_serial_line(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct SerialLine<'a> {
            topic: &'a str,
            msg: Value,
        }

        let line = SerialLine {
            topic: &self.topic,
            msg: self.payload.as_json(),
        };

        let mut out = Vec::with_capacity(64);
        let mut ser = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
        line.serialize(&mut ser)?;
        out.push(b'\n');
        // Formatter only emits ASCII
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Translate one serial line (already stripped of its line ending)
pub fn translate_line(line: &str, default_qos: QoS, default_retain: bool) -> BridgeMessage {
    let raw = |qos, retain| BridgeMessage {
        topic: LOG_SUBTOPIC.to_string(),
        payload: MsgValue::Text(line.to_string()),
        qos,
        retain,
        direction: Direction::Outbound,
    };

    let mut object = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => object,
        Ok(_) | Err(_) => {
            tracing::debug!(line, "line is not a JSON object, forwarding as log");
            return raw(default_qos, default_retain);
        }
    };

    let qos = object
        .get("qos")
        .and_then(Value::as_u64)
        .and_then(|level| u8::try_from(level).ok())
        .and_then(qos_from_u8)
        .unwrap_or(default_qos);
    let retain = object
        .get("retain")
        .and_then(Value::as_bool)
        .unwrap_or(default_retain);

    match MsgValue::from_member(object.remove("msg")) {
        MsgValue::Absent => raw(qos, retain),
        payload => BridgeMessage {
            topic: subtopic(&object),
            payload,
            qos,
            retain,
            direction: Direction::Outbound,
        },
    }
}

/// Strings are used as is, numbers and bools in their JSON form
fn subtopic(object: &Map<String, Value>) -> String {
    match object.get("topic") {
        None => DEFAULT_SUBTOPIC.to_string(),
        Some(Value::String(topic)) => topic.clone(),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => value.to_string(),
        Some(other) => {
            tracing::debug!(topic = %other, "unusable topic, using default sub-topic");
            DEFAULT_SUBTOPIC.to_string()
        }
    }
}

/// Translate a bus message for the serial side.
///
/// The subscribe prefix and a leading `/` are stripped from the topic.
/// Returns `None` when the payload is not valid UTF-8.
pub fn translate_inbound(
    topic: &str,
    payload: &[u8],
    subscribe_prefix: &str,
) -> Option<BridgeMessage> {
    let text = std::str::from_utf8(payload).ok()?;

    let sub = topic.strip_prefix(subscribe_prefix).unwrap_or(topic);
    let sub = sub.strip_prefix('/').unwrap_or(sub);

    Some(BridgeMessage {
        topic: sub.to_string(),
        payload: MsgValue::from_payload(text),
        qos: QoS::AtLeastOnce,
        retain: false,
        direction: Direction::Inbound,
    })
}

/// JSON formatter with `", "` and `": "` separators and `\uXXXX` escapes for
/// non-ASCII characters, the layout line consumers already parse
#[derive(Debug, Clone, Copy, Default)]
pub struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_msg_classification() {
        assert_eq!(MsgValue::from_member(None), MsgValue::Absent);
        assert_eq!(MsgValue::from_member(Some(Value::Null)), MsgValue::Absent);
        assert_eq!(
            MsgValue::from_member(Some(json!("hi"))),
            MsgValue::Text("hi".to_string())
        );
        assert_eq!(
            MsgValue::from_member(Some(json!([1, 2]))),
            MsgValue::Structured(json!([1, 2]))
        );
    }

    #[test]
    fn test_bus_payload() {
        assert_eq!(
            MsgValue::Structured(json!({"a": 1, "b": [true, 2.5]})).to_bus_payload(),
            br#"{"a":1,"b":[true,2.5]}"#.to_vec()
        );
        assert_eq!(MsgValue::Structured(json!(42)).to_bus_payload(), b"42".to_vec());
        assert_eq!(MsgValue::Text("on".into()).to_bus_payload(), b"on".to_vec());
    }

    #[test]
    fn test_line_defaults() {
        let msg = translate_line(r#"{"msg": {"t": 21.5}}"#, QoS::AtMostOnce, false);
        assert_eq!(msg.topic, "data");
        assert_eq!(msg.qos, QoS::AtMostOnce);
        assert!(!msg.retain);
        assert_eq!(msg.payload, MsgValue::Structured(json!({"t": 21.5})));
    }

    #[test]
    fn test_line_overrides() {
        let msg = translate_line(
            r#"{"topic": "temp", "msg": "warm", "qos": 2, "retain": true}"#,
            QoS::AtMostOnce,
            false,
        );
        assert_eq!(msg.topic, "temp");
        assert_eq!(msg.qos, QoS::ExactlyOnce);
        assert!(msg.retain);
        assert_eq!(msg.payload, MsgValue::Text("warm".to_string()));
    }

    #[test]
    fn test_line_scalar_topic() {
        let msg = translate_line(r#"{"topic": 5, "msg": "x"}"#, QoS::AtMostOnce, false);
        assert_eq!(msg.topic, "5");
        assert_eq!(msg.bus_topic("arduino/read"), "arduino/read/5");

        let msg = translate_line(r#"{"topic": true, "msg": "x"}"#, QoS::AtMostOnce, false);
        assert_eq!(msg.topic, "true");

        let msg = translate_line(r#"{"topic": {"a": 1}, "msg": "x"}"#, QoS::AtMostOnce, false);
        assert_eq!(msg.topic, "data");
    }

    #[test]
    fn test_empty_line_goes_to_log() {
        let msg = translate_line("", QoS::AtMostOnce, false);
        assert_eq!(msg.topic, "log");
        assert_eq!(msg.payload, MsgValue::Text(String::new()));
    }

    #[test]
    fn test_line_invalid_qos_uses_default() {
        let msg = translate_line(r#"{"msg": 1, "qos": 7}"#, QoS::AtLeastOnce, false);
        assert_eq!(msg.qos, QoS::AtLeastOnce);
    }

    #[test]
    fn test_line_without_msg_goes_to_log() {
        let line = r#"{"topic": "temp", "msg": null}"#;
        let msg = translate_line(line, QoS::AtMostOnce, false);
        assert_eq!(msg.topic, "log");
        assert_eq!(msg.payload, MsgValue::Text(line.to_string()));

        let msg = translate_line("[1, 2, 3]", QoS::AtMostOnce, false);
        assert_eq!(msg.topic, "log");
    }

    #[test]
    fn test_inbound_topic_stripping() {
        let msg = translate_inbound("arduino/write/led/1", b"on", "arduino/write").unwrap();
        assert_eq!(msg.topic, "led/1");
        assert_eq!(msg.direction, Direction::Inbound);
        assert_eq!(msg.payload, MsgValue::Text("on".to_string()));

        let msg = translate_inbound("other/topic", b"1", "arduino/write").unwrap();
        assert_eq!(msg.topic, "other/topic");
    }

    #[test]
    fn test_inbound_non_utf8_dropped() {
        assert!(translate_inbound("arduino/write/x", &[0xFF, 0xFE], "arduino/write").is_none());
    }

    #[test]
    fn test_serial_line_layout() {
        let msg = translate_inbound(
            "w/cfg",
            r#"{"list": [1, 2], "name": "café", "z": {"a": null}}"#.as_bytes(),
            "w",
        )
        .unwrap();
        assert_eq!(
            msg.to_serial_line().unwrap(),
            "{\"topic\": \"cfg\", \"msg\": {\"list\": [1, 2], \"name\": \"caf\\u00e9\", \"z\": {\"a\": null}}}\n"
        );
    }

    #[test]
    fn test_serial_line_text() {
        let msg = translate_inbound("w/say", b"hello \"you\"", "w").unwrap();
        assert_eq!(
            msg.to_serial_line().unwrap(),
            "{\"topic\": \"say\", \"msg\": \"hello \\\"you\\\"\"}\n"
        );
    }
}
