//! Compact telemetry from the node, expanded to the bus schema.
//!
//! The node sends
//!
//! ```json
//! {"i":"R1","m":0,"sv":[65,120,250],"ss":[65,120,250],"av":[1,0,0],"x":0}
//! ```
//!
//! and the bus receives the same reading with long names and physical units:
//!
//! ```json
//! {
//!   "room_id": "R1",
//!   "mode": "auto",
//!   "sensors": { "pH": { "value": 6.5, "setpoint": 6.5 }, ... },
//!   "actuator_status": { "WATER_PUMP": "ON", ... },
//!   "alerts": { "code": 0 }
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::{CodecError, Result};
use crate::hex;
use crate::schema::{ACTUATORS, SENSORS};

/// Room id published when a frame carries none.
pub const DEFAULT_ROOM_ID: &str = "ESP_Room_Unknown";

/// A telemetry frame as the node sends it. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompactTelemetry {
    /// Room / node id.
    pub i: Option<Value>,
    /// Mode flag: 0 is auto, anything else manual.
    pub m: Option<Value>,
    /// Scaled sensor readings, positional per [`SENSORS`].
    pub sv: Vec<Number>,
    /// Scaled sensor setpoints, positional per [`SENSORS`].
    pub ss: Vec<Number>,
    /// Actuator states, positional per [`ACTUATORS`]; 1 is on.
    pub av: Vec<Value>,
    /// Alert code.
    pub x: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActuatorState {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl fmt::Display for ActuatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuatorState::On => f.write_str("ON"),
            ActuatorState::Off => f.write_str("OFF"),
        }
    }
}

/// One sensor in the verbose schema. A side missing from the frame is
/// omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<Number>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alerts {
    pub code: Value,
}

/// A telemetry frame in the bus schema.
///
/// Sensors and actuators keep table order when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerboseTelemetry {
    pub room_id: Value,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "as_map")]
    pub sensors: Vec<(&'static str, SensorReading)>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "as_map")]
    pub actuator_status: Vec<(&'static str, ActuatorState)>,
    pub alerts: Alerts,
}

impl VerboseTelemetry {
    pub fn sensor(&self, name: &str) -> Option<&SensorReading> {
        self.sensors
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, reading)| reading)
    }

    pub fn actuator(&self, name: &str) -> Option<ActuatorState> {
        self.actuator_status
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, state)| *state)
    }
}

fn as_map<S, V>(entries: &[(&'static str, V)], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
}

/// Parse the JSON text of a telemetry frame.
pub fn decode_telemetry(json: &str) -> Result<CompactTelemetry> {
    Ok(serde_json::from_str(json)?)
}

/// Expand a compact frame into the verbose schema.
///
/// Only positions present in the compact arrays produce output, so partial
/// frames expand to partial sensor and actuator sets.
pub fn compact_to_verbose(compact: &CompactTelemetry) -> Result<VerboseTelemetry> {
    let mut sensors = Vec::new();
    for (idx, sensor) in SENSORS.iter().enumerate() {
        let value = compact
            .sv
            .get(idx)
            .map(|n| unscale(n, sensor.scale, sensor.name))
            .transpose()?;
        let setpoint = compact
            .ss
            .get(idx)
            .map(|n| unscale(n, sensor.scale, sensor.name))
            .transpose()?;
        if value.is_some() || setpoint.is_some() {
            sensors.push((sensor.name, SensorReading { value, setpoint }));
        }
    }

    let actuator_status = ACTUATORS
        .iter()
        .zip(&compact.av)
        .map(|(actuator, raw)| {
            let state = if is_one(raw) {
                ActuatorState::On
            } else {
                ActuatorState::Off
            };
            (actuator.name, state)
        })
        .collect();

    let mode = match compact.m.as_ref().and_then(Value::as_f64) {
        Some(m) if m == 0.0 => Mode::Auto,
        _ => Mode::Manual,
    };

    Ok(VerboseTelemetry {
        room_id: compact
            .i
            .clone()
            .unwrap_or_else(|| Value::String(DEFAULT_ROOM_ID.to_string())),
        mode,
        sensors,
        actuator_status,
        alerts: Alerts {
            code: compact.x.clone().unwrap_or_else(|| Value::from(0)),
        },
    })
}

/// Hex payload of an inbound frame straight to the verbose schema.
pub fn expand_frame_payload(payload_hex: &str) -> Result<VerboseTelemetry> {
    let json = hex::decode_hex(payload_hex)?;
    compact_to_verbose(&decode_telemetry(&json)?)
}

/// Serialize for publishing: two-space indented JSON.
pub fn to_pretty_json(telemetry: &VerboseTelemetry) -> Result<String> {
    Ok(serde_json::to_string_pretty(telemetry)?)
}

/// A scale of 1.0 passes the number through untouched, so integer readings
/// such as CO2 ppm stay integers.
fn unscale(raw: &Number, scale: f64, sensor: &str) -> Result<Number> {
    if scale == 1.0 {
        return Ok(raw.clone());
    }
    raw.as_f64()
        .and_then(|v| Number::from_f64(v / scale))
        .ok_or_else(|| CodecError::invalid_field(sensor, format!("cannot scale {raw}")))
}

fn is_one(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        other => other.as_f64() == Some(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expand(json: &str) -> VerboseTelemetry {
        compact_to_verbose(&decode_telemetry(json).unwrap()).unwrap()
    }

    #[test]
    fn full_frame_expands() {
        let verbose =
            expand(r#"{"i":"R1","m":0,"sv":[65,120,250],"ss":[65,120,250],"av":[1,0,0],"x":0}"#);
        let v = serde_json::to_value(&verbose).unwrap();

        assert_eq!(v["room_id"], "R1");
        assert_eq!(v["mode"], "auto");
        assert_eq!(v["sensors"]["pH"]["value"], json!(6.5));
        assert_eq!(v["sensors"]["EC"]["value"], json!(1.2));
        assert_eq!(v["sensors"]["air_temperature"]["value"], json!(25.0));
        assert_eq!(v["sensors"]["air_temperature"]["setpoint"], json!(25.0));
        assert_eq!(v["actuator_status"]["WATER_PUMP"], "ON");
        assert_eq!(v["actuator_status"]["PH_RELAY"], "OFF");
        assert_eq!(v["actuator_status"]["NUTRIENTS_RELAY"], "OFF");
        assert_eq!(v["alerts"]["code"], 0);
    }

    #[test]
    fn partial_frame_omits_missing_positions() {
        let verbose = expand(r#"{"sv":[70,150,220,900],"ss":[65]}"#);

        assert_eq!(verbose.sensors.len(), 4);
        assert!(verbose.sensor("light").is_none());
        let ph = verbose.sensor("pH").unwrap();
        assert_eq!(ph.setpoint, Number::from_f64(6.5));
        let ec = verbose.sensor("EC").unwrap();
        assert!(ec.setpoint.is_none());
        // CO2 is unscaled and stays an integer.
        assert_eq!(verbose.sensor("CO2").unwrap().value, Some(Number::from(900)));
    }

    #[test]
    fn empty_frame_uses_defaults() {
        let verbose = expand("{}");
        let v = serde_json::to_value(&verbose).unwrap();

        assert_eq!(v["room_id"], DEFAULT_ROOM_ID);
        assert_eq!(v["mode"], "manual");
        assert!(v.get("sensors").is_none());
        assert!(v.get("actuator_status").is_none());
        assert_eq!(v["alerts"]["code"], 0);
    }

    #[test]
    fn mode_flag_mapping() {
        assert_eq!(expand(r#"{"m":0}"#).mode, Mode::Auto);
        assert_eq!(expand(r#"{"m":1}"#).mode, Mode::Manual);
        assert_eq!(expand(r#"{"m":2}"#).mode, Mode::Manual);
    }

    #[test]
    fn actuator_states_and_extra_positions() {
        let verbose = expand(r#"{"av":[0,1]}"#);
        assert_eq!(verbose.actuator("WATER_PUMP"), Some(ActuatorState::Off));
        assert_eq!(verbose.actuator("PH_RELAY"), Some(ActuatorState::On));
        assert_eq!(verbose.actuator("NUTRIENTS_RELAY"), None);

        let verbose = expand(r#"{"av":[1,1,1,1],"sv":[1,2,3,4,5,6]}"#);
        assert_eq!(verbose.actuator_status.len(), 3);
        assert_eq!(verbose.sensors.len(), 5);
    }

    #[test]
    fn alert_code_passes_through() {
        let verbose = expand(r#"{"x":3}"#);
        assert_eq!(verbose.alerts.code, json!(3));
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(decode_telemetry("[1,2]"), Err(CodecError::Json(_))));
        assert!(matches!(decode_telemetry("{\"sv\":"), Err(CodecError::Json(_))));
        assert!(matches!(
            decode_telemetry(r#"{"sv":["a"]}"#),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn pretty_output_keeps_table_order() {
        let verbose = expand(r#"{"i":"R1","m":1,"sv":[65,120],"av":[1]}"#);
        let text = to_pretty_json(&verbose).unwrap();

        assert!(text.starts_with("{\n  \"room_id\": \"R1\""));
        let ph = text.find("\"pH\"").unwrap();
        let ec = text.find("\"EC\"").unwrap();
        assert!(ph < ec);
    }

    #[test]
    fn expand_from_hex() {
        let hex = crate::hex::encode_hex(r#"{"i":"R2","m":0,"x":1}"#);
        let verbose = expand_frame_payload(&hex).unwrap();
        assert_eq!(verbose.room_id, json!("R2"));
        assert_eq!(verbose.alerts.code, json!(1));

        assert!(expand_frame_payload("7B7").is_err());
        assert!(expand_frame_payload("4E4F").is_err());
    }
}
