//! Bus commands translated to the compact schema sent to the node.
//!
//! Two command families exist. An auto command carries a setpoint document
//! and puts the node in automatic mode:
//!
//! ```json
//! {"crop_variety":"Lettuce","setpoints":{"pH":6.0,"EC":1.5}}
//! ```
//!
//! becomes `{"md":0,"cv":"Lettuce","sp":[60,150,250,60,800,300]}`. A manual
//! command switches a single actuator and puts the node in manual mode:
//! topic suffix `wp` with payload `ON` becomes
//! `{"md":1,"act":{"wp":1,"phr":0,"nr":0}}`.
//!
//! Commands use `md` for the mode flag where telemetry uses `m`; the node's
//! firmware expects exactly that.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{CodecError, Result};
use crate::hex;
use crate::schema::{self, ACTUATORS, SETPOINTS};

/// Crop variety sent when the auto document names none.
pub const DEFAULT_CROP_VARIETY: &str = "Unknown";

/// Mode flag value for automatic control.
pub const MODE_AUTO: u8 = 0;
/// Mode flag value for manual actuator control.
pub const MODE_MANUAL: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoCommand {
    pub md: u8,
    pub cv: String,
    /// Scaled setpoints, positional per [`SETPOINTS`].
    pub sp: [i64; 6],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManualCommand {
    pub md: u8,
    pub act: ActuatorStates,
}

/// On/off state for every known actuator, serialized as an object keyed by
/// compact actuator key in table order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorStates([bool; 3]);

impl ActuatorStates {
    pub fn get(&self, key: &str) -> Option<bool> {
        ACTUATORS
            .iter()
            .position(|a| a.key == key)
            .map(|idx| self.0[idx])
    }
}

impl Serialize for ActuatorStates {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(ACTUATORS.len()))?;
        for (actuator, on) in ACTUATORS.iter().zip(self.0) {
            map.serialize_entry(actuator.key, &u8::from(on))?;
        }
        map.end()
    }
}

/// A command ready for the radio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Command {
    Auto(AutoCommand),
    Manual(ManualCommand),
}

impl Command {
    /// Compact JSON, no whitespace.
    pub fn to_compact_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Compact JSON as a hex payload no longer than `budget` characters.
    pub fn encode(&self, budget: usize) -> Result<String> {
        hex::encode_payload(&self.to_compact_json()?, budget)
    }
}

/// Build an auto command from the bus's setpoint document.
///
/// Each setpoint is multiplied by its scale and truncated toward zero.
/// Setpoints missing from the document take their defaults.
pub fn build_auto_command(document: &str) -> Result<Command> {
    let doc: Value = serde_json::from_str(document)?;
    let doc = doc
        .as_object()
        .ok_or_else(|| CodecError::invalid_field("document", "expected a JSON object"))?;

    let cv = match doc.get("crop_variety") {
        None => DEFAULT_CROP_VARIETY.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(CodecError::invalid_field(
                "crop_variety",
                format!("expected a string, found {other}"),
            ));
        }
    };

    let empty = Map::new();
    let setpoints = match doc.get("setpoints") {
        None => &empty,
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(CodecError::invalid_field(
                "setpoints",
                format!("expected an object, found {other}"),
            ));
        }
    };

    let mut sp = [0i64; 6];
    for (slot, desc) in sp.iter_mut().zip(SETPOINTS.iter()) {
        let value = match setpoints.get(desc.name) {
            None => desc.default,
            Some(raw) => raw.as_f64().ok_or_else(|| {
                CodecError::invalid_field(desc.name, format!("expected a number, found {raw}"))
            })?,
        };
        *slot = (value * desc.scale) as i64;
    }

    Ok(Command::Auto(AutoCommand {
        md: MODE_AUTO,
        cv,
        sp,
    }))
}

/// Build a manual command from an actuator topic suffix and an ON/OFF
/// payload. Every other actuator is set OFF.
pub fn build_manual_command(actuator: &str, payload: &str) -> Result<Command> {
    let (idx, _) = schema::actuator_by_topic_name(actuator)
        .ok_or_else(|| CodecError::UnknownActuator(actuator.to_string()))?;

    let state = payload.trim();
    let on = if state.eq_ignore_ascii_case("ON") {
        true
    } else if state.eq_ignore_ascii_case("OFF") {
        false
    } else {
        return Err(CodecError::InvalidState(payload.to_string()));
    };

    let mut states = ActuatorStates::default();
    states.0[idx] = on;
    Ok(Command::Manual(ManualCommand {
        md: MODE_MANUAL,
        act: states,
    }))
}
