//! Positional schema shared with the remote node's firmware.
//!
//! The compact messages on the radio carry sensor readings, setpoints, and
//! actuator states as bare arrays. Position in those arrays is the only thing
//! that says which sensor or actuator a number belongs to, so these tables
//! must stay in the firmware's order.

/// One sensor channel in the compact `sv`/`ss` arrays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorDescriptor {
    /// Key in the verbose `sensors` object.
    pub name: &'static str,
    /// Firmware-side name of the reading.
    pub value_key: &'static str,
    /// Firmware-side name of the setpoint.
    pub setpoint_key: &'static str,
    /// The node sends `round(value * scale)`; 1.0 means the compact value is
    /// already in physical units.
    pub scale: f64,
    pub unit: &'static str,
}

/// One actuator channel in the compact `av` array and `act` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorDescriptor {
    /// Key used on the radio link.
    pub key: &'static str,
    /// Name used on the bus.
    pub name: &'static str,
}

/// One entry of the auto command's `sp` array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointDescriptor {
    /// Key in the inbound `setpoints` document.
    pub name: &'static str,
    pub scale: f64,
    /// Used when the document omits this setpoint.
    pub default: f64,
}

pub static SENSORS: [SensorDescriptor; 5] = [
    SensorDescriptor {
        name: "pH",
        value_key: "ph_v",
        setpoint_key: "ph_sp",
        scale: 10.0,
        unit: "",
    },
    SensorDescriptor {
        name: "EC",
        value_key: "ec_v",
        setpoint_key: "ec_sp",
        scale: 100.0,
        unit: "",
    },
    SensorDescriptor {
        name: "air_temperature",
        value_key: "at_v",
        setpoint_key: "at_sp",
        scale: 10.0,
        unit: "C",
    },
    SensorDescriptor {
        name: "CO2",
        value_key: "co2_v",
        setpoint_key: "co2_sp",
        scale: 1.0,
        unit: "ppm",
    },
    SensorDescriptor {
        name: "light",
        value_key: "lt_v",
        setpoint_key: "lt_sp",
        scale: 1.0,
        unit: "",
    },
];

pub static ACTUATORS: [ActuatorDescriptor; 3] = [
    ActuatorDescriptor {
        key: "wp",
        name: "WATER_PUMP",
    },
    ActuatorDescriptor {
        key: "phr",
        name: "PH_RELAY",
    },
    ActuatorDescriptor {
        key: "nr",
        name: "NUTRIENTS_RELAY",
    },
];

pub static SETPOINTS: [SetpointDescriptor; 6] = [
    SetpointDescriptor {
        name: "pH",
        scale: 10.0,
        default: 6.5,
    },
    SetpointDescriptor {
        name: "EC",
        scale: 100.0,
        default: 1.2,
    },
    SetpointDescriptor {
        name: "temperature",
        scale: 10.0,
        default: 25.0,
    },
    SetpointDescriptor {
        name: "humidity",
        scale: 1.0,
        default: 60.0,
    },
    SetpointDescriptor {
        name: "CO2",
        scale: 1.0,
        default: 800.0,
    },
    SetpointDescriptor {
        name: "light",
        scale: 1.0,
        default: 300.0,
    },
];

/// Look up an actuator by the last segment of a command topic.
///
/// Matches either the compact key or the verbose name, ignoring case, and
/// returns the actuator's position in [`ACTUATORS`].
pub fn actuator_by_topic_name(name: &str) -> Option<(usize, &'static ActuatorDescriptor)> {
    let name = name.trim();
    ACTUATORS
        .iter()
        .enumerate()
        .find(|(_, a)| a.key.eq_ignore_ascii_case(name) || a.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_firmware() {
        let names: Vec<_> = SENSORS.iter().map(|s| s.name).collect();
        assert_eq!(names, ["pH", "EC", "air_temperature", "CO2", "light"]);
        let keys: Vec<_> = ACTUATORS.iter().map(|a| a.key).collect();
        assert_eq!(keys, ["wp", "phr", "nr"]);
        assert_eq!(SETPOINTS.len(), 6);
    }

    #[test]
    fn actuator_lookup_accepts_both_names() {
        assert_eq!(actuator_by_topic_name("wp").map(|(i, _)| i), Some(0));
        assert_eq!(actuator_by_topic_name("WP").map(|(i, _)| i), Some(0));
        assert_eq!(actuator_by_topic_name("ph_relay").map(|(i, _)| i), Some(1));
        assert_eq!(
            actuator_by_topic_name("NUTRIENTS_RELAY").map(|(_, a)| a.key),
            Some("nr")
        );
        assert!(actuator_by_topic_name("fan").is_none());
        assert!(actuator_by_topic_name("").is_none());
    }
}
