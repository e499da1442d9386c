//! Gateway configuration.
//!
//! Loaded from a TOML file. Every field has a default, so an empty file
//! describes the stock single-room gateway:
//!
//! ```toml
//! reset_on_start = false
//!
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [radio]
//! frequency_hz = 869525000
//! spreading_factor = 7
//!
//! [mqtt]
//! host = "localhost"
//! port = 1883
//!
//! [topics]
//! telemetry = "hydroponics/room1/telemetry_verbose"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lorabridge_core::types::RadioConfig;
use lorabridge_rak::Timing;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Restart the module before bring-up.
    pub reset_on_start: bool,
    pub serial: SerialConfig,
    pub radio: RadioConfig,
    pub timing: TimingConfig,
    pub mqtt: MqttConfig,
    pub topics: TopicConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        }
    }
}

/// Settle delays and response windows, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub port_settle_ms: u64,
    pub after_version_ms: u64,
    pub after_work_mode_ms: u64,
    pub after_p2p_config_ms: u64,
    pub before_mode_switch_ms: u64,
    pub after_send_ms: u64,
    pub at_timeout_ms: u64,
    pub work_mode_timeout_ms: u64,
    pub mode_switch_timeout_ms: u64,
    pub send_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self::from(&Timing::default())
    }
}

impl From<&Timing> for TimingConfig {
    fn from(t: &Timing) -> Self {
        let ms = |d: Duration| d.as_millis() as u64;
        Self {
            port_settle_ms: ms(t.port_settle),
            after_version_ms: ms(t.after_version),
            after_work_mode_ms: ms(t.after_work_mode),
            after_p2p_config_ms: ms(t.after_p2p_config),
            before_mode_switch_ms: ms(t.before_mode_switch),
            after_send_ms: ms(t.after_send),
            at_timeout_ms: ms(t.at_timeout),
            work_mode_timeout_ms: ms(t.work_mode_timeout),
            mode_switch_timeout_ms: ms(t.mode_switch_timeout),
            send_timeout_ms: ms(t.send_timeout),
        }
    }
}

impl From<&TimingConfig> for Timing {
    fn from(c: &TimingConfig) -> Self {
        Timing {
            port_settle: Duration::from_millis(c.port_settle_ms),
            after_version: Duration::from_millis(c.after_version_ms),
            after_work_mode: Duration::from_millis(c.after_work_mode_ms),
            after_p2p_config: Duration::from_millis(c.after_p2p_config_ms),
            before_mode_switch: Duration::from_millis(c.before_mode_switch_ms),
            after_send: Duration::from_millis(c.after_send_ms),
            at_timeout: Duration::from_millis(c.at_timeout_ms),
            work_mode_timeout: Duration::from_millis(c.work_mode_timeout_ms),
            mode_switch_timeout: Duration::from_millis(c.mode_switch_timeout_ms),
            send_timeout: Duration::from_millis(c.send_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "lorabridge".to_string(),
            keep_alive_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Verbose telemetry is published here.
    pub telemetry: String,
    /// Setpoint documents arrive here.
    pub auto_command: String,
    /// Prefix of the per-actuator command topics, `<prefix>/<actuator>`.
    pub actuator_command: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            telemetry: "hydroponics/room1/telemetry_verbose".to_string(),
            auto_command: "hydroponics/room1/command/auto".to_string(),
            actuator_command: "hydroponics/room1/command/actuator".to_string(),
        }
    }
}

impl TopicConfig {
    /// Subscription filter covering every actuator command topic.
    pub fn actuator_filter(&self) -> String {
        format!("{}/#", self.actuator_command)
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Protocol timing as the radio driver uses it.
    pub fn timing(&self) -> Timing {
        Timing::from(&self.timing)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Invalid("serial.port is empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be non-zero".into()));
        }

        self.radio
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("radio: {e}")))?;

        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.host is empty".into()));
        }
        if self.mqtt.port == 0 {
            return Err(ConfigError::Invalid("mqtt.port must be non-zero".into()));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Invalid("mqtt.client_id is empty".into()));
        }

        for (name, topic) in [
            ("telemetry", &self.topics.telemetry),
            ("auto_command", &self.topics.auto_command),
            ("actuator_command", &self.topics.actuator_command),
        ] {
            if topic.is_empty() {
                return Err(ConfigError::Invalid(format!("topics.{name} is empty")));
            }
            if topic.contains(['#', '+']) {
                return Err(ConfigError::Invalid(format!(
                    "topics.{name} must not contain MQTT wildcards: {topic}"
                )));
            }
        }
        if self.topics.actuator_command.ends_with('/') {
            return Err(ConfigError::Invalid(
                "topics.actuator_command must not end with '/'".into(),
            ));
        }

        let t = &self.timing;
        if t.at_timeout_ms == 0
            || t.work_mode_timeout_ms == 0
            || t.mode_switch_timeout_ms == 0
            || t.send_timeout_ms == 0
        {
            return Err(ConfigError::Invalid("AT timeouts must be non-zero".into()));
        }

        Ok(())
    }
}
