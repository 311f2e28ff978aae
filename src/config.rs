// Defaults, topics, motor table and the optional TOML override file
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::motor::transport::DEFAULT_BAUDRATE;

// Serial port of the L91 USB/UART-to-CAN adapter
pub const SERIAL_PORT: &str = "/dev/ttyUSB0";

// SocketCAN interface carrying motor commands
pub const CAN_INTERFACE: &str = "can0";

// Bounded wait for one CAN poll
pub const CAN_POLL_TIMEOUT: Duration = Duration::from_millis(10);

// CAN id low nibbles accepted as motor commands
pub const MOTOR_ID_RANGE: RangeInclusive<u8> = 0x0C..=0x0E;

// Default motor table: (logical id, protocol address byte)
pub const DEFAULT_MOTORS: [(u8, u8); 3] = [(0x0C, 0x0C), (0x0D, 0x0D), (0x0E, 0x0E)];

// Pause between opening the adapter and the first activation frame
pub const STARTUP_GAP: Duration = Duration::from_millis(500);

// Zenoh topics
pub const TOPIC_HEALTH: &str = "l91/state/health"; // bridge health
pub const TOPIC_ORIENTATION: &str = "l91/state/orientation"; // IMU samples

// Status publish period
pub const STATUS_PERIOD: Duration = Duration::from_secs(1);

// Collaborator duties
pub const ORIENTATION_PERIOD: Duration = Duration::from_secs(1);
pub const PULSE_CENTER_US: u32 = 1500;
pub const PULSE_SWEEP_US: u32 = 1800;
pub const SWEEP_PERIOD: Duration = Duration::from_secs(5);
pub const SWEEP_HOLD: Duration = Duration::from_secs(2);

/// Error types for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Motor {id} is listed more than once")]
    DuplicateMotor { id: u8 },

    #[error("Invalid CAN motor id range 0x{min:02X}..=0x{max:02X} (must lie within 0x00..=0x0F)")]
    InvalidIdRange { min: u8, max: u8 },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// How many CAN frames one loop iteration consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogPolicy {
    /// At most one frame per iteration
    #[default]
    SingleFrame,
    /// Drain everything pending, keep the last command per motor
    DrainLatest,
}

/// One entry of the motor table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Logical id, as carried in the CAN id low nibble
    pub id: u8,
    /// L91 protocol address byte
    pub address: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl MotorConfig {
    pub fn new(id: u8, address: u8) -> Self {
        Self {
            id,
            address,
            name: None,
        }
    }
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
            port: SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanConfig {
    pub interface: String,
    pub poll_timeout_ms: u64,
    pub min_motor_id: u8,
    pub max_motor_id: u8,
    pub backlog: BacklogPolicy,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            interface: CAN_INTERFACE.to_string(),
            poll_timeout_ms: CAN_POLL_TIMEOUT.as_millis() as u64,
            min_motor_id: *MOTOR_ID_RANGE.start(),
            max_motor_id: *MOTOR_ID_RANGE.end(),
            backlog: BacklogPolicy::default(),
        }
    }
}

impl CanConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn motor_id_range(&self) -> RangeInclusive<u8> {
        self.min_motor_id..=self.max_motor_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub health_topic: String,
    pub orientation_topic: String,
    pub period_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_topic: TOPIC_HEALTH.to_string(),
            orientation_topic: TOPIC_ORIENTATION.to_string(),
            period_ms: STATUS_PERIOD.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DutyConfig {
    pub orientation_period_ms: u64,
    pub pulse_center_us: u32,
    pub pulse_sweep_us: u32,
    pub sweep_period_ms: u64,
    pub sweep_hold_ms: u64,
}

impl Default for DutyConfig {
    fn default() -> Self {
        Self {
            orientation_period_ms: ORIENTATION_PERIOD.as_millis() as u64,
            pulse_center_us: PULSE_CENTER_US,
            pulse_sweep_us: PULSE_SWEEP_US,
            sweep_period_ms: SWEEP_PERIOD.as_millis() as u64,
            sweep_hold_ms: SWEEP_HOLD.as_millis() as u64,
        }
    }
}

/// Complete bridge configuration, loaded once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub can: CanConfig,
    pub motors: Vec<MotorConfig>,
    pub status: StatusConfig,
    pub duties: DutyConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            can: CanConfig::default(),
            motors: DEFAULT_MOTORS
                .iter()
                .map(|&(id, address)| MotorConfig::new(id, address))
                .collect(),
            status: StatusConfig::default(),
            duties: DutyConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load from a TOML file, or use the built-in defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let (min, max) = (self.can.min_motor_id, self.can.max_motor_id);
        if min > max || max > 0x0F {
            return Err(ConfigError::InvalidIdRange { min, max });
        }

        let mut seen = HashSet::new();
        for motor in &self.motors {
            if !seen.insert(motor.id) {
                return Err(ConfigError::DuplicateMotor { id: motor.id });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::load(None).unwrap();
        assert_eq!(config.serial.baud_rate, 921_600);
        assert_eq!(config.can.poll_timeout(), Duration::from_millis(10));
        assert_eq!(config.can.motor_id_range(), 0x0C..=0x0E);
        assert_eq!(config.can.backlog, BacklogPolicy::SingleFrame);
        assert_eq!(
            config.motors,
            vec![
                MotorConfig::new(0x0C, 0x0C),
                MotorConfig::new(0x0D, 0x0D),
                MotorConfig::new(0x0E, 0x0E)
            ]
        );
    }

    #[test]
    fn test_toml_overrides() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [serial]
            port = "/dev/ttyACM1"

            [can]
            interface = "vcan0"
            backlog = "drain_latest"

            [[motors]]
            id = 12
            address = 0x34
            name = "hip"

            [[motors]]
            id = 13
            address = 0x9C

            [status]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyACM1");
        assert_eq!(config.serial.baud_rate, 921_600);
        assert_eq!(config.can.interface, "vcan0");
        assert_eq!(config.can.backlog, BacklogPolicy::DrainLatest);
        assert_eq!(config.can.min_motor_id, 0x0C);
        assert_eq!(config.motors.len(), 2);
        assert_eq!(config.motors[0].address, 0x34);
        assert_eq!(config.motors[0].name.as_deref(), Some("hip"));
        assert!(!config.status.enabled);
        assert_eq!(config.duties, DutyConfig::default());
    }

    #[test]
    fn test_duplicate_motor_rejected() {
        let err = BridgeConfig::from_toml_str(
            r#"
            [[motors]]
            id = 12
            address = 0x34

            [[motors]]
            id = 12
            address = 0x35
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMotor { id: 12 }));
    }

    #[test]
    fn test_id_range_must_fit_nibble() {
        let err = BridgeConfig::from_toml_str("[can]\nmax_motor_id = 0x10\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdRange { min: 0x0C, max: 0x10 }));

        let err = BridgeConfig::from_toml_str("[can]\nmin_motor_id = 0x0E\nmax_motor_id = 0x0C\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidIdRange { .. }));
    }

    #[test]
    fn test_bad_toml_is_a_parse_error() {
        let err = BridgeConfig::from_toml_str("[[motors]]\nid = \"twelve\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = BridgeConfig::load(Some(Path::new("/nonexistent/l91-bridge.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
