// Motor registry: logical motor id -> L91 protocol address byte
//
// Address bytes are opaque and come from configuration. The registry keeps
// the table order, which is the order motors are brought up in.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::MotorConfig;

/// Activation progress of a motor controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    #[default]
    Inactive,
    Activated,
    ParametersLoaded,
}

/// A configured motor and what the bridge last did with it
#[derive(Debug, Clone)]
pub struct Motor {
    pub id: u8,
    pub address: u8,
    pub name: Option<String>,
    pub state: ActivationState,
    pub last_speed: f32,
    pub last_command_at: Option<Instant>,
}

impl Motor {
    fn from_config(config: &MotorConfig) -> Self {
        Self {
            id: config.id,
            address: config.address,
            name: config.name.clone(),
            state: ActivationState::Inactive,
            last_speed: 0.0,
            last_command_at: None,
        }
    }
}

/// Owner of all per-motor state
#[derive(Debug, Clone, Default)]
pub struct MotorRegistry {
    motors: Vec<Motor>,
}

impl MotorRegistry {
    /// Build from the motor table (ids are assumed unique; see `BridgeConfig::validate`)
    pub fn new(table: &[MotorConfig]) -> Self {
        Self {
            motors: table.iter().map(Motor::from_config).collect(),
        }
    }

    /// Protocol address byte for a logical motor id
    pub fn lookup(&self, id: u8) -> Option<u8> {
        self.get(id).map(|m| m.address)
    }

    pub fn get(&self, id: u8) -> Option<&Motor> {
        self.motors.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: u8) -> Option<&mut Motor> {
        self.motors.iter_mut().find(|m| m.id == id)
    }

    pub fn state(&self, id: u8) -> Option<ActivationState> {
        self.get(id).map(|m| m.state)
    }

    /// Record a new activation state; returns false for unknown ids
    pub fn set_state(&mut self, id: u8, state: ActivationState) -> bool {
        match self.get_mut(id) {
            Some(motor) => {
                motor.state = state;
                true
            }
            None => false,
        }
    }

    /// Remember the last commanded speed; returns false for unknown ids
    pub fn record_command(&mut self, id: u8, speed: f32, at: Instant) -> bool {
        match self.get_mut(id) {
            Some(motor) => {
                motor.last_speed = speed;
                motor.last_command_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Motors in table order
    pub fn iter(&self) -> impl Iterator<Item = &Motor> {
        self.motors.iter()
    }

    /// Logical ids in table order
    pub fn ids(&self) -> Vec<u8> {
        self.motors.iter().map(|m| m.id).collect()
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<MotorConfig> {
        vec![
            MotorConfig::new(12, 0x34),
            MotorConfig::new(7, 0x3C),
            MotorConfig::new(9, 0x4C),
        ]
    }

    #[test]
    fn test_lookup_uses_table_not_id() {
        let registry = MotorRegistry::new(&table());
        assert_eq!(registry.lookup(12), Some(0x34));
        assert_eq!(registry.lookup(7), Some(0x3C));
        assert_eq!(registry.lookup(9), Some(0x4C));
        assert_eq!(registry.lookup(0x34), None);
        assert_eq!(registry.lookup(5), None);
    }

    #[test]
    fn test_table_order_is_kept() {
        let registry = MotorRegistry::new(&table());
        assert_eq!(registry.ids(), vec![12, 7, 9]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_state_starts_inactive_and_updates() {
        let mut registry = MotorRegistry::new(&table());
        assert!(registry.iter().all(|m| m.state == ActivationState::Inactive));

        assert!(registry.set_state(7, ActivationState::ParametersLoaded));
        assert_eq!(registry.state(7), Some(ActivationState::ParametersLoaded));
        assert_eq!(registry.state(12), Some(ActivationState::Inactive));

        assert!(!registry.set_state(1, ActivationState::Activated));
        assert_eq!(registry.state(1), None);
    }

    #[test]
    fn test_record_command() {
        let mut registry = MotorRegistry::new(&table());
        let now = Instant::now();

        assert!(registry.record_command(9, -0.5, now));
        let motor = registry.get(9).unwrap();
        assert_eq!(motor.last_speed, -0.5);
        assert_eq!(motor.last_command_at, Some(now));

        assert!(!registry.record_command(2, 0.1, now));
    }
}
