// Status messages published by the bridge

use serde::{Deserialize, Serialize};

use crate::motor::registry::{ActivationState, Motor};
use crate::peripherals::IndicatorLevel;

/// Per-motor view in the health message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorStatus {
    pub id: u8,
    pub address: u8,
    pub state: ActivationState,
    pub last_speed: f32,
}

impl From<&Motor> for MotorStatus {
    fn from(motor: &Motor) -> Self {
        Self {
            id: motor.id,
            address: motor.address,
            state: motor.state,
            last_speed: motor.last_speed,
        }
    }
}

/// Health status published by the bridge
// Counters are zero and `motors` is empty when the motor path is disabled
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BridgeHealth {
    pub indicator: IndicatorLevel,
    pub motor_path: bool,
    pub motors: Vec<MotorStatus>,
    pub frames_sent: u64,
    pub frames_failed: u64,
    pub can_frames: u64,
    pub can_ignored: u64,
}
