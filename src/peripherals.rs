// Collaborator seams: IMU, PWM actuator and status indicator
//
// The bridge only calls these; drivers live outside this crate. The default
// implementations log through tracing so the bridge runs on a bare host.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One IMU sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    /// m/s^2
    pub accel: [f32; 3],
    /// rad/s
    pub gyro: [f32; 3],
    /// degrees C
    pub temperature: f32,
}

/// Status indicator levels, one per bridge condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorLevel {
    #[default]
    Booting,
    /// Host side up, motor path not yet started
    Ready,
    /// CAN bus listening
    LinkEstablished,
    /// Startup activation sequence finished
    MotorsReady,
    /// CAN could not be opened; motor path disabled for this run
    MotorServiceUnavailable,
    /// Serial adapter could not be opened; motor path disabled for this run
    MotorLinkError,
}

impl IndicatorLevel {
    /// RGB pattern of the original status LED
    pub fn rgb(self) -> (bool, bool, bool) {
        match self {
            IndicatorLevel::Booting => (false, false, false),
            IndicatorLevel::Ready => (false, true, false),
            IndicatorLevel::LinkEstablished => (false, false, true),
            IndicatorLevel::MotorsReady => (false, true, true),
            IndicatorLevel::MotorServiceUnavailable => (true, false, false),
            IndicatorLevel::MotorLinkError => (true, true, false),
        }
    }

    /// Whether the motor path is still usable in this state
    pub fn motor_path_enabled(self) -> bool {
        !matches!(
            self,
            IndicatorLevel::MotorServiceUnavailable | IndicatorLevel::MotorLinkError
        )
    }
}

/// Poll-style inertial sensor
pub trait OrientationSensor {
    /// Latest sample, or `None` when no sensor is fitted
    fn read_orientation(&mut self) -> Option<OrientationSample>;
}

/// PWM actuator driven independently of the motors
pub trait PulseActuator {
    fn set_pulse_width(&mut self, micros: u32);
}

/// Status indicator
pub trait Indicator {
    fn set_indicator(&mut self, level: IndicatorLevel);
}

/// Sensor stand-in for hosts without an IMU
#[derive(Debug, Default)]
pub struct NoSensor;

impl OrientationSensor for NoSensor {
    fn read_orientation(&mut self) -> Option<OrientationSample> {
        None
    }
}

/// Actuator that only logs the requested pulse width
#[derive(Debug, Default)]
pub struct LogPulse {
    last: Option<u32>,
}

impl PulseActuator for LogPulse {
    fn set_pulse_width(&mut self, micros: u32) {
        if self.last != Some(micros) {
            debug!("PWM pulse width -> {}us", micros);
        }
        self.last = Some(micros);
    }
}

/// Indicator that logs transitions
#[derive(Debug, Default)]
pub struct LogIndicator {
    level: IndicatorLevel,
}

impl LogIndicator {
    pub fn level(&self) -> IndicatorLevel {
        self.level
    }
}

impl Indicator for LogIndicator {
    fn set_indicator(&mut self, level: IndicatorLevel) {
        if self.level != level {
            let (r, g, b) = level.rgb();
            info!(?level, "Indicator -> rgb({}, {}, {})", r as u8, g as u8, b as u8);
        }
        self.level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_levels_disable_motor_path() {
        assert!(IndicatorLevel::MotorsReady.motor_path_enabled());
        assert!(IndicatorLevel::LinkEstablished.motor_path_enabled());
        assert!(!IndicatorLevel::MotorServiceUnavailable.motor_path_enabled());
        assert!(!IndicatorLevel::MotorLinkError.motor_path_enabled());
    }

    #[test]
    fn test_error_levels_are_distinct() {
        assert_ne!(
            IndicatorLevel::MotorServiceUnavailable.rgb(),
            IndicatorLevel::MotorLinkError.rgb()
        );
        assert_eq!(IndicatorLevel::MotorsReady.rgb(), (false, true, true));
    }

    #[test]
    fn test_log_indicator_tracks_level() {
        let mut indicator = LogIndicator::default();
        assert_eq!(indicator.level(), IndicatorLevel::Booting);
        indicator.set_indicator(IndicatorLevel::Ready);
        assert_eq!(indicator.level(), IndicatorLevel::Ready);
    }
}
