// High-level L91 motor driver
//
// Combines the motor registry, frame encoder and serial transport into a
// simple API: bring motors up, jog them, stop and deactivate them.

use serialport::SerialPort;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::frame::{self, JogFlag};
use super::registry::{ActivationState, MotorRegistry};
use super::transport::{SerialLink, SerialTransport, TransportError, TransportStats};
use crate::config::{MotorConfig, SerialConfig};

/// Error types for motor commands
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Motor {id} is not in the motor table")]
    UnknownMotor { id: u8 },
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Outcome of the startup activation sequence, in table order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub motors: Vec<(u8, ActivationState)>,
}

impl StartupReport {
    pub fn all_loaded(&self) -> bool {
        self.motors
            .iter()
            .all(|&(_, state)| state == ActivationState::ParametersLoaded)
    }

    pub fn failed(&self) -> impl Iterator<Item = u8> + '_ {
        self.motors
            .iter()
            .filter(|&&(_, state)| state != ActivationState::ParametersLoaded)
            .map(|&(id, _)| id)
    }
}

/// High-level driver for the motors behind one L91 adapter
pub struct MotorDriver<L: SerialLink = Box<dyn SerialPort>> {
    transport: SerialTransport<L>,
    registry: MotorRegistry,
}

impl MotorDriver<Box<dyn SerialPort>> {
    /// Open the adapter port and load the motor table
    pub async fn open(serial: &SerialConfig, motors: &[MotorConfig]) -> Result<Self> {
        let transport = SerialTransport::open_with_baudrate(&serial.port, serial.baud_rate).await?;
        Ok(Self::new(transport, MotorRegistry::new(motors)))
    }
}

impl<L: SerialLink> MotorDriver<L> {
    pub fn new(transport: SerialTransport<L>, registry: MotorRegistry) -> Self {
        Self {
            transport,
            registry,
        }
    }

    pub fn registry(&self) -> &MotorRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &SerialTransport<L> {
        &self.transport
    }

    pub fn transport_stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// True once the last frame's quiet period has elapsed
    pub fn is_ready(&mut self) -> bool {
        self.transport.is_ready()
    }

    /// Wait out the current quiet period
    pub async fn ready(&mut self) {
        self.transport.ready().await
    }

    fn address(&self, id: u8) -> Result<u8> {
        self.registry
            .lookup(id)
            .ok_or(MotorError::UnknownMotor { id })
    }

    /// Run Activate then LoadParams for every motor in table order
    ///
    /// A failure on one motor is logged and never stops the others.
    pub async fn initialize(&mut self) -> StartupReport {
        info!("Initializing motors {:?}", self.registry.ids());

        let mut report = StartupReport::default();
        for id in self.registry.ids() {
            match self.bring_up(id).await {
                Ok(state) => report.motors.push((id, state)),
                Err(e) => warn!(motor = id, "Bring-up skipped: {}", e),
            }
        }

        if report.all_loaded() {
            info!("Motors initialized successfully");
        } else {
            warn!(
                "Motor initialization incomplete: {:?}",
                report.failed().collect::<Vec<_>>()
            );
        }
        report
    }

    /// Activate then load parameters for one motor, recording the resulting state
    ///
    /// LoadParams is sent even when Activate fails.
    pub async fn bring_up(&mut self, id: u8) -> Result<ActivationState> {
        let address = self.address(id)?;

        let activated = match self.transport.send_when_ready(&frame::activate(address)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(motor = id, "Activate failed: {}", e);
                false
            }
        };

        let loaded = match self.transport.send_when_ready(&frame::load_params(address)).await {
            Ok(_) => true,
            Err(e) => {
                warn!(motor = id, "LoadParams failed: {}", e);
                false
            }
        };

        let state = match (activated, loaded) {
            (true, true) => ActivationState::ParametersLoaded,
            (true, false) => ActivationState::Activated,
            (false, _) => ActivationState::Inactive,
        };
        self.registry.set_state(id, state);
        info!(motor = id, address, ?state, "Motor bring-up finished");
        Ok(state)
    }

    /// Send a jog frame
    ///
    /// Activation state is not checked: motors that failed bring-up still get jogged.
    pub async fn jog(&mut self, id: u8, speed: f32, flag: JogFlag) -> Result<()> {
        self.address(id)?;
        self.transport.ready().await;
        self.try_jog(id, speed, flag)
    }

    /// Send a jog frame without waiting
    ///
    /// Fails with `Busy` while the transport is cooling down; the command is
    /// not recorded in that case since nothing went out.
    pub fn try_jog(&mut self, id: u8, speed: f32, flag: JogFlag) -> Result<()> {
        let address = self.address(id)?;
        let jog = frame::jog(address, speed, flag);
        debug!(motor = id, speed, ?flag, "Jog");

        let result = self.transport.send(&jog);
        if !matches!(result, Err(TransportError::Busy { .. })) {
            self.registry.record_command(id, speed, Instant::now());
        }
        result?;
        Ok(())
    }

    /// Jog with the move/stop flag derived from the speed
    pub async fn move_motor(&mut self, id: u8, speed: f32) -> Result<()> {
        self.jog(id, speed, JogFlag::for_speed(speed)).await
    }

    /// Zero speed with the stop flag
    pub async fn stop(&mut self, id: u8) -> Result<()> {
        self.jog(id, 0.0, JogFlag::Stop).await
    }

    /// Send Deactivate; a successful send returns the motor to `Inactive`
    pub async fn deactivate(&mut self, id: u8) -> Result<()> {
        let address = self.address(id)?;
        self.transport
            .send_when_ready(&frame::deactivate(address))
            .await?;
        self.registry.set_state(id, ActivationState::Inactive);
        Ok(())
    }

    /// Jog for `duration`, then stop and deactivate whatever happened
    ///
    /// Returns the first error, after the stop and deactivate were attempted.
    pub async fn jog_for(&mut self, id: u8, speed: f32, duration: Duration) -> Result<()> {
        let moved = self.move_motor(id, speed).await;
        match &moved {
            Ok(()) => sleep(duration).await,
            Err(e) => warn!(motor = id, "Jog failed: {}", e),
        }

        let stopped = self.stop(id).await;
        if let Err(e) = &stopped {
            warn!(motor = id, "Failed to stop motor: {}", e);
        }
        let deactivated = self.deactivate(id).await;
        if let Err(e) = &deactivated {
            warn!(motor = id, "Failed to deactivate motor: {}", e);
        }
        moved.and(stopped).and(deactivated)
    }

    /// Stop then deactivate every motor, logging failures
    pub async fn shutdown(&mut self) {
        info!("Stopping and deactivating all motors");
        for id in self.registry.ids() {
            if let Err(e) = self.stop(id).await {
                warn!(motor = id, "Failed to stop motor: {}", e);
            }
            if let Err(e) = self.deactivate(id).await {
                warn!(motor = id, "Failed to deactivate motor: {}", e);
            }
        }
    }
}
