// CAN -> L91 bridge loop
//
// Startup: open CAN, open the adapter, run the activation sequence.
// Steady state, one cooperative loop:
//   1. one bounded CAN poll, dispatch any jog command the transport can take
//   2. collaborator duties (IMU read, PWM sweep)
//   3. status publish
// Commands arriving during a quiet period wait in a per-motor slot (last one
// wins) instead of holding up the loop. A failure to open either channel
// disables the motor path for the run; the other duties keep going.

use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

// local imports
use crate::can::{self, CanCommandFrame, CanSource, MotorCommand, extract_command};
use crate::config::{BacklogPolicy, BridgeConfig, CanConfig, DutyConfig, STARTUP_GAP, StatusConfig};
use crate::messages::{BridgeHealth, MotorStatus};
use crate::motor::{MotorDriver, MotorError, SerialLink, StartupReport, TransportError};
use crate::peripherals::{
    Indicator, IndicatorLevel, LogIndicator, LogPulse, NoSensor, OrientationSample,
    OrientationSensor, PulseActuator,
};

/// Upper bound on frames drained in one iteration under `DrainLatest`
const MAX_DRAIN: usize = 64;

/// CAN receiver wired to a motor driver
pub struct Bridge<L: SerialLink, C: CanSource> {
    driver: MotorDriver<L>,
    can: C,
    valid_ids: RangeInclusive<u8>,
    poll_timeout: Duration,
    backlog: BacklogPolicy,
    /// Commands waiting for the transport, at most one per motor
    pending: Vec<MotorCommand>,
    can_frames: u64,
    can_ignored: u64,
}

impl<L: SerialLink, C: CanSource> Bridge<L, C> {
    pub fn new(driver: MotorDriver<L>, can: C, config: &CanConfig) -> Self {
        Self {
            driver,
            can,
            valid_ids: config.motor_id_range(),
            poll_timeout: config.poll_timeout(),
            backlog: config.backlog,
            pending: Vec::new(),
            can_frames: 0,
            can_ignored: 0,
        }
    }

    pub fn driver(&self) -> &MotorDriver<L> {
        &self.driver
    }

    pub fn can(&self) -> &C {
        &self.can
    }

    /// Commands decoded but not yet sent
    pub fn pending(&self) -> &[MotorCommand] {
        &self.pending
    }

    /// Startup phase: activation sequence for every configured motor
    pub async fn start(&mut self) -> StartupReport {
        self.driver.initialize().await
    }

    /// Steady-state CAN duty; returns the number of jog frames sent successfully
    ///
    /// Never waits on the transport. While it is cooling down, new commands
    /// are parked and go out on a later call.
    pub async fn poll_once(&mut self) -> usize {
        let commands: Vec<MotorCommand> = match self.backlog {
            BacklogPolicy::SingleFrame => self
                .next_frame(self.poll_timeout)
                .and_then(|frame| self.decode(&frame))
                .into_iter()
                .collect(),
            BacklogPolicy::DrainLatest => self.drain_latest(),
        };
        for command in commands {
            park(&mut self.pending, command);
        }

        let mut sent = 0;
        while !self.pending.is_empty() && self.driver.is_ready() {
            let command = self.pending.remove(0);
            if self.dispatch(command) {
                sent += 1;
            }
        }
        sent
    }

    fn next_frame(&mut self, wait: Duration) -> Option<CanCommandFrame> {
        match self.can.poll(wait) {
            Ok(Some(frame)) => {
                self.can_frames += 1;
                debug!(id = frame.id, dlc = frame.dlc(), "CAN RX {:02X?}", frame.data());
                Some(frame)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("CAN poll failed: {}", e);
                None
            }
        }
    }

    fn decode(&mut self, frame: &CanCommandFrame) -> Option<MotorCommand> {
        let command = extract_command(frame, &self.valid_ids);
        if command.is_none() {
            self.can_ignored += 1;
        }
        command
    }

    /// Read everything pending and keep the last command per motor
    fn drain_latest(&mut self) -> Vec<MotorCommand> {
        let mut pending: Vec<MotorCommand> = Vec::new();
        let mut wait = self.poll_timeout;

        for _ in 0..MAX_DRAIN {
            let Some(frame) = self.next_frame(wait) else {
                break;
            };
            wait = Duration::ZERO;

            if let Some(command) = self.decode(&frame) {
                park(&mut pending, command);
            }
        }
        pending
    }

    fn dispatch(&mut self, command: MotorCommand) -> bool {
        debug!(
            motor = command.motor_id,
            "-> L91 motor speed {:.3}", command.speed
        );
        match self
            .driver
            .try_jog(command.motor_id, command.speed, command.flag)
        {
            Ok(()) => true,
            Err(MotorError::UnknownMotor { .. }) => {
                self.can_ignored += 1;
                false
            }
            Err(MotorError::Transport(TransportError::Busy { .. })) => {
                self.pending.insert(0, command);
                false
            }
            // already logged by the transport
            Err(MotorError::Transport(_)) => false,
        }
    }

    /// Drop pending commands, then stop and deactivate every motor
    pub async fn shutdown(&mut self) {
        self.pending.clear();
        self.driver.shutdown().await;
    }

    pub fn health(&self, indicator: IndicatorLevel) -> BridgeHealth {
        let stats = self.driver.transport_stats();
        BridgeHealth {
            indicator,
            motor_path: indicator.motor_path_enabled(),
            motors: self.driver.registry().iter().map(MotorStatus::from).collect(),
            frames_sent: stats.sent,
            frames_failed: stats.failed,
            can_frames: self.can_frames,
            can_ignored: self.can_ignored,
        }
    }
}

/// Queue a command, replacing any older one for the same motor
fn park(pending: &mut Vec<MotorCommand>, command: MotorCommand) {
    match pending.iter_mut().find(|p| p.motor_id == command.motor_id) {
        Some(slot) => *slot = command,
        None => pending.push(command),
    }
}

/// PWM sweep phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    Centered { next: Instant },
    Holding { until: Instant },
}

/// Non-motor duties sharing the loop: periodic IMU read and PWM sweep
pub struct Duties {
    sensor: Box<dyn OrientationSensor + Send>,
    pulse: Box<dyn PulseActuator + Send>,
    orientation_period: Duration,
    next_orientation: Instant,
    latest_orientation: Option<OrientationSample>,
    sweep: Sweep,
    pulse_center_us: u32,
    pulse_sweep_us: u32,
    sweep_period: Duration,
    sweep_hold: Duration,
}

impl Duties {
    /// Centers the PWM actuator; the first IMU read is due immediately
    pub fn new(
        config: &DutyConfig,
        sensor: Box<dyn OrientationSensor + Send>,
        mut pulse: Box<dyn PulseActuator + Send>,
        now: Instant,
    ) -> Self {
        pulse.set_pulse_width(config.pulse_center_us);
        let sweep_period = Duration::from_millis(config.sweep_period_ms);
        Self {
            sensor,
            pulse,
            orientation_period: Duration::from_millis(config.orientation_period_ms),
            next_orientation: now,
            latest_orientation: None,
            sweep: Sweep::Centered {
                next: now + sweep_period,
            },
            pulse_center_us: config.pulse_center_us,
            pulse_sweep_us: config.pulse_sweep_us,
            sweep_period,
            sweep_hold: Duration::from_millis(config.sweep_hold_ms),
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if now >= self.next_orientation {
            if let Some(sample) = self.sensor.read_orientation() {
                debug!(
                    "IMU accel={:?} gyro={:?} temp={:.1}C",
                    sample.accel, sample.gyro, sample.temperature
                );
                self.latest_orientation = Some(sample);
            }
            self.next_orientation = now + self.orientation_period;
        }

        self.sweep = match self.sweep {
            Sweep::Centered { next } if now >= next => {
                self.pulse.set_pulse_width(self.pulse_sweep_us);
                Sweep::Holding {
                    until: now + self.sweep_hold,
                }
            }
            Sweep::Holding { until } if now >= until => {
                self.pulse.set_pulse_width(self.pulse_center_us);
                Sweep::Centered {
                    next: now + self.sweep_period,
                }
            }
            unchanged => unchanged,
        };
    }

    pub fn latest_orientation(&self) -> Option<OrientationSample> {
        self.latest_orientation
    }
}

/// Drivers for the collaborators invoked by the loop
pub struct Peripherals {
    pub sensor: Box<dyn OrientationSensor + Send>,
    pub pulse: Box<dyn PulseActuator + Send>,
    pub indicator: Box<dyn Indicator + Send>,
}

impl Default for Peripherals {
    fn default() -> Self {
        Self {
            sensor: Box::new(NoSensor),
            pulse: Box::new(LogPulse::default()),
            indicator: Box::new(LogIndicator::default()),
        }
    }
}

/// Indicator plus the level last shown on it
struct StatusLight {
    indicator: Box<dyn Indicator + Send>,
    level: IndicatorLevel,
}

impl StatusLight {
    fn new(indicator: Box<dyn Indicator + Send>) -> Self {
        Self {
            indicator,
            level: IndicatorLevel::Booting,
        }
    }

    fn set(&mut self, level: IndicatorLevel) {
        self.level = level;
        self.indicator.set_indicator(level);
    }
}

/// Zenoh publishers for bridge health and IMU samples
struct StatusPublisher {
    _session: zenoh::Session,
    health: zenoh::pubsub::Publisher<'static>,
    orientation: zenoh::pubsub::Publisher<'static>,
    period: Duration,
    next: Instant,
}

impl StatusPublisher {
    async fn open(config: &StatusConfig) -> Result<Self, zenoh::Error> {
        info!("Opening Zenoh session...");
        let session = zenoh::open(zenoh::Config::default()).await?;
        let health = session
            .declare_publisher(config.health_topic.clone())
            .await?;
        let orientation = session
            .declare_publisher(config.orientation_topic.clone())
            .await?;
        info!(
            "Publishing to: {}, {}",
            config.health_topic, config.orientation_topic
        );

        Ok(Self {
            _session: session,
            health,
            orientation,
            period: Duration::from_millis(config.period_ms),
            next: Instant::now(),
        })
    }

    async fn publish(&mut self, health: &BridgeHealth, orientation: Option<OrientationSample>) {
        if let Err(e) = self.try_publish(health, orientation).await {
            warn!("Status publish failed: {}", e);
        }
    }

    async fn try_publish(
        &self,
        health: &BridgeHealth,
        orientation: Option<OrientationSample>,
    ) -> Result<(), zenoh::Error> {
        let health_json = serde_json::to_string(health)?;
        self.health.put(health_json).await?;

        if let Some(sample) = orientation {
            let sample_json = serde_json::to_string(&sample)?;
            self.orientation.put(sample_json).await?;
        }
        Ok(())
    }
}

type HardwareBridge = Bridge<Box<dyn serialport::SerialPort>, Box<dyn CanSource + Send>>;

/// Open CAN and the adapter, then bring the motors up
///
/// Returns `None` when either channel fails; the indicator shows which one.
async fn start_motor_path(config: &BridgeConfig, light: &mut StatusLight) -> Option<HardwareBridge> {
    info!("Initializing CAN bus on {}...", config.can.interface);
    connect_motors(can::open(&config.can.interface), config, light).await
}

/// Attach the adapter behind an opened (or failed) CAN source
async fn connect_motors<C: CanSource>(
    can: can::Result<C>,
    config: &BridgeConfig,
    light: &mut StatusLight,
) -> Option<Bridge<Box<dyn serialport::SerialPort>, C>> {
    let can = match can {
        Ok(can) => {
            info!("CAN bus ready (receiving motor commands)");
            light.set(IndicatorLevel::LinkEstablished);
            can
        }
        Err(e) => {
            error!("CAN bus initialization failed, motor service disabled: {}", e);
            light.set(IndicatorLevel::MotorServiceUnavailable);
            return None;
        }
    };

    info!(
        "Initializing L91 motor controller ({} @ {} baud)...",
        config.serial.port, config.serial.baud_rate
    );
    let driver = match MotorDriver::open(&config.serial, &config.motors).await {
        Ok(driver) => driver,
        Err(e) => {
            error!("L91 motor controller initialization failed: {}", e);
            light.set(IndicatorLevel::MotorLinkError);
            return None;
        }
    };
    if driver.registry().is_empty() {
        warn!("Motor table is empty; CAN commands will all be dropped");
    }
    sleep(STARTUP_GAP).await;

    let mut bridge = Bridge::new(driver, can, &config.can);
    bridge.start().await;
    light.set(IndicatorLevel::MotorsReady);
    Some(bridge)
}

/// One steady-state pass: the CAN duty (or an idle wait without a motor
/// path), then the sensor and actuator duties. Returns the tick time.
async fn iterate<L: SerialLink, C: CanSource>(
    bridge: Option<&mut Bridge<L, C>>,
    duties: &mut Duties,
    idle_wait: Duration,
) -> Instant {
    match bridge {
        Some(bridge) => {
            bridge.poll_once().await;
        }
        None => sleep(idle_wait).await,
    }

    let now = Instant::now();
    duties.tick(now);
    now
}

fn health(bridge: Option<&HardwareBridge>, level: IndicatorLevel) -> BridgeHealth {
    match bridge {
        Some(bridge) => bridge.health(level),
        None => BridgeHealth {
            indicator: level,
            ..BridgeHealth::default()
        },
    }
}

pub async fn run(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    run_with(config, Peripherals::default()).await
}

/// Run the bridge with the given collaborator drivers until Ctrl-C
pub async fn run_with(
    config: BridgeConfig,
    peripherals: Peripherals,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("CAN-to-L91 motor bridge starting");

    let mut light = StatusLight::new(peripherals.indicator);
    light.set(IndicatorLevel::Ready);
    let mut duties = Duties::new(
        &config.duties,
        peripherals.sensor,
        peripherals.pulse,
        Instant::now(),
    );

    let mut status = if config.status.enabled {
        match StatusPublisher::open(&config.status).await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Status publishing disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut bridge = start_motor_path(&config, &mut light).await;
    let idle_wait = config.can.poll_timeout();

    info!(
        "Bridge running: motor path {}, CAN poll {}ms, backlog {:?}",
        if bridge.is_some() { "enabled" } else { "disabled" },
        idle_wait.as_millis(),
        config.can.backlog
    );

    let steady_state = async {
        loop {
            // 1. CAN -> L91, 2. sensor and actuator duties
            let now = iterate(bridge.as_mut(), &mut duties, idle_wait).await;

            // 3. Status
            if let Some(status) = status.as_mut() {
                if now >= status.next {
                    let report = health(bridge.as_ref(), light.level);
                    status.publish(&report, duties.latest_orientation()).await;
                    status.next = now + status.period;
                }
            }

            tokio::task::yield_now().await;
        }
    };

    tokio::select! {
        _ = steady_state => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Ctrl-C handler failed: {}", e);
            }
            info!("Shutdown requested");
        }
    }

    if let Some(bridge) = bridge.as_mut() {
        bridge.shutdown().await;
    }
    info!("Bridge stopped");
    Ok(())
}
