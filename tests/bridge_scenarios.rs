// End-to-end bridge scenarios over in-memory serial and CAN channels

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use l91_can_bridge::can::{self, CanCommandFrame, CanSource};
use l91_can_bridge::config::{BridgeConfig, CanConfig, MotorConfig};
use l91_can_bridge::motor::{
    ActivationState, MotorDriver, MotorRegistry, SerialLink, SerialTransport, frame,
};
use l91_can_bridge::peripherals::IndicatorLevel;
use l91_can_bridge::runtime::Bridge;

/// Serial link shared with the test so writes can be inspected after the bridge takes ownership
#[derive(Clone, Default)]
struct SharedLink {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Per-write byte limits, consumed in order; `None` accepts everything
    limits: Arc<Mutex<VecDeque<Option<usize>>>>,
}

impl SharedLink {
    fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    fn limit_next(&self, limits: impl IntoIterator<Item = Option<usize>>) {
        self.limits.lock().unwrap().extend(limits);
    }
}

impl SerialLink for SharedLink {
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let limit = self.limits.lock().unwrap().pop_front().flatten();
        let n = limit.map_or(bytes.len(), |l| l.min(bytes.len()));
        self.writes.lock().unwrap().push(bytes[..n].to_vec());
        Ok(n)
    }

    fn drain(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct ScriptedCan(VecDeque<CanCommandFrame>);

impl CanSource for ScriptedCan {
    fn poll(&mut self, _wait: Duration) -> can::Result<Option<CanCommandFrame>> {
        Ok(self.0.pop_front())
    }
}

fn table() -> Vec<MotorConfig> {
    vec![
        MotorConfig::new(0x0C, 0x34),
        MotorConfig::new(0x0D, 0x3C),
        MotorConfig::new(0x0E, 0x4C),
    ]
}

fn bridge(link: &SharedLink, frames: Vec<CanCommandFrame>) -> Bridge<SharedLink, ScriptedCan> {
    let driver = MotorDriver::new(
        SerialTransport::new(link.clone()),
        MotorRegistry::new(&table()),
    );
    Bridge::new(
        driver,
        ScriptedCan(frames.into()),
        &CanConfig::default(),
    )
}

#[test]
fn scenario_a_jog_frame_bytes() {
    let jog = frame::jog(0x34, 0.05, frame::JogFlag::Move);
    assert_eq!(
        jog.as_bytes(),
        &[
            0x41, 0x54, 0x90, 0x07, 0xE8, 0x34, 0x08, 0x05, 0x70, 0x00, 0x00, 0x07, 0x01, 0x80,
            0xA4, 0x0D, 0x0A
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn scenario_b_can_frame_becomes_jog() {
    let link = SharedLink::default();
    let mut bridge = bridge(&link, vec![CanCommandFrame::new(0x0C, &[0x40])]);

    assert_eq!(bridge.poll_once().await, 1);

    let speed = 64.0 / 127.0;
    let expected = frame::jog(0x34, speed, frame::JogFlag::Move);
    assert_eq!(link.writes(), vec![expected.as_bytes().to_vec()]);

    let motor = bridge.driver().registry().get(0x0C).unwrap();
    assert!((motor.last_speed - 0.5039).abs() < 1e-4);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_short_activate_still_loads_params() {
    let link = SharedLink::default();
    // Activate of the first motor only gets 8 of 10 bytes out
    link.limit_next([Some(8)]);
    let mut bridge = bridge(&link, vec![]);

    let report = bridge.start().await;

    let writes = link.writes();
    assert_eq!(writes.len(), 6);
    assert_eq!(writes[0].len(), 8);
    assert_eq!(writes[1], frame::load_params(0x34).as_bytes());
    assert_eq!(writes[2], frame::activate(0x3C).as_bytes());

    assert_eq!(
        report.motors,
        vec![
            (0x0C, ActivationState::Inactive),
            (0x0D, ActivationState::ParametersLoaded),
            (0x0E, ActivationState::ParametersLoaded),
        ]
    );

    let health = bridge.health(IndicatorLevel::MotorsReady);
    assert_eq!(health.frames_failed, 1);
    assert_eq!(health.frames_sent, 5);
}

#[tokio::test(start_paused = true)]
async fn jog_reaches_motor_that_failed_bring_up() {
    let link = SharedLink::default();
    link.limit_next([Some(8), Some(3)]);
    let mut bridge = bridge(&link, vec![CanCommandFrame::new(0x0C, &[0x7F])]);

    bridge.start().await;
    assert_eq!(
        bridge.driver().registry().state(0x0C),
        Some(ActivationState::Inactive)
    );

    // the failed LoadParams still holds a quiet period
    assert_eq!(bridge.poll_once().await, 0);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(bridge.poll_once().await, 1);
    let writes = link.writes();
    assert_eq!(writes.last().unwrap(), frame::move_at(0x34, 1.0).as_bytes());
}

#[tokio::test(start_paused = true)]
async fn scenario_d_unknown_identifier_is_discarded() {
    let link = SharedLink::default();
    let mut bridge = bridge(&link, vec![CanCommandFrame::new(0x05, &[0x40])]);

    assert_eq!(bridge.poll_once().await, 0);
    assert!(link.writes().is_empty());
    assert!(
        bridge
            .driver()
            .registry()
            .iter()
            .all(|m| m.state == ActivationState::Inactive && m.last_command_at.is_none())
    );

    // loop keeps going
    assert_eq!(bridge.poll_once().await, 0);
}

#[tokio::test(start_paused = true)]
async fn identical_jogs_are_not_deduplicated() {
    let link = SharedLink::default();
    let frames = vec![
        CanCommandFrame::new(0x0D, &[0x20]),
        CanCommandFrame::new(0x0D, &[0x20]),
    ];
    let mut bridge = bridge(&link, frames);

    bridge.poll_once().await;
    sleep(Duration::from_millis(10)).await;
    bridge.poll_once().await;

    let writes = link.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], writes[1]);
}

#[test]
fn default_config_matches_bridge_wiring() {
    let config = BridgeConfig::load(None).unwrap();
    let registry = MotorRegistry::new(&config.motors);
    for id in config.can.motor_id_range() {
        assert!(registry.lookup(id).is_some(), "motor 0x{:02X} unmapped", id);
    }
}
