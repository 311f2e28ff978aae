// L91 frame encoder
//
// Every frame is an "AT"-prefixed binary command:
// [0x41, 0x54, Format, 0x07, 0xE8, Address, Body..., 0x0D, 0x0A]
//
// Builders are pure: they take the motor's protocol address byte and the
// command parameters and return the bytes to put on the wire.

use std::fmt;
use std::time::Duration;

use super::speed;

/// "AT" prefix
const PREFIX: [u8; 2] = [0x41, 0x54];

/// Fixed base address shared by all motors
const BASE_ADDRESS: [u8; 2] = [0x07, 0xE8];

/// "\r\n" terminator
const TERMINATOR: [u8; 2] = [0x0D, 0x0A];

/// Data length byte of extended frames
const EXTENDED_DATA_LEN: u8 = 0x08;

/// Parameter payload sent by LoadParams
const LOAD_PARAMS_PAYLOAD: [u8; 8] = [0x00, 0xC4, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Jog sub-opcode (MOVE_JOG = 0x0570)
const JOG_OPCODE: [u8; 2] = [0x05, 0x70];

/// Bytes between the jog opcode and the move/stop flag
const JOG_RESERVED: [u8; 3] = [0x00, 0x00, 0x07];

/// Format byte
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Standard = 0x00,
    Extended = 0x20,
    ExtendedJog = 0x90,
}

/// Activation code carried by standard frames
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCode {
    Deactivate = 0x00,
    Activate = 0x01,
}

/// Move/stop flag carried by jog frames
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogFlag {
    Stop = 0,
    Move = 1,
}

impl JogFlag {
    /// Stop for an exact zero speed or NaN, both of which encode as neutral
    pub fn for_speed(speed: f32) -> Self {
        if speed == 0.0 || speed.is_nan() {
            JogFlag::Stop
        } else {
            JogFlag::Move
        }
    }
}

/// Kinds of L91 frames this bridge emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Activate,
    Deactivate,
    LoadParams,
    Jog,
}

impl FrameKind {
    /// Total encoded length in bytes
    pub const fn len(self) -> usize {
        match self {
            FrameKind::Activate | FrameKind::Deactivate => 10,
            FrameKind::LoadParams | FrameKind::Jog => 17,
        }
    }

    /// How long the adapter needs after this frame before it accepts the next one
    pub const fn quiet_period(self) -> Duration {
        match self {
            FrameKind::Jog => Duration::from_millis(10),
            FrameKind::Deactivate => Duration::from_millis(100),
            FrameKind::Activate | FrameKind::LoadParams => Duration::from_millis(200),
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameKind::Activate => "activate",
            FrameKind::Deactivate => "deactivate",
            FrameKind::LoadParams => "load_params",
            FrameKind::Jog => "jog",
        };
        f.write_str(name)
    }
}

/// An encoded L91 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    bytes: Vec<u8>,
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Motor address byte the frame is aimed at
    pub fn address(&self) -> u8 {
        self.bytes[5]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Build a frame: header, body, terminator
fn build_frame(kind: FrameKind, format: Format, address: u8, body: &[u8]) -> Frame {
    let mut bytes = Vec::with_capacity(kind.len());

    bytes.extend_from_slice(&PREFIX);
    bytes.push(format as u8);
    bytes.extend_from_slice(&BASE_ADDRESS);
    bytes.push(address);
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(&TERMINATOR);

    debug_assert_eq!(bytes.len(), kind.len());
    Frame { kind, bytes }
}

/// Enable the motor controller
pub fn activate(address: u8) -> Frame {
    build_frame(
        FrameKind::Activate,
        Format::Standard,
        address,
        &[ActivationCode::Activate as u8, 0x00],
    )
}

/// Disable the motor controller
pub fn deactivate(address: u8) -> Frame {
    build_frame(
        FrameKind::Deactivate,
        Format::Standard,
        address,
        &[ActivationCode::Deactivate as u8, 0x00],
    )
}

/// Load the fixed parameter set used for jog control
pub fn load_params(address: u8) -> Frame {
    let mut body = [0u8; 1 + LOAD_PARAMS_PAYLOAD.len()];
    body[0] = EXTENDED_DATA_LEN;
    body[1..].copy_from_slice(&LOAD_PARAMS_PAYLOAD);
    build_frame(FrameKind::LoadParams, Format::Extended, address, &body)
}

/// Jog at `speed` (normalized, clamped to [-1.0, 1.0]) with an explicit move/stop flag
pub fn jog(address: u8, speed: f32, flag: JogFlag) -> Frame {
    let [speed_hi, speed_lo] = speed::to_wire_bytes(speed::encode(speed));

    let mut body = Vec::with_capacity(9);
    body.push(EXTENDED_DATA_LEN);
    body.extend_from_slice(&JOG_OPCODE);
    body.extend_from_slice(&JOG_RESERVED);
    body.push(flag as u8);
    body.push(speed_hi);
    body.push(speed_lo);

    build_frame(FrameKind::Jog, Format::ExtendedJog, address, &body)
}

/// Jog with the flag derived from the speed
pub fn move_at(address: u8, speed: f32) -> Frame {
    jog(address, speed, JogFlag::for_speed(speed))
}

/// Stop the motor (zero speed, stop flag)
pub fn stop(address: u8) -> Frame {
    jog(address, 0.0, JogFlag::Stop)
}
