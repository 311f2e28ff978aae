// CAN receiver: bounded polling and motor command extraction
//
// Command frames: the low nibble of the identifier is the logical motor id,
// payload byte 0 is a signed normalized speed (-128..127 -> -1.0..1.0).

use std::io;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::motor::frame::JogFlag;

/// Maximum payload of a classic CAN frame
pub const MAX_DLC: usize = 8;

/// Error types for the CAN receiver
#[derive(Debug, thiserror::Error)]
pub enum CanError {
    #[error("Failed to open CAN interface {interface}: {source}")]
    Open {
        interface: String,
        source: io::Error,
    },

    #[error("CAN IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CAN is not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, CanError>;

/// A received CAN frame, reduced to what the bridge consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanCommandFrame {
    pub id: u32,
    data: [u8; MAX_DLC],
    len: usize,
}

impl CanCommandFrame {
    /// Payloads longer than 8 bytes are truncated
    pub fn new(id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_DLC);
        let mut data = [0u8; MAX_DLC];
        data[..len].copy_from_slice(&payload[..len]);
        Self { id, data, len }
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn dlc(&self) -> usize {
        self.len
    }

    /// Low nibble of the identifier
    pub fn motor_nibble(&self) -> u8 {
        (self.id & 0x0F) as u8
    }
}

/// A jog request decoded from a CAN frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorCommand {
    pub motor_id: u8,
    pub speed: f32,
    pub flag: JogFlag,
}

/// Signed speed byte -> normalized speed
pub fn speed_from_byte(raw: u8) -> f32 {
    (raw as i8 as f32 / 127.0).clamp(-1.0, 1.0)
}

/// Decode a motor command, or `None` for frames the bridge ignores
pub fn extract_command(
    frame: &CanCommandFrame,
    valid_ids: &RangeInclusive<u8>,
) -> Option<MotorCommand> {
    let motor_id = frame.motor_nibble();
    if !valid_ids.contains(&motor_id) {
        return None;
    }
    let &raw = frame.data().first()?;

    let speed = speed_from_byte(raw);
    Some(MotorCommand {
        motor_id,
        speed,
        flag: JogFlag::for_speed(speed),
    })
}

/// Source of CAN frames with a bounded wait
pub trait CanSource {
    /// Wait at most `wait` for one frame
    fn poll(&mut self, wait: Duration) -> Result<Option<CanCommandFrame>>;
}

impl<S: CanSource + ?Sized> CanSource for Box<S> {
    fn poll(&mut self, wait: Duration) -> Result<Option<CanCommandFrame>> {
        (**self).poll(wait)
    }
}

#[cfg(target_os = "linux")]
pub use socket::SocketCanSource;

#[cfg(target_os = "linux")]
mod socket {
    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket};
    use std::io;
    use std::time::Duration;
    use tracing::{debug, info};

    use super::{CanCommandFrame, CanError, CanSource, Result};

    /// SocketCAN receiver
    pub struct SocketCanSource {
        socket: CanSocket,
        read_timeout: Option<Duration>,
    }

    impl SocketCanSource {
        pub fn open(interface: &str) -> Result<Self> {
            let socket = CanSocket::open(interface).map_err(|source| CanError::Open {
                interface: interface.to_string(),
                source,
            })?;
            info!("CAN bus open on {}", interface);
            Ok(Self {
                socket,
                read_timeout: None,
            })
        }
    }

    impl CanSource for SocketCanSource {
        fn poll(&mut self, wait: Duration) -> Result<Option<CanCommandFrame>> {
            // a zero socket timeout means "block forever"
            let wait = wait.max(Duration::from_micros(1));
            if self.read_timeout != Some(wait) {
                self.socket.set_read_timeout(wait)?;
                self.read_timeout = Some(wait);
            }

            let frame = match self.socket.read_frame() {
                Ok(frame) => frame,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            match frame {
                CanFrame::Data(frame) => {
                    let id = match frame.id() {
                        Id::Standard(id) => id.as_raw() as u32,
                        Id::Extended(id) => id.as_raw(),
                    };
                    Ok(Some(CanCommandFrame::new(id, frame.data())))
                }
                other => {
                    debug!("Ignoring non-data CAN frame: {:?}", other);
                    Ok(None)
                }
            }
        }
    }
}

/// Open the platform CAN receiver on `interface`
pub fn open(interface: &str) -> Result<Box<dyn CanSource + Send>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(SocketCanSource::open(interface)?))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = interface;
        Err(CanError::Unsupported)
    }
}
