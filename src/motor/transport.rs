// Serial transport to the L91 USB/UART-to-CAN adapter
//
// One frame at a time: clear stale input, write, check the written length,
// drain, then stay quiet for the frame kind's quiet period. Pacing is a small
// state machine driven by the tokio clock so callers can await readiness
// instead of blocking the thread.

use serialport::{self, ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io;
use std::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use super::frame::{Frame, FrameKind};

/// Adapter serial configuration (8N1)
pub const DEFAULT_BAUDRATE: u32 = 921_600;

/// Per-write timeout handed to the serial driver
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Time the adapter needs after the port is opened
pub const SETTLE_TIME: Duration = Duration::from_millis(100);

/// Error types for the serial transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Short write for {kind} frame (expected {expected}, got {written})")]
    ShortWrite {
        kind: FrameKind,
        expected: usize,
        written: usize,
    },

    #[error("Transport cooling down for another {remaining:?}")]
    Busy { remaining: Duration },
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Byte channel to the adapter
///
/// Implemented for real serial ports; tests provide in-memory links.
pub trait SerialLink {
    /// Discard any unread input
    fn clear_input(&mut self) -> io::Result<()>;

    /// Single write attempt, returns the number of bytes accepted
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Block until everything written has physically left the port
    fn drain(&mut self) -> io::Result<()>;
}

impl SerialLink for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut **self, bytes)
    }

    fn drain(&mut self) -> io::Result<()> {
        io::Write::flush(&mut **self)
    }
}

/// Pacing state of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Sending,
    CoolingDown { until: Instant },
}

/// Send counters, reported in bridge health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub sent: u64,
    pub failed: u64,
}

/// Serial transport - exclusive owner of the adapter link
pub struct SerialTransport<L: SerialLink = Box<dyn SerialPort>> {
    link: L,
    state: TransportState,
    stats: TransportStats,
}

impl SerialTransport<Box<dyn SerialPort>> {
    /// Open the adapter port at the default baudrate
    pub async fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE).await
    }

    /// Open with custom baudrate, let the adapter settle and drop stale input
    pub async fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        info!("Opening L91 adapter on {} @ {} baud", port_name, baudrate);
        let port = serialport::new(port_name, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        sleep(SETTLE_TIME).await;
        port.clear(ClearBuffer::Input)?;

        Ok(Self::new(port))
    }
}

impl<L: SerialLink> SerialTransport<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: TransportState::Idle,
            stats: TransportStats::default(),
        }
    }

    /// Current pacing state, with an elapsed quiet period folded back to `Idle`
    pub fn state(&mut self) -> TransportState {
        self.refresh(Instant::now());
        self.state
    }

    pub fn is_ready(&mut self) -> bool {
        self.state() == TransportState::Idle
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    fn refresh(&mut self, now: Instant) {
        if let TransportState::CoolingDown { until } = self.state {
            if now >= until {
                self.state = TransportState::Idle;
            }
        }
    }

    /// Wait (without blocking the thread) until the quiet period has elapsed
    pub async fn ready(&mut self) {
        if let TransportState::CoolingDown { until } = self.state {
            sleep_until(until).await;
        }
        self.state = TransportState::Idle;
    }

    /// Send one frame now
    ///
    /// Fails with [`TransportError::Busy`] while the previous frame's quiet
    /// period is running. Any other outcome, success or failure, starts a new
    /// quiet period.
    pub fn send(&mut self, frame: &Frame) -> Result<usize> {
        let now = Instant::now();
        self.refresh(now);
        if let TransportState::CoolingDown { until } = self.state {
            return Err(TransportError::Busy {
                remaining: until - now,
            });
        }

        self.state = TransportState::Sending;
        let result = self.transmit(frame);
        self.state = TransportState::CoolingDown {
            until: Instant::now() + frame.kind().quiet_period(),
        };

        match &result {
            Ok(written) => {
                self.stats.sent += 1;
                debug!(kind = %frame.kind(), address = frame.address(), "L91 TX {} ({} bytes)", frame, written);
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(kind = %frame.kind(), address = frame.address(), "L91 send failed: {}", e);
            }
        }
        result
    }

    /// Await readiness, then send
    pub async fn send_when_ready(&mut self, frame: &Frame) -> Result<usize> {
        self.ready().await;
        self.send(frame)
    }

    fn transmit(&mut self, frame: &Frame) -> Result<usize> {
        self.link.clear_input()?;

        let written = self.link.write(frame.as_bytes())?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                kind: frame.kind(),
                expected: frame.len(),
                written,
            });
        }

        self.link.drain()?;
        Ok(written)
    }
}
