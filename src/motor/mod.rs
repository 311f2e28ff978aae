// Motor control module for L91 (Robstride) actuators
//
// Provides:
// - Jog speed encoding
// - L91 frame builders
// - Paced serial transport to the USB/UART-to-CAN adapter
// - Motor table and per-motor state
// - High-level motor driver API

mod driver;
pub mod frame;
pub mod registry;
pub mod speed;
pub mod transport;

pub use driver::{MotorDriver, MotorError, StartupReport};
pub use frame::{Frame, FrameKind, JogFlag};
pub use registry::{ActivationState, Motor, MotorRegistry};
pub use transport::{SerialLink, SerialTransport, TransportError, TransportState, TransportStats};
