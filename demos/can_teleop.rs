// Keyboard teleop over CAN: 1/2/3 pick motor, W/S jog, R/F speed, Q quit
//
// Sends bridge command frames (id low nibble = motor, data[0] = i8 speed) on
// a SocketCAN interface. Useful with `vcan0` for bench testing the bridge.
//
// Usage: cargo run --example can_teleop -- [interface]

#[cfg(target_os = "linux")]
mod teleop {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode},
    };
    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Socket, StandardId};
    use std::time::{Duration, Instant};
    use tracing::info;

    const MOTORS: [u16; 3] = [0x0C, 0x0D, 0x0E];
    const SPEEDS: [i8; 3] = [13, 38, 64]; // ~0.1, ~0.3, ~0.5
    const INPUT_TIMEOUT_MS: u64 = 100; // Stop after this much time with no input

    pub fn main() -> Result<(), Box<dyn std::error::Error>> {
        tracing_subscriber::fmt().with_env_filter("info").init();

        let interface = std::env::args().nth(1).unwrap_or_else(|| "can0".to_string());
        let socket = CanSocket::open(&interface)?;
        info!("Sending on {}", interface);
        info!("Controls: 1/2/3=motor, W/S=jog, R/F=speed, Q=quit");

        enable_raw_mode()?;
        let result = run_teleop(&socket);
        disable_raw_mode()?;

        result
    }

    fn send(socket: &CanSocket, motor: u16, speed: i8) -> Result<(), Box<dyn std::error::Error>> {
        let id = StandardId::new(motor).ok_or("invalid CAN id")?;
        let frame = CanFrame::new(id, &[speed as u8]).ok_or("invalid CAN frame")?;
        socket.write_frame(&frame)?;
        Ok(())
    }

    fn run_teleop(socket: &CanSocket) -> Result<(), Box<dyn std::error::Error>> {
        let mut motor_idx: usize = 0;
        let mut speed_idx: usize = 0;
        let mut speed: i8 = 0;
        let mut last_movement_input = Instant::now();

        loop {
            // Poll for key with 50ms timeout (20Hz effective rate)
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                    let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                    match code {
                        KeyCode::Char(c @ '1'..='3') if pressed => {
                            // stop the motor we are leaving
                            send(socket, MOTORS[motor_idx], 0)?;
                            motor_idx = (c as u8 - b'1') as usize;
                            speed = 0;
                            info!("Motor: 0x{:02X}", MOTORS[motor_idx]);
                        }
                        KeyCode::Char('w') if pressed => {
                            speed = SPEEDS[speed_idx];
                            last_movement_input = Instant::now();
                        }
                        KeyCode::Char('s') if pressed => {
                            speed = -SPEEDS[speed_idx];
                            last_movement_input = Instant::now();
                        }
                        KeyCode::Char('r') if pressed => {
                            speed_idx = (speed_idx + 1).min(2);
                            info!("Speed: {}", ["LOW", "MED", "HIGH"][speed_idx]);
                        }
                        KeyCode::Char('f') if pressed => {
                            speed_idx = speed_idx.saturating_sub(1);
                            info!("Speed: {}", ["LOW", "MED", "HIGH"][speed_idx]);
                        }
                        KeyCode::Char('q') | KeyCode::Esc if pressed => break,
                        _ => {}
                    }
                }
            }

            if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
                speed = 0;
            }

            send(socket, MOTORS[motor_idx], speed)?;
        }

        send(socket, MOTORS[motor_idx], 0)?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    teleop::main()
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("can_teleop needs SocketCAN (Linux only)");
}
