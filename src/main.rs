use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use l91_can_bridge::config::BridgeConfig;
use l91_can_bridge::motor::{MotorDriver, frame};

#[derive(Parser)]
#[command(name = "l91-bridge")]
#[command(about = "CAN bus to L91 serial motor bridge", long_about = None)]
struct Cli {
    /// TOML config file (built-in defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the adapter serial port
    #[arg(long, global = true)]
    port: Option<String>,

    /// Override the CAN interface
    #[arg(long, global = true)]
    can: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default)
    Run,

    /// Print the L91 frames for a motor address without touching any device
    Frames {
        /// Protocol address byte, e.g. 0x34
        #[arg(long, value_parser = parse_byte)]
        address: u8,

        /// Jog speed in [-1.0, 1.0]
        #[arg(long, default_value_t = 0.05, allow_negative_numbers = true)]
        speed: f32,
    },

    /// Bring one motor up, jog it briefly, stop and deactivate it
    Jog {
        /// Logical motor id from the motor table
        #[arg(long, value_parser = parse_byte)]
        motor: u8,

        /// Jog speed in [-1.0, 1.0]
        #[arg(long, default_value_t = 0.04, allow_negative_numbers = true)]
        speed: f32,

        /// How long to jog
        #[arg(long, default_value_t = 600)]
        duration_ms: u64,
    },
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid byte '{}': {}", s, e))
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    let filter = match "info".parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("Bridge error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = BridgeConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(can) = cli.can {
        config.can.interface = can;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => l91_can_bridge::runtime::run(config).await,
        Commands::Frames { address, speed } => {
            print_frames(address, speed);
            Ok(())
        }
        Commands::Jog {
            motor,
            speed,
            duration_ms,
        } => jog(&config, motor, speed, Duration::from_millis(duration_ms)).await,
    }
}

fn print_frames(address: u8, speed: f32) {
    println!("Motor address 0x{:02X}", address);
    println!("  activate    {}", frame::activate(address));
    println!("  load_params {}", frame::load_params(address));
    println!("  jog {:+.3}  {}", speed, frame::move_at(address, speed));
    println!("  stop        {}", frame::stop(address));
    println!("  deactivate  {}", frame::deactivate(address));
}

async fn jog(
    config: &BridgeConfig,
    motor: u8,
    speed: f32,
    duration: Duration,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut driver = MotorDriver::open(&config.serial, &config.motors).await?;

    let state = driver.bring_up(motor).await?;
    info!(motor, ?state, "Jogging at {:.3} for {:?}", speed, duration);

    driver.jog_for(motor, speed, duration).await?;
    Ok(())
}
