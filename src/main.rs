// Bench CLI for the motor bus: ping motors, watch a group, drive it live.

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rover_hal::motor::{MotorGroup, StsBus, sts};
use rover_hal::telemetry::{GroupCommand, GroupTelemetry};
use rover_hal::units::AngularVelocity;
use rover_hal::{config, runtime};

const SPEEDS: [f64; 3] = [0.2, 0.5, 1.0]; // fraction of full power
const INPUT_TIMEOUT_MS: u64 = 100; // brake after this much time with no input

#[derive(Parser)]
#[command(name = "rover-hal", about = "Motor bus diagnostics and teleop")]
struct Cli {
    /// Serial port of the motor bus
    #[arg(long, global = true, default_value = config::BUS_PORT)]
    port: String,

    /// Bus baudrate
    #[arg(long, global = true, default_value_t = sts::DEFAULT_BAUDRATE)]
    baud: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe motor ids and report which respond
    Ping {
        /// Ids to probe; scans 1..=20 when omitted
        ids: Vec<u8>,
    },
    /// Print group telemetry as JSON lines until interrupted
    Monitor {
        /// Member ids; negative means reversed
        #[arg(required = true)]
        ids: Vec<i16>,

        /// Group output velocity in rpm after external gearing
        #[arg(long, default_value_t = 200.0)]
        output_rpm: f64,
    },
    /// Keyboard teleop: W/S drive, Space brake, R/F speed, Q quit
    Drive {
        /// Member ids; negative means reversed
        #[arg(required = true)]
        ids: Vec<i16>,

        /// Group output velocity in rpm after external gearing
        #[arg(long, default_value_t = 200.0)]
        output_rpm: f64,
    },
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut bus = StsBus::open_with_baudrate(&cli.port, cli.baud)?;

    match cli.command {
        Command::Ping { ids } => {
            let ids = if ids.is_empty() {
                (1..=20).collect()
            } else {
                ids
            };
            for id in ids {
                if bus.ping(id)? {
                    println!("id {:>2}: ok", id);
                } else {
                    println!("id {:>2}: no response", id);
                }
            }
            Ok(())
        }
        Command::Monitor { ids, output_rpm } => {
            let mut group =
                MotorGroup::with_members(bus, ids, AngularVelocity::from_rpm(output_rpm));
            let mut tick =
                tokio::time::interval(Duration::from_millis(1000 / config::LOOP_HZ));
            loop {
                tick.tick().await;
                let telemetry = GroupTelemetry::capture(&mut group);
                println!("{}", serde_json::to_string(&telemetry)?);
            }
        }
        Command::Drive { ids, output_rpm } => {
            let group =
                MotorGroup::with_members(bus, ids, AngularVelocity::from_rpm(output_rpm));
            let (tx, rx) = mpsc::channel(32);
            let handle = tokio::spawn(runtime::run(group, rx));

            info!("Controls: W/S=drive, Space=brake, R/F=speed, Q=quit");
            info!("Speed: LOW");

            enable_raw_mode()?;
            let result = run_teleop(&tx).await;
            disable_raw_mode()?;

            drop(tx);
            handle.await??;
            result
        }
    }
}

async fn run_teleop(
    tx: &mpsc::Sender<GroupCommand>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut percent = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))?
            && let Event::Key(KeyEvent { code, kind, .. }) = event::read()?
        {
            let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

            match code {
                KeyCode::Char('w') if pressed => {
                    percent = SPEEDS[speed_idx];
                    last_movement_input = Instant::now();
                }
                KeyCode::Char('s') if pressed => {
                    percent = -SPEEDS[speed_idx];
                    last_movement_input = Instant::now();
                }
                KeyCode::Char(' ') if pressed => {
                    percent = 0.0;
                    last_movement_input = Instant::now();
                }

                KeyCode::Char('r') if pressed => {
                    speed_idx = (speed_idx + 1).min(2);
                    print_speed(speed_idx);
                }
                KeyCode::Char('f') if pressed => {
                    speed_idx = speed_idx.saturating_sub(1);
                    print_speed(speed_idx);
                }

                KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                _ => {}
            }
        }

        // Brake if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            percent = 0.0;
        }

        // Always command at ~50Hz so the watchdog stays fed
        let cmd = if percent == 0.0 {
            GroupCommand::Brake
        } else {
            GroupCommand::Percent(percent)
        };
        tx.send(cmd).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
