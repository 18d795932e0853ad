// Keyboard teleop: WASD move, Z/X rotate, R/F speed, C cancel follower, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use drivebase_zenoh_runtime::config::TOPIC_CMD_DRIVE;
use drivebase_zenoh_runtime::drivebase::LoopType;
use drivebase_zenoh_runtime::messages::DriveCommand;

const SPEEDS: [f64; 3] = [6.0, 18.0, 36.0]; // in/s
const THETA_SPEEDS: [f64; 3] = [15.0, 45.0, 90.0]; // deg/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_DRIVE).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, C=cancel, Q=quit");
    info!("Speed: LOW");

    send(&publisher, &DriveCommand::Mode { loop_type: LoopType::Teleop }).await?;

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn send(
    publisher: &zenoh::pubsub::Publisher<'_>,
    cmd: &DriveCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent velocity state
    let mut dx = 0.0;
    let mut dy = 0.0;
    let mut dtheta = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        dx = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        dx = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        dy = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        dy = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    KeyCode::Char('z') if pressed => {
                        dtheta = THETA_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        dtheta = -THETA_SPEEDS[speed_idx];
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

                    KeyCode::Char('c') if pressed => {
                        send(publisher, &DriveCommand::Cancel).await?;
                        info!("Cancel sent");
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset velocities if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            dx = 0.0;
            dy = 0.0;
            dtheta = 0.0;
        }

        // Publish only while moving; any open-loop command cancels a running follower
        if dx != 0.0 || dy != 0.0 || dtheta != 0.0 {
            send(publisher, &DriveCommand::ChassisSpeeds { dx, dy, dtheta }).await?;
        }
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
