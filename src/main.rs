use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use drivebase_zenoh_runtime::config::{Flavor, RobotSettings};
use drivebase_zenoh_runtime::runtime::{self, Runtime};

#[derive(Debug, Parser)]
#[command(about = "Drivebase runtime: 50 Hz control loop over zenoh")]
struct Args {
    /// JSON settings file
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Drivebase to run; taken from the settings file when omitted
    #[arg(short, long, value_enum)]
    flavor: Option<Flavor>,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => match RobotSettings::from_json_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("Settings error ({}): {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RobotSettings::default(),
    };
    let flavor = args.flavor.or(settings.flavor()).unwrap_or(Flavor::Tank);

    // Heading warmup blocks, so the drivebase comes up before the async loop
    let robot = match Runtime::new(flavor, &settings) {
        Ok(robot) => robot,
        Err(e) => {
            eprintln!("Drivebase error: {}", e);
            std::process::exit(1);
        }
    };

    let tokio_rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Tokio error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = tokio_rt.block_on(runtime::run(robot)) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
