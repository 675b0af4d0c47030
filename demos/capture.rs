//! Interactive capture loop.
//!
//! Connects to the agent on the configured device, then for every name read
//! from stdin saves `<name>.json` (view hierarchy) and `<name>.png`
//! (screenshot) into the output directory. Screenshots fall back to
//! `adb screencap` when the agent cannot deliver one.
//!
//! Usage:
//!
//! ```text
//! cargo run --example capture -- [--config config.json] [--device SERIAL] [--debug]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use device_agent_client::Config;
use device_agent_client::capture::Recorder;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
struct Args {
    config: Option<PathBuf>,
    device: Option<String>,
    debug: bool,
}

impl Args {
    fn parse() -> Self {
        let mut args = Self::default();
        let mut iter = std::env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => args.config = iter.next().map(PathBuf::from),
                "--device" => args.device = iter.next(),
                "--debug" => args.debug = true,
                other => eprintln!("Ignoring unknown argument: {other}"),
            }
        }
        args
    }
}

// ============================================================================
// Functions
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "device_agent_client=debug"
    } else {
        "device_agent_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::new(),
    };
    if let Some(device) = args.device {
        config = config.with_device_id(device);
    }

    let device_id = config.device_id.clone();
    let mut recorder = Recorder::with_adb(config);
    if !recorder.set_device(device_id).await {
        println!("Agent not reachable yet; will retry on first capture.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"File name to save (empty to quit): ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let name = line.trim();
        if name.is_empty() {
            break;
        }

        match recorder.save_view_hierarchy(name).await {
            Ok(path) => println!("View hierarchy saved: {}", path.display()),
            Err(e) => println!("View hierarchy failed: {e}"),
        }

        match recorder.save_screenshot(name).await {
            Ok(path) => println!("Screenshot saved: {}", path.display()),
            Err(e) => println!("Screenshot failed, please retry: {e}"),
        }
    }

    recorder.manager_mut().close().await;
    Ok(())
}
