//! Face Distance CLI
//!
//! Streams the local camera to a face-distance detector and prints the
//! readings. Type `s` to start/stop, `u` to switch units, `h` for the
//! recent history and `q` to quit.

use clap::Parser;
use face_distance::{
    capture::{Camera, MockCamera},
    config::{ConfigError, FileConfig},
    encoding::decode_payload,
    measurement::{to_display, DisplayUnit},
    Session, SessionHandle, SessionSettings, SessionSnapshot,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "face-distance", version, about = "Live face distance from a remote detector")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Detector WebSocket endpoint.
    #[arg(long, env = "DETECTOR_WS_URL")]
    url: Option<String>,

    /// Camera device index.
    #[arg(long)]
    device: Option<u32>,

    /// Use the synthetic camera instead of hardware.
    #[arg(long)]
    mock: bool,

    /// Display unit (`m` or `cm`).
    #[arg(long)]
    unit: Option<DisplayUnit>,

    /// Do not start detecting until `s` is entered.
    #[arg(long)]
    paused: bool,

    /// Serve Prometheus metrics on this port (0 disables).
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Write each annotated frame from the detector to this JPEG file.
    #[arg(long)]
    annotated_out: Option<PathBuf>,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Face Distance v{}", face_distance::VERSION);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Everything runs on this one thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    // Hardware handles stay on the camera thread that creates them.
    let mock = args.mock;
    let (mut session, handle) = Session::with_camera_factory(
        move || select_camera(mock),
        SessionSettings::from_config(&config),
    );

    let interrupt = handle.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        interrupt.teardown();
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    info!(url = %config.detector.url, "Detector endpoint");
    println!("Commands: [s] start/stop  [u] toggle unit  [h] history  [q] quit");

    runtime.block_on(async {
        spawn_metrics(config.metrics.port, &handle);
        if !args.paused {
            handle.toggle_detection();
        }

        tokio::select! {
            _ = session.run() => {}
            _ = present(handle.subscribe(), args.annotated_out.clone()) => {}
            _ = read_commands(handle.clone()) => {}
        }
    });

    print_history(&session.snapshot());
    drop(session);
    // Stdin may still be blocked in a read; don't wait for it.
    runtime.shutdown_background();
}

fn load_config(args: &Args) -> Result<FileConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(url) = &args.url {
        config.detector.url = url.trim().to_string();
    }
    if let Some(device) = args.device {
        config.capture.device_id = device;
    }
    if let Some(unit) = args.unit {
        config.display.unit = unit;
    }
    if let Some(port) = args.metrics_port {
        config.metrics.port = port;
    }
    config.validate()?;
    Ok(config)
}

fn select_camera(mock: bool) -> Box<dyn Camera> {
    if !mock {
        if let Some(camera) = hardware_camera() {
            return camera;
        }
    }
    info!("Using synthetic camera input");
    Box::new(MockCamera::new())
}

#[cfg(feature = "camera")]
fn hardware_camera() -> Option<Box<dyn Camera>> {
    Some(Box::new(face_distance::capture::NokhwaCamera::new()))
}

#[cfg(not(feature = "camera"))]
fn hardware_camera() -> Option<Box<dyn Camera>> {
    warn!("Built without the `camera` feature");
    None
}

#[cfg(feature = "metrics")]
fn spawn_metrics(port: u16, handle: &SessionHandle) {
    use face_distance::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            return;
        }
    };
    let server = MetricsServer::new(
        MetricsServerConfig::with_port(port),
        registry,
        handle.subscribe(),
    );
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            warn!("Metrics server stopped: {}", e);
        }
    });
}

#[cfg(not(feature = "metrics"))]
fn spawn_metrics(port: u16, _handle: &SessionHandle) {
    if port != 0 {
        warn!(port, "Built without the `metrics` feature; not serving metrics");
    }
}

/// Prints state, distance and error changes as they are published.
async fn present(mut updates: watch::Receiver<SessionSnapshot>, annotated_out: Option<PathBuf>) {
    let mut last = updates.borrow_and_update().clone();
    while updates.changed().await.is_ok() {
        let current = updates.borrow_and_update().clone();

        if current.state != last.state {
            println!("[{}]", current.state);
        }
        if current.last_error != last.last_error {
            if let Some(error) = &current.last_error {
                eprintln!("Error: {}", error);
            }
        }
        if current.stats.measurements != last.stats.measurements || current.unit != last.unit {
            println!("Distance: {}", current.display_distance());
        }
        if let (Some(path), Some(frame)) = (&annotated_out, &current.annotated) {
            if last.annotated.as_ref() != Some(frame) {
                write_annotated(path, &frame.image);
            }
        }

        last = current;
    }
}

fn write_annotated(path: &Path, image: &str) {
    match decode_payload(image) {
        Ok(bytes) => {
            if let Err(e) = std::fs::write(path, bytes) {
                warn!(path = %path.display(), "Failed to write annotated frame: {}", e);
            }
        }
        Err(e) => warn!("Annotated frame is not valid base64: {}", e),
    }
}

/// Maps stdin lines to session commands. Never returns on its own.
async fn read_commands(handle: SessionHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "s" => {
                    handle.toggle_detection();
                }
                "u" => {
                    handle.toggle_unit();
                }
                "h" => print_history(&handle.snapshot()),
                "q" => {
                    handle.teardown();
                    break;
                }
                "" => {}
                other => println!("Unknown command {:?}; use s, u, h or q", other),
            },
            // Stdin closed: keep running until interrupted.
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read command: {}", e);
                break;
            }
        }
    }
    std::future::pending::<()>().await
}

fn print_history(snapshot: &SessionSnapshot) {
    if snapshot.history.is_empty() {
        println!("No readings yet.");
        return;
    }
    println!("{:<10} | Distance ({})", "Time", snapshot.unit);
    println!("{}", "-".repeat(26));
    for entry in &snapshot.history {
        println!(
            "{:<10} | {}",
            entry.timestamp,
            to_display(entry.distance_meters, snapshot.unit)
        );
    }
}
