//! Gaze tracking command line: runs a session on a camera or an image
//! directory and reports the gaze of every frame.

use anyhow::{Context, Result};
use clap::Parser;
use gaze_tracking::calibration::CalibrationMap;
use gaze_tracking::config::{Config, EXAMPLE_CONFIG};
use gaze_tracking::filters::FilterKind;
use gaze_tracking::gesture::ScrollEvent;
use gaze_tracking::session::{SessionState, TrackingSession, TrackingSnapshot};
use gaze_tracking::source::DeviceId;
use log::{info, warn};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Camera index to use
    #[arg(long, conflicts_with = "frames")]
    cam: Option<u32>,

    /// Directory of image frames to process instead of a camera
    #[arg(long)]
    frames: Option<String>,

    /// Frame rate used to timestamp image directories
    #[arg(long)]
    fps: Option<f64>,

    /// Calibration file (JSON) mapping gaze offsets to screen pixels
    #[arg(long)]
    calibration: Option<String>,

    /// Smoothing filter (none, moving_average, exponential, median, kalman)
    #[arg(short, long)]
    filter: Option<FilterKind>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Report mouth clicks and brow or lip scrolling
    #[arg(long)]
    gestures: bool,

    /// Print every snapshot as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Write an example configuration file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if let Some(path) = &args.write_config {
        std::fs::write(path, EXAMPLE_CONFIG).with_context(|| format!("Failed to write {path}"))?;
        info!("Wrote example configuration to {path}");
        return Ok(());
    }

    let limit = duration_limit(args.duration)?;
    let config = build_config(&args)?;
    let session = TrackingSession::from_config(config)?;
    let mut updates = session.subscribe();
    session
        .start()
        .with_context(|| format!("Failed to start tracking on {}", session.device()))?;

    let deadline = limit.map(|limit| Instant::now() + limit);
    let mut last_state = SessionState::Idle;

    loop {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("Requested duration elapsed");
            break;
        }
        let Some(snapshot) = updates.wait_next(Duration::from_millis(250)) else {
            if session.state() == SessionState::Stopped {
                break;
            }
            continue;
        };

        if snapshot.state != last_state {
            info!("Tracking {}", snapshot.state);
            last_state = snapshot.state;
        }
        report(&snapshot, args.json)?;
        if snapshot.state == SessionState::Stopped {
            break;
        }
    }

    session.stop();
    if let Some(err) = session.last_error() {
        anyhow::bail!("Tracking ended with an error: {err}");
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {path}");
            Config::from_file(path).with_context(|| format!("Failed to load {path}"))?
        }
        None => Config::default(),
    };

    if let Some(index) = args.cam {
        config.device = DeviceId::Index(index);
    }
    if let Some(dir) = &args.frames {
        config.device = DeviceId::Uri(dir.clone());
    }
    if let Some(fps) = args.fps {
        config.session.sequence_fps = fps;
    }
    if let Some(filter) = args.filter {
        config.smoothing.filter = filter;
    }
    if args.gestures {
        config.gesture.enabled = true;
    }
    if let Some(path) = &args.calibration {
        match CalibrationMap::load_json(path)? {
            Some(map) => config.calibration = Some(map),
            None => warn!("Calibration file {path} not found; screen mapping disabled"),
        }
    }

    config.validate()?;
    Ok(config)
}

fn duration_limit(secs: Option<f64>) -> Result<Option<Duration>> {
    secs.map(|secs| {
        Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid --duration {secs}: expected a non-negative number of seconds"))
    })
    .transpose()
}

fn report(snapshot: &TrackingSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snapshot)?);
        return Ok(());
    }

    for blink in &snapshot.blinks {
        info!("Blink ({:?} eye, {} frames)", blink.side, blink.closed_frames);
    }
    if let Some(dwell) = &snapshot.dwell {
        info!("Dwell at ({:.0}, {:.0})", dwell.point.x, dwell.point.y);
    }
    if let Some(mouth) = &snapshot.mouth {
        info!("Mouth {:?}", mouth.gesture);
    }
    for scroll in &snapshot.scrolls {
        match scroll {
            ScrollEvent::Scroll { source, direction, .. } => info!("Scroll {direction:?} ({source:?})"),
            ScrollEvent::Mode { enabled, .. } => info!("Lip scroll mode {}", if *enabled { "on" } else { "off" }),
        }
    }

    match (&snapshot.gaze, snapshot.valid) {
        (Some(gaze), true) => {
            let screen = gaze
                .screen
                .map(|p| format!(" screen ({:.0}, {:.0})", p.x, p.y))
                .unwrap_or_default();
            log::debug!(
                "Frame {}: offset ({:+.3}, {:+.3}) {:?} confidence {:.2}{screen}",
                snapshot.sequence,
                gaze.offset.x,
                gaze.offset.y,
                gaze.classify(0.25),
                gaze.confidence
            );
        }
        _ => {
            if let Some(miss) = snapshot.miss {
                log::debug!("Frame {}: {miss}", snapshot.sequence);
            }
        }
    }
    Ok(())
}
