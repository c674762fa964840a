//! Track the mouse pointer with a Kalman filter.
//!
//! Usage:
//!     mouse-kalman [--config tracker.json] [--headless] [--ticks 300] [--dump trails.json]
//!
//! Without the `opencv` feature (or with `--headless`) a scripted pointer
//! circles the canvas with Gaussian jitter instead of a real window.

use std::f64::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mouse_kalman_rs::surface::{Backend, Canvas};
use mouse_kalman_rs::{
    Error, InputEvent, Point, Result, ScriptStep, ScriptedBackend, SessionSummary, TrackerConfig,
    TrackingLoop,
};

const HELP: &str = "
Kalman filter example.
   Tracking mouse position.

   Right-click on a point to start.
   Pressing 'c' clears the trails.
   Pressing ESC or 'q' stops the program.
";

#[derive(Debug, Parser)]
#[command(name = "mouse-kalman", version, about = "Track the mouse pointer with a Kalman filter")]
struct Cli {
    /// JSON tracker configuration; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay a synthetic pointer path instead of opening a window
    #[arg(long)]
    headless: bool,

    /// Number of ticks in a headless session
    #[arg(long, default_value_t = 300)]
    ticks: usize,

    /// Seed for the headless pointer jitter
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Standard deviation of the headless pointer jitter, in pixels
    #[arg(long, default_value_t = 3.0)]
    noise: f64,

    /// Override the tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Override the observation noise variance
    #[arg(long)]
    observation_noise: Option<f64>,

    /// Override the process noise variance
    #[arg(long)]
    process_noise: Option<f64>,

    /// Write both trails and the session summary to this JSON file
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Log every tick
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct TrailDump<'a> {
    summary: &'a SessionSummary,
    raw: &'a [Point],
    filtered: &'a [Point],
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    println!("{}", HELP);

    if let Err(e) = run(&cli) {
        error!(error = %e, "mouse-kalman failed");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    if !cli.headless {
        if let Some(result) = run_interactive(cli, &config) {
            return result;
        }
    }

    let script = synthetic_script(&config, cli.ticks, cli.noise, cli.seed)?;
    info!(ticks = cli.ticks, seed = cli.seed, noise = cli.noise, "running headless session");
    track(cli, config, ScriptedBackend::new(script))
}

#[cfg(feature = "opencv")]
fn run_interactive(cli: &Cli, config: &TrackerConfig) -> Option<Result<()>> {
    let backend = mouse_kalman_rs::surface::highgui::HighGuiBackend::default();
    Some(track(cli, config.clone(), backend))
}

#[cfg(not(feature = "opencv"))]
fn run_interactive(_cli: &Cli, _config: &TrackerConfig) -> Option<Result<()>> {
    info!("built without the opencv feature, falling back to a headless session");
    None
}

fn load_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::from_json_file(path)?,
        None => TrackerConfig::new(),
    };
    if let Some(ms) = cli.tick_ms {
        config.tick_interval_ms = ms;
    }
    if let Some(r) = cli.observation_noise {
        config.filter.observation_noise = r;
    }
    if let Some(q) = cli.process_noise {
        config.filter.process_noise = q;
    }
    config.validate()?;
    Ok(config)
}

fn track<B: Backend>(cli: &Cli, config: TrackerConfig, mut backend: B) -> Result<()> {
    let canvas = backend.create_canvas(config.canvas_width, config.canvas_height)?;
    let mut tracker = TrackingLoop::new(config, canvas)?;
    let summary = tracker.run()?;

    if let Some(position) = summary.final_position {
        info!(x = position.x, y = position.y, "final estimate");
    }

    if let Some(path) = &cli.dump {
        write_dump(path, &summary, &tracker)?;
        info!(path = %path.display(), "trails written");
    }
    Ok(())
}

fn write_dump<C: Canvas>(path: &Path, summary: &SessionSummary, tracker: &TrackingLoop<C>) -> Result<()> {
    let dump = TrailDump {
        summary,
        raw: tracker.raw_history(),
        filtered: tracker.filtered_history(),
    };
    fs::write(path, serde_json::to_string_pretty(&dump)?)?;
    Ok(())
}

/// A pointer circling the canvas center once every 240 ticks, with jitter.
fn synthetic_script(config: &TrackerConfig, ticks: usize, noise: f64, seed: u64) -> Result<Vec<ScriptStep>> {
    let jitter = Normal::new(0.0, noise)
        .map_err(|e| Error::InvalidConfig(format!("invalid noise {}: {}", noise, e)))?;
    let mut rng = StdRng::seed_from_u64(seed);

    let cx = config.canvas_width as f64 / 2.0;
    let cy = config.canvas_height as f64 / 2.0;
    let radius = cx.min(cy) / 2.0;
    let on_circle = |i: usize| {
        let t = i as f64 * TAU / 240.0;
        Point::new(cx + radius * t.cos(), cy + radius * t.sin())
    };

    let mut script = Vec::with_capacity(ticks + 2);
    script.push(ScriptStep::event(InputEvent::Confirm(on_circle(0))));
    // Tracking tick i polls step i, so tick `ticks` sees the quit
    for i in 1..ticks {
        let p = on_circle(i);
        script.push(ScriptStep::move_to(Point::new(
            p.x + jitter.sample(&mut rng),
            p.y + jitter.sample(&mut rng),
        )));
    }
    script.push(ScriptStep::event(InputEvent::Quit));
    Ok(script)
}
