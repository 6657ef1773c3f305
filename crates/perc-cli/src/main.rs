//! `perc` – run the LiDAR cone predictor over recorded frames.
//!
//! - `perc run [DIR]` loads `perc.toml`, builds the predictor and drives it
//!   over every `instance-{i}.json` in the recording, printing one line per
//!   frame and a summary. Ctrl-C stops the run after the current frame.
//! - `perc inspect [DIR]` describes a recording without running anything.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{debug, warn};

use perc_predictors::visualizer::{self, VisualFrame};
use perc_predictors::{LidarPredictor, Stages};
use perc_runtime::{DriverSummary, FrameDriver, FrameLoader, FrameOutcome};
use perc_types::{DataType, Frame};

#[derive(Parser)]
#[command(name = "perc")]
#[command(about = "LiDAR cone perception over recorded frames", version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict cones for every frame of a recording
    Run {
        /// Recording directory (overrides `data_dir` in the config)
        data_dir: Option<PathBuf>,
        /// First frame index
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Maximum number of frames to process
        #[arg(long)]
        limit: Option<usize>,
        /// Profile each prediction (overrides `run.profile`)
        #[arg(long)]
        profile: bool,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe the frames of a recording
    Inspect {
        /// Recording directory
        data_dir: PathBuf,
        /// Frame to describe in detail
        #[arg(short, long, default_value_t = 0)]
        index: usize,
    },
}

fn main() -> ExitCode {
    let _telemetry = perc_runtime::init_tracing("perc");
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Run {
            data_dir,
            start,
            limit,
            profile,
            json,
        } => run(&cli.config, data_dir, start, limit, profile, json),
        Commands::Inspect { data_dir, index } => inspect(&data_dir, index),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// perc run
// ─────────────────────────────────────────────────────────────────────────────

fn run(
    config_path: &Path,
    data_dir: Option<PathBuf>,
    start: usize,
    limit: Option<usize>,
    profile: bool,
    json: bool,
) -> Result<ExitCode, String> {
    let cfg = config::load_from(config_path)?;
    let data_dir = data_dir
        .or_else(|| cfg.data_dir.clone())
        .ok_or("no recording given: pass a directory or set `data_dir`")?;
    let loader = FrameLoader::open(&data_dir).map_err(|e| e.to_string())?;

    let stages = Stages::reference(cfg.ground, cfg.cluster).map_err(|e| e.to_string())?;
    let (vis, viewer_rx) = visualizer::build(cfg.visualizer);
    let viewer = viewer_rx.map(|rx| thread::spawn(move || drain_viewer(rx)));
    let predictor = LidarPredictor::new(
        cfg.predictor.clone(),
        Arc::new(cfg.pose_transformations()),
        stages,
        vis,
    )
    .map_err(|e| e.to_string())?;

    let mut driver_config = cfg.run.driver_config();
    driver_config.profile |= profile;
    let mut driver = FrameDriver::new(Box::new(predictor), driver_config);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current frame …".yellow().bold());
        stop_handler.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the run cannot be stopped cleanly");
    }

    let end = limit.map_or(loader.len(), |n| loader.len().min(start.saturating_add(n)));
    println!(
        "  Running {} on {} (frames {}..{})",
        driver.predictor().name().bold(),
        data_dir.display().to_string().bold(),
        start,
        end
    );

    let frames = (start..end).map(|i| loader.load(i));
    let summary = driver.run_with(frames, &stop, |i, outcome| {
        print_outcome(start + i, outcome)
    });
    // Dropping the driver closes the channel and lets the viewer finish.
    drop(driver);
    if let Some(handle) = viewer
        && handle.join().is_err()
    {
        warn!("viewer thread panicked");
    }

    if json {
        let out = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        println!("{out}");
    } else {
        print_summary(&summary);
    }

    Ok(if summary.halted_on.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn print_outcome(index: usize, outcome: &FrameOutcome) {
    match outcome {
        FrameOutcome::Predicted {
            prediction,
            latency,
        } => {
            println!(
                "  {} frame {:>5}  {:>3} cones  {:>8.2} ms",
                "✓".green(),
                index,
                prediction.cones.len(),
                latency.as_secs_f64() * 1e3
            );
            if let Some(timings) = &prediction.timings {
                print!("{}", timings.to_string().dimmed());
            }
        }
        FrameOutcome::Late { latency } => println!(
            "  {} frame {:>5}  {}  {:>8.2} ms",
            "⏱".yellow(),
            index,
            "late".yellow(),
            latency.as_secs_f64() * 1e3
        ),
        FrameOutcome::Failed(e) => {
            println!("  {} frame {:>5}  {}", "✗".red(), index, e.to_string().red())
        }
    }
}

fn print_summary(summary: &DriverSummary) {
    println!();
    println!("{}", "  Summary".bold().cyan());
    println!(
        "    started      {}",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "    elapsed      {:.1} s",
        (chrono::Utc::now() - summary.started_at).num_milliseconds() as f64 / 1e3
    );
    println!("    frames       {}", summary.frames);
    println!("    succeeded    {}", summary.succeeded.to_string().green());
    println!("    late         {}", summary.late.to_string().yellow());
    println!("    failed       {}", summary.failed.to_string().red());
    println!("    cones        {}", summary.cones);
    println!(
        "    mean latency {:.2} ms",
        summary.mean_latency.as_secs_f64() * 1e3
    );
    if summary.stopped {
        println!("    {}", "stopped by operator".yellow());
    }
    if let Some(e) = &summary.halted_on {
        println!("    {} {}", "halted:".red().bold(), e);
    }
}

/// Stand-in viewer for the channel visualizer: consumes frames until the
/// predictor is dropped.
fn drain_viewer(rx: std::sync::mpsc::Receiver<VisualFrame>) {
    let mut frames = 0usize;
    for frame in rx {
        frames += 1;
        debug!(
            frame = frames,
            points = frame.points.len(),
            cones = frame.cones.len(),
            "viewer frame"
        );
    }
    debug!(frames, "viewer closed");
}

// ─────────────────────────────────────────────────────────────────────────────
// perc inspect
// ─────────────────────────────────────────────────────────────────────────────

fn inspect(data_dir: &Path, index: usize) -> Result<ExitCode, String> {
    let loader = FrameLoader::open(data_dir).map_err(|e| e.to_string())?;
    println!(
        "  {} holds {} frame(s)",
        data_dir.display().to_string().bold(),
        loader.len()
    );
    if loader.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    let bundle = loader.load(index).map_err(|e| e.to_string())?;
    println!("  Frame {index}:");
    let mut keys: Vec<DataType> = bundle.keys().collect();
    keys.sort_by_key(|k| k.key());
    for key in keys {
        let frame = bundle.get(key).map_err(|e| e.to_string())?;
        let stats = FrameStats::of(frame);
        println!(
            "    {:<18} {:>7} rows × {} cols   {} zero rows   {} rows with NaN",
            key.key().bold(),
            frame.len(),
            frame.columns(),
            stats.zero_rows,
            stats.nan_rows
        );
    }
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Default, PartialEq)]
struct FrameStats {
    zero_rows: usize,
    nan_rows: usize,
}

impl FrameStats {
    fn of(frame: &Frame) -> Self {
        let mut stats = Self::default();
        for row in frame.rows() {
            let xyz = &row[..row.len().min(3)];
            if !xyz.is_empty() && xyz.iter().all(|v| *v == 0.0) {
                stats.zero_rows += 1;
            }
            if row.iter().any(|v| v.is_nan()) {
                stats.nan_rows += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_and_inspect() {
        let args = ["perc", "run", "rec", "--limit", "10", "--profile"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, PathBuf::from(config::DEFAULT_CONFIG_FILE));
        match cli.command {
            Commands::Run {
                data_dir,
                limit,
                profile,
                start,
                json,
            } => {
                assert_eq!(data_dir, Some(PathBuf::from("rec")));
                assert_eq!(limit, Some(10));
                assert!(profile);
                assert_eq!(start, 0);
                assert!(!json);
            }
            Commands::Inspect { .. } => panic!("expected run"),
        }

        let args = ["perc", "--config", "x.toml", "inspect", "rec", "-i", "3"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(cli.command, Commands::Inspect { index: 3, .. }));
    }

    #[test]
    fn inspect_requires_directory() {
        assert!(Cli::try_parse_from(["perc", "inspect"]).is_err());
    }

    #[test]
    fn frame_stats_count_flagged_rows() {
        let frame = Frame::from_rows(&[
            [0.0, 0.0, 0.0, 5.0],
            [1.0, 2.0, 3.0, 5.0],
            [f64::NAN, 1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, f64::NAN],
        ])
        .unwrap();
        assert_eq!(
            FrameStats::of(&frame),
            FrameStats {
                zero_rows: 2,
                nan_rows: 2
            }
        );
    }
}
