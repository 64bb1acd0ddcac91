//! birdcount - count birds in a video.
//!
//! Samples every Nth frame, runs the configured detector, saves annotated
//! frames, rebuilds the SQLite store from the detections and renders the
//! count-per-second chart. Settings come from `BIRDCOUNT_CONFIG` and the
//! `BIRDCOUNT_*` environment variables.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;

use birdcount::{backend_from_settings, BirdcountConfig, FrameReport};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "birdcount",
    about = "Detect birds in a video, store detections in SQLite and chart counts over time"
)]
struct Args {
    /// Video file to process (or stub://name?frames=N&fps=F for a synthetic clip)
    video: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui_mode = std::env::var("BIRDCOUNT_UI").ok();
    let ui = ui::Ui::from_args(ui_mode.as_deref(), is_tty, !stdout_is_tty);

    let config = {
        let _stage = ui.stage("Load configuration");
        BirdcountConfig::load()?
    };
    let backend = {
        let _stage = ui.stage("Load detector");
        backend_from_settings(&config.detector)?
    };

    let mut progress = ui.frame_progress();
    let summary = birdcount::run(
        &config,
        &args.video,
        backend,
        &mut |report: &FrameReport| progress.update(report),
    )?;
    progress.finish();

    println!(
        "sampled {} frames, stored {} detections in {} frames",
        summary.frames_sampled, summary.stats.objects, summary.stats.frames_inserted
    );
    println!("annotated frames: {}", config.frames_dir.display());
    println!("database: {}", config.db_path.display());
    println!(
        "chart: {} ({} seconds with detections, peak {})",
        config.chart_path.display(),
        summary.series.len(),
        summary.series.max_count()
    );
    Ok(())
}
