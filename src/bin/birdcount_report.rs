//! birdcount_report - re-render the count chart from an existing store.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use birdcount::font::load_font;
use birdcount::report::{self, ReportSettings, SecondsPolicy};
use birdcount::DetectionStore;

#[path = "../ui.rs"]
#[allow(dead_code)]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "birdcount_report",
    about = "Render the bird count chart from an existing detection store"
)]
struct Args {
    /// Path to the detection SQLite DB
    #[arg(long, env = "BIRDCOUNT_DB_PATH", default_value = "birds.db")]
    db: PathBuf,

    /// Output PNG path
    #[arg(
        long,
        env = "BIRDCOUNT_CHART_PATH",
        default_value = "output/num_birds_detected_vs_video_duration.png"
    )]
    output: PathBuf,

    /// Class name to count
    #[arg(long, env = "BIRDCOUNT_TARGET_CLASS", default_value = "bird")]
    target: String,

    /// Seconds bucketing (round|floor)
    #[arg(long, default_value_t = SecondsPolicy::Round)]
    policy: SecondsPolicy,

    /// TrueType font for chart text; DejaVu Sans is bundled
    #[arg(long, env = "BIRDCOUNT_FONT_PATH")]
    font: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    if !args.db.is_file() {
        anyhow::bail!("detection store {} does not exist", args.db.display());
    }
    let store = {
        let _stage = ui.stage("Open database");
        DetectionStore::open(&args.db)?
    };
    let font = load_font(args.font.as_deref())?;
    let settings = ReportSettings {
        target_class: args.target.clone(),
        policy: args.policy,
        chart_path: args.output.clone(),
        font,
    };
    let series = {
        let _stage = ui.stage("Render chart");
        report::visualize(&store.conn, &settings)?
    };

    for (second, count) in series.points() {
        println!("{:>6}s  {}", second, count);
    }
    println!("chart: {}", args.output.display());
    Ok(())
}
