use birdcount::FrameReport;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

const PLAIN_PROGRESS_EVERY: u64 = 25;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Progress over decoded frames; a bar when the total is known, a spinner
    /// otherwise, periodic lines in plain mode.
    pub fn frame_progress(&self) -> FrameProgress {
        let bar = if self.use_pretty() {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr());
            Some(bar)
        } else {
            None
        };
        FrameProgress {
            bar,
            sized: false,
            sampled: 0,
            detections: 0,
            start: Instant::now(),
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct FrameProgress {
    bar: Option<ProgressBar>,
    sized: bool,
    sampled: u64,
    detections: u64,
    start: Instant,
}

impl FrameProgress {
    pub fn update(&mut self, report: &FrameReport) {
        self.sampled += 1;
        self.detections += report.detections as u64;
        let message = format!(
            "frame {} at {} ms, {} birds so far",
            report.sample_index, report.timestamp_ms, self.detections
        );
        match &self.bar {
            Some(bar) => {
                if !self.sized {
                    if let Some(total) = report.total_frames {
                        bar.set_length(total);
                        let style = ProgressStyle::with_template(
                            "{bar:40} {pos}/{len} decoded frames {msg}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar());
                        bar.set_style(style);
                    }
                    self.sized = true;
                }
                bar.set_position(report.decode_index + 1);
                bar.set_message(message);
            }
            None => {
                if self.sampled % PLAIN_PROGRESS_EVERY == 1 {
                    eprintln!("    {}", message);
                }
            }
        }
    }

    pub fn finish(self) {
        let message = format!(
            "✔ {} sampled frames, {} birds ({})",
            self.sampled,
            self.detections,
            format_duration(self.start.elapsed())
        );
        match self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
