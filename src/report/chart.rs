use std::path::Path;

use ab_glyph::FontArc;
use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut, text_size,
};

use super::CountSeries;

pub const CHART_WIDTH: u32 = 1200;
pub const CHART_HEIGHT: u32 = 800;

const TITLE: &str = "Number of Birds Detected Over Video Duration";
const X_LABEL: &str = "Video Duration (seconds)";
const Y_LABEL: &str = "Number of Birds Detected";

const MARGIN_LEFT: f32 = 110.0;
const MARGIN_RIGHT: f32 = 40.0;
const MARGIN_TOP: f32 = 80.0;
const MARGIN_BOTTOM: f32 = 100.0;

const TITLE_SCALE: f32 = 28.0;
const AXIS_LABEL_SCALE: f32 = 22.0;
const TICK_SCALE: f32 = 15.0;
const POINT_LABEL_SCALE: f32 = 17.0;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const GRID: Rgb<u8> = Rgb([220, 220, 220]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const LINE: Rgb<u8> = Rgb([0, 0, 255]);
const TEXT: Rgb<u8> = Rgb([0, 0, 0]);

/// Perpendicular offsets giving a line roughly 2.5 px wide.
const LINE_OFFSETS: [f32; 5] = [-1.0, -0.5, 0.0, 0.5, 1.0];
const TARGET_TICKS: f32 = 8.0;

/// Render the series and write it as PNG, replacing any existing file.
pub fn render_chart(series: &CountSeries, path: &Path, font: &FontArc) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating chart directory {}", parent.display()))?;
    }
    let image = render_chart_image(series, font);
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("writing chart to {}", path.display()))
}

/// Render the series in memory.
pub fn render_chart_image(series: &CountSeries, font: &FontArc) -> RgbImage {
    let mut image = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, BACKGROUND);
    let plot = PlotArea::for_series(series);

    draw_grid(&mut image, &plot, font);
    draw_axes(&mut image, &plot);

    let points: Vec<(f32, f32)> = series
        .points()
        .iter()
        .map(|&(second, count)| plot.to_pixel(second as f32, count as f32))
        .collect();
    for pair in points.windows(2) {
        draw_thick_segment(&mut image, pair[0], pair[1]);
    }
    for &(x, y) in &points {
        draw_filled_circle_mut(&mut image, (x.round() as i32, y.round() as i32), 1, LINE);
    }

    for (&(_, count), &(x, y)) in series.points().iter().zip(&points) {
        let label = count.to_string();
        let (w, h) = text_size(POINT_LABEL_SCALE, font, &label);
        draw_text_mut(
            &mut image,
            TEXT,
            (x - w as f32 / 2.0) as i32,
            (y - h as f32 - 6.0) as i32,
            POINT_LABEL_SCALE,
            font,
            &label,
        );
    }
    draw_labels(&mut image, font);
    image
}

struct PlotArea {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    x_min: f32,
    x_max: f32,
    y_min: f32,
    y_max: f32,
}

impl PlotArea {
    fn for_series(series: &CountSeries) -> Self {
        let (x_min, x_max) = match (series.points().first(), series.points().last()) {
            (Some(&(first, _)), Some(&(last, _))) if first != last => {
                let pad = (last - first) as f32 * 0.05;
                (first as f32 - pad, last as f32 + pad)
            }
            (Some(&(only, _)), _) => (only as f32 - 1.0, only as f32 + 1.0),
            _ => (0.0, 1.0),
        };
        let y_max = (series.max_count() as f32 * 1.1).max(1.0);
        Self {
            left: MARGIN_LEFT,
            right: CHART_WIDTH as f32 - MARGIN_RIGHT,
            top: MARGIN_TOP,
            bottom: CHART_HEIGHT as f32 - MARGIN_BOTTOM,
            x_min,
            x_max,
            y_min: 0.0,
            y_max,
        }
    }

    fn to_pixel(&self, x: f32, y: f32) -> (f32, f32) {
        let px = self.left + (x - self.x_min) / (self.x_max - self.x_min) * (self.right - self.left);
        let py = self.bottom - (y - self.y_min) / (self.y_max - self.y_min) * (self.bottom - self.top);
        (px, py)
    }
}

fn draw_grid(image: &mut RgbImage, plot: &PlotArea, font: &FontArc) {
    let x_step = nice_step(plot.x_max - plot.x_min);
    for x in ticks(plot.x_min, plot.x_max, x_step) {
        let (px, _) = plot.to_pixel(x, plot.y_min);
        draw_line_segment_mut(image, (px, plot.top), (px, plot.bottom), GRID);
        let label = format_tick(x, x_step);
        let (w, _) = text_size(TICK_SCALE, font, &label);
        draw_text_mut(
            image,
            TEXT,
            (px - w as f32 / 2.0) as i32,
            (plot.bottom + 8.0) as i32,
            TICK_SCALE,
            font,
            &label,
        );
    }

    let y_step = nice_step(plot.y_max - plot.y_min);
    for y in ticks(plot.y_min, plot.y_max, y_step) {
        let (_, py) = plot.to_pixel(plot.x_min, y);
        draw_line_segment_mut(image, (plot.left, py), (plot.right, py), GRID);
        let label = format_tick(y, y_step);
        let (w, h) = text_size(TICK_SCALE, font, &label);
        draw_text_mut(
            image,
            TEXT,
            (plot.left - w as f32 - 8.0) as i32,
            (py - h as f32 / 2.0) as i32,
            TICK_SCALE,
            font,
            &label,
        );
    }
}

fn draw_axes(image: &mut RgbImage, plot: &PlotArea) {
    let corners = [
        ((plot.left, plot.bottom), (plot.right, plot.bottom)),
        ((plot.left, plot.top), (plot.left, plot.bottom)),
        ((plot.left, plot.top), (plot.right, plot.top)),
        ((plot.right, plot.top), (plot.right, plot.bottom)),
    ];
    for (start, end) in corners {
        draw_line_segment_mut(image, start, end, AXIS);
    }
}

fn draw_labels(image: &mut RgbImage, font: &FontArc) {
    let (w, _) = text_size(TITLE_SCALE, font, TITLE);
    draw_text_mut(
        image,
        TEXT,
        (CHART_WIDTH as i32 - w as i32) / 2,
        24,
        TITLE_SCALE,
        font,
        TITLE,
    );

    let (w, h) = text_size(AXIS_LABEL_SCALE, font, X_LABEL);
    draw_text_mut(
        image,
        TEXT,
        MARGIN_LEFT as i32
            + (CHART_WIDTH as i32 - MARGIN_LEFT as i32 - MARGIN_RIGHT as i32 - w as i32) / 2,
        CHART_HEIGHT as i32 - h as i32 - 30,
        AXIS_LABEL_SCALE,
        font,
        X_LABEL,
    );

    // Vertical label: draw horizontally on a scratch canvas, then rotate.
    let (w, h) = text_size(AXIS_LABEL_SCALE, font, Y_LABEL);
    let mut scratch = RgbImage::from_pixel(w + 4, h + 4, BACKGROUND);
    draw_text_mut(&mut scratch, TEXT, 2, 2, AXIS_LABEL_SCALE, font, Y_LABEL);
    let rotated = imageops::rotate270(&scratch);
    let plot_mid = (MARGIN_TOP + (CHART_HEIGHT as f32 - MARGIN_BOTTOM)) / 2.0;
    imageops::overlay(
        image,
        &rotated,
        20,
        (plot_mid - rotated.height() as f32 / 2.0) as i64,
    );
}

fn draw_thick_segment(image: &mut RgbImage, start: (f32, f32), end: (f32, f32)) {
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return;
    }
    let (nx, ny) = (-dy / len, dx / len);
    for offset in LINE_OFFSETS {
        draw_line_segment_mut(
            image,
            (start.0 + nx * offset, start.1 + ny * offset),
            (end.0 + nx * offset, end.1 + ny * offset),
            LINE,
        );
    }
}

/// Tick spacing of 1, 2 or 5 times a power of ten.
fn nice_step(range: f32) -> f32 {
    if range <= 0.0 || !range.is_finite() {
        return 1.0;
    }
    let raw = range / TARGET_TICKS;
    let magnitude = 10f32.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn ticks(min: f32, max: f32, step: f32) -> Vec<f32> {
    let mut out = Vec::new();
    let mut value = (min / step).ceil() * step;
    while value <= max + step * 1e-3 {
        out.push(value);
        value += step;
    }
    out
}

fn format_tick(value: f32, step: f32) -> String {
    if step >= 1.0 {
        format!("{}", value.round() as i64)
    } else {
        format!("{:.1}", value)
    }
}
