//! Per-second detection counts reconstructed from the store, plus the chart.

mod chart;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use ab_glyph::FontArc;
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::Deserialize;

pub use chart::{render_chart, render_chart_image, CHART_HEIGHT, CHART_WIDTH};

/// How millisecond timestamps collapse into whole-second buckets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondsPolicy {
    /// Nearest second, halves away from zero (2500 ms → 3 s).
    #[default]
    Round,
    /// Truncate toward negative infinity (2500 ms → 2 s).
    Floor,
}

impl SecondsPolicy {
    pub fn to_seconds(self, timestamp_ms: i64) -> i64 {
        match self {
            SecondsPolicy::Round => {
                if timestamp_ms >= 0 {
                    (timestamp_ms + 500) / 1000
                } else {
                    -((-timestamp_ms + 500) / 1000)
                }
            }
            SecondsPolicy::Floor => timestamp_ms.div_euclid(1000),
        }
    }
}

impl FromStr for SecondsPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round" => Ok(SecondsPolicy::Round),
            "floor" => Ok(SecondsPolicy::Floor),
            other => Err(format!(
                "unknown seconds policy '{}' (expected 'round' or 'floor')",
                other
            )),
        }
    }
}

impl fmt::Display for SecondsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecondsPolicy::Round => f.write_str("round"),
            SecondsPolicy::Floor => f.write_str("floor"),
        }
    }
}

/// `(second, count)` points in ascending second order. Seconds without a
/// detection are absent rather than zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CountSeries {
    points: Vec<(i64, u64)>,
}

impl CountSeries {
    pub fn points(&self) -> &[(i64, u64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.points.iter().map(|(_, count)| count).sum()
    }

    pub fn max_count(&self) -> u64 {
        self.points.iter().map(|(_, count)| *count).max().unwrap_or(0)
    }

    pub fn count_at(&self, second: i64) -> Option<u64> {
        self.points
            .binary_search_by_key(&second, |(s, _)| *s)
            .ok()
            .map(|i| self.points[i].1)
    }
}

/// Everything `visualize` needs besides the connection.
#[derive(Clone)]
pub struct ReportSettings {
    pub target_class: String,
    pub policy: SecondsPolicy,
    pub chart_path: PathBuf,
    pub font: FontArc,
}

/// Timestamps (ms) of every stored object whose class is `target_class`, one
/// entry per object.
pub fn target_timestamps_ms(conn: &Connection, target_class: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT f.timestamp
        FROM Objects o
        JOIN Frames f ON o.frame_id = f.frame_id
        JOIN Classes c ON o.class_id = c.class_id
        WHERE c.class_name = ?1
        ORDER BY o.object_id ASC
        "#,
    )?;
    let rows = stmt.query_map(params![target_class], |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        let raw = row?;
        let ms = raw
            .trim()
            .parse::<i64>()
            .map_err(|_| anyhow!("frame timestamp '{}' is not an integer millisecond value", raw))?;
        out.push(ms);
    }
    Ok(out)
}

pub fn counts_per_second(timestamps_ms: &[i64], policy: SecondsPolicy) -> CountSeries {
    let mut buckets: BTreeMap<i64, u64> = BTreeMap::new();
    for &ms in timestamps_ms {
        *buckets.entry(policy.to_seconds(ms)).or_default() += 1;
    }
    CountSeries {
        points: buckets.into_iter().collect(),
    }
}

/// Aggregate the store and write the chart. Returns the plotted series.
pub fn visualize(conn: &Connection, settings: &ReportSettings) -> Result<CountSeries> {
    let timestamps = target_timestamps_ms(conn, &settings.target_class)?;
    let series = counts_per_second(&timestamps, settings.policy);
    log::info!(
        "report: {} '{}' detections across {} seconds",
        series.total(),
        settings.target_class,
        series.len()
    );
    render_chart(&series, &settings.chart_path, &settings.font)?;
    log::info!("report: chart written to {}", settings.chart_path.display());
    Ok(series)
}
