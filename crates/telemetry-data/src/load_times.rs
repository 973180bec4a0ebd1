//! Page load time comparison between CSP-enabled and CSP-disabled runs.
//!
//! The load-time harness writes a small CSV with a `Load-Time` column
//! (milliseconds) and a `CSP` label column. Samples are grouped by label and
//! summarized by their median.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use serde::Serialize;
use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::models::{Ingested, LoadTimeGroup, LoadTimeSample};
use telemetry_core::percentile::median;
use telemetry_core::summary::{group_by, StatisticsReporter, StatisticsSummary};
use tracing::{debug, warn};

pub const LABEL_COLUMN: &str = "CSP";
pub const LOAD_TIME_COLUMN: &str = "Load-Time";

// ── Parsed input ──────────────────────────────────────────────────────────────

/// Samples read from a load-time CSV.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadTimeSamples {
    pub samples: Vec<LoadTimeSample>,
    /// Data rows that could not be parsed.
    pub skipped: usize,
}

/// Parse load-time CSV from `reader`. `source` is only used in errors.
///
/// The header row must name both [`LABEL_COLUMN`] and [`LOAD_TIME_COLUMN`].
/// Data rows with the wrong number of fields or a non-numeric load time are
/// skipped and counted.
pub fn parse_load_times<R: BufRead>(reader: R, source: &Path) -> Result<LoadTimeSamples> {
    let mut lines = reader.lines();

    let header = loop {
        match lines.next() {
            Some(line) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Err(TelemetryError::malformed(source, "file is empty")),
        }
    };

    let columns = split_row(&header);
    let position = |name: &str| {
        columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TelemetryError::malformed(source, format!("missing {name} column")))
    };
    let label_idx = position(LABEL_COLUMN)?;
    let time_idx = position(LOAD_TIME_COLUMN)?;

    let mut parsed = LoadTimeSamples::default();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields = split_row(&line);
        if fields.len() != columns.len() {
            parsed.skipped += 1;
            continue;
        }
        match fields[time_idx].parse::<f64>() {
            Ok(ms) if ms.is_finite() => parsed.samples.push(LoadTimeSample {
                label: fields[label_idx].clone(),
                load_time_ms: ms,
            }),
            _ => parsed.skipped += 1,
        }
    }

    Ok(parsed)
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// Per-label medians plus the share of samples each label contributed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadTimeComparison {
    /// Groups sorted by label.
    pub groups: Vec<LoadTimeGroup>,
    /// Sample count share per label; `None` when there are no samples.
    pub sample_share: Option<StatisticsSummary>,
    /// Rows skipped while parsing.
    pub skipped: usize,
}

impl LoadTimeComparison {
    /// Group `samples` by label and compute each group's median.
    pub fn from_samples(samples: LoadTimeSamples) -> Self {
        let groups: Vec<LoadTimeGroup> = group_by(samples.samples, |s| s.label.clone())
            .into_iter()
            .filter_map(|(label, members)| {
                let times: Vec<f64> = members.iter().map(|s| s.load_time_ms).collect();
                median(&times).map(|median_ms| LoadTimeGroup {
                    label,
                    samples: members.len(),
                    median_ms,
                })
            })
            .collect();

        let sample_share = StatisticsReporter::summarize(
            groups.iter().map(|g| (g.label.as_str(), g.samples as u64)),
        );

        Self {
            groups,
            sample_share,
            skipped: samples.skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, label: &str) -> Option<&LoadTimeGroup> {
        self.groups.iter().find(|g| g.label == label)
    }
}

/// Read the CSV at `path` and compare its groups.
///
/// Missing or malformed files are recovered to an empty comparison with the
/// condition in `issue`.
pub fn compare_load_times(path: &Path) -> Ingested<LoadTimeComparison> {
    let parsed = File::open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => TelemetryError::SourceNotFound(path.to_path_buf()),
            _ => TelemetryError::FileRead {
                path: path.to_path_buf(),
                source: e,
            },
        })
        .and_then(|file| parse_load_times(BufReader::new(file), path));

    match parsed {
        Ok(samples) => {
            debug!(
                "Read {} load-time samples from {} ({} skipped)",
                samples.samples.len(),
                path.display(),
                samples.skipped
            );
            Ingested::clean(LoadTimeComparison::from_samples(samples))
        }
        Err(e) => {
            warn!("{}", e);
            Ingested::recovered(LoadTimeComparison::default(), e)
        }
    }
}

/// Split one CSV row into trimmed fields.
///
/// Commas inside double-quoted fields are kept, and `""` inside quotes is a
/// literal quote.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

// ── Tests ─────────────────────────────────────────────────────────────────────
