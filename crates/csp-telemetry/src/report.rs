//! Plain-text and JSON rendering of the statistics views.
//!
//! Every view is reduced to a [`Section`]: an optional summary table plus
//! extra rows and notes. Sections render to stdout in order.

use std::io::Write;

use serde::Serialize;
use telemetry_core::formatting::{category_label, format_count, format_number, format_percentage};
use telemetry_core::models::{EvaluationStats, Ingested, LoadTimeGroup};
use telemetry_core::summary::{StatisticsReporter, StatisticsSummary};
use telemetry_data::aggregator::Aggregation;
use telemetry_data::classifier::UrlClassification;
use telemetry_data::load_times::LoadTimeComparison;

pub const NOTHING_TO_REPORT: &str = "Nothing to report.";

// ── Section ───────────────────────────────────────────────────────────────────

/// One rendered view.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    /// View name, used as the JSON key.
    #[serde(skip)]
    pub view: &'static str,
    #[serde(skip)]
    pub title: &'static str,
    /// Column header for the category column.
    #[serde(skip)]
    pub category_header: &'static str,
    /// Title-case category keys in text output.
    #[serde(skip)]
    pub humanize: bool,
    pub summary: Option<StatisticsSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub medians: Vec<LoadTimeGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl Section {
    fn new(view: &'static str, title: &'static str, category_header: &'static str) -> Self {
        Self {
            view,
            title,
            category_header,
            humanize: false,
            summary: None,
            medians: Vec::new(),
            notes: Vec::new(),
            issue: None,
        }
    }

    fn with_issue<T>(mut self, ingested: &Ingested<T>) -> Self {
        self.issue = ingested.issue.as_ref().map(ToString::to_string);
        self
    }
}

pub fn violations_section(run: &Ingested<Aggregation>) -> Section {
    let mut section =
        Section::new("violations", "CSP violations", "Directive").with_issue(run);
    section.summary = StatisticsReporter::summarize_directives(&run.data.counts);

    if run.data.malformed > 0 {
        section.notes.push(counted(
            run.data.malformed,
            "malformed line skipped",
            "malformed lines skipped",
        ));
    }
    if run.data.filtered > 0 {
        section.notes.push(counted(
            run.data.filtered,
            "violation outside the time window",
            "violations outside the time window",
        ));
    }
    section
}

pub fn urls_section(classification: &Ingested<UrlClassification>) -> Section {
    let mut section =
        Section::new("urls", "URL safety", "Category").with_issue(classification);
    section.humanize = true;
    section.summary = StatisticsReporter::summarize_urls(&classification.data.statistics);

    if classification.data.unknown > 0 {
        section.notes.push(counted(
            classification.data.unknown as u64,
            "URL not yet checked",
            "URLs not yet checked",
        ));
    }
    section
}

pub fn load_times_section(comparison: &Ingested<LoadTimeComparison>) -> Section {
    let mut section =
        Section::new("load-times", "Page load times", "Label").with_issue(comparison);
    section.summary = comparison.data.sample_share.clone();
    section.medians = comparison.data.groups.clone();

    if comparison.data.skipped > 0 {
        section.notes.push(counted(
            comparison.data.skipped as u64,
            "row skipped",
            "rows skipped",
        ));
    }
    section
}

pub fn evaluation_section(stats: &Ingested<EvaluationStats>) -> Section {
    let mut section =
        Section::new("evaluation", "Evaluation statistics", "Directive").with_issue(stats);
    section.summary = StatisticsReporter::summarize_directives(&stats.data.violation_counts());

    let domains: usize = stats
        .data
        .0
        .values()
        .map(|s| s.discovered_domains.len())
        .sum();
    if domains > 0 {
        section.notes.push(counted(
            domains as u64,
            "discovered domain",
            "discovered domains",
        ));
    }
    section
}

/// `"1 row skipped"`, `"2 rows skipped"`.
fn counted(count: u64, singular: &str, plural: &str) -> String {
    let noun = if count == 1 { singular } else { plural };
    format!("{} {}", format_count(count), noun)
}

// ── Text ──────────────────────────────────────────────────────────────────────

/// Render sections as aligned text tables.
pub fn render_text<W: Write>(out: &mut W, sections: &[Section]) -> std::io::Result<()> {
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        render_section_text(out, section)?;
    }
    Ok(())
}

fn render_section_text<W: Write>(out: &mut W, section: &Section) -> std::io::Result<()> {
    writeln!(out, "{}", section.title)?;
    writeln!(out, "{}", "=".repeat(section.title.len()))?;

    if let Some(issue) = &section.issue {
        writeln!(out, "warning: {}", issue)?;
    }

    let Some(summary) = &section.summary else {
        writeln!(out, "{}", NOTHING_TO_REPORT)?;
        return Ok(());
    };

    let rows: Vec<[String; 3]> = summary
        .entries()
        .iter()
        .map(|entry| {
            let label = if section.humanize {
                category_label(entry.category())
            } else {
                entry.category().to_string()
            };
            [
                label,
                format_count(entry.count()),
                format_percentage(entry.percentage()),
            ]
        })
        .collect();
    let total = [
        "Total".to_string(),
        format_count(summary.total()),
        format_percentage(100.0),
    ];

    let width = rows
        .iter()
        .chain(std::iter::once(&total))
        .map(|r| r[0].len())
        .chain(std::iter::once(section.category_header.len()))
        .max()
        .unwrap_or(0);
    let count_width = rows
        .iter()
        .chain(std::iter::once(&total))
        .map(|r| r[1].len())
        .max()
        .unwrap_or(0)
        .max("Count".len());

    writeln!(
        out,
        "{:<width$}  {:>count_width$}  {:>7}",
        section.category_header, "Count", "Share"
    )?;
    for row in rows.iter().chain(std::iter::once(&total)) {
        writeln!(
            out,
            "{:<width$}  {:>count_width$}  {:>7}",
            row[0], row[1], row[2]
        )?;
    }

    if !section.medians.is_empty() {
        writeln!(out)?;
        for group in &section.medians {
            writeln!(
                out,
                "median {:<width$}  {} ms",
                group.label,
                format_number(group.median_ms, 1)
            )?;
        }
    }

    for note in &section.notes {
        writeln!(out, "({})", note)?;
    }
    Ok(())
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// Render sections as one pretty JSON object keyed by view name.
pub fn render_json<W: Write>(out: &mut W, sections: &[Section]) -> std::io::Result<()> {
    let mut map = serde_json::Map::new();
    for section in sections {
        let value = serde_json::to_value(section).map_err(std::io::Error::other)?;
        map.insert(section.view.to_string(), value);
    }
    serde_json::to_writer_pretty(&mut *out, &serde_json::Value::Object(map))
        .map_err(std::io::Error::other)?;
    writeln!(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
