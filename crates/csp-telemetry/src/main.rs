mod bootstrap;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use telemetry_core::models::EvaluationStats;
use telemetry_core::settings::Settings;
use telemetry_data::aggregator::{aggregate_log_path, AggregateOptions};
use telemetry_data::classifier::UrlStatusClassifier;
use telemetry_data::evaluation::EvaluationStatsStore;
use telemetry_data::load_times::compare_load_times;

use report::Section;

fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    tracing::info!("csp-telemetry v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!("View: {}, Format: {}", settings.view, settings.format);

    let sections = run_views(&settings)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match settings.format.as_str() {
        "json" => report::render_json(&mut out, &sections)?,
        _ => report::render_text(&mut out, &sections)?,
    }

    Ok(())
}

/// Produce the sections for the selected view, in display order.
fn run_views(settings: &Settings) -> Result<Vec<Section>> {
    let normalizer = settings.normalizer()?;
    let view = settings.view.as_str();
    let wants = |name: &str| view == "all" || view == name;

    let mut sections = Vec::new();

    if wants("violations") {
        let options = AggregateOptions {
            since: settings.since(Utc::now()),
        };
        let run = aggregate_log_path(&settings.violation_log, &normalizer, options)
            .with_context(|| {
                format!(
                    "aggregating violations from {}",
                    settings.violation_log.display()
                )
            })?;

        if let Some(output) = &settings.output {
            if run.data.is_empty() {
                tracing::info!("No violations counted; not writing {}", output.display());
            } else {
                EvaluationStats::from_aggregation(&run.data).save_to(output)?;
                tracing::info!("Wrote aggregated statistics to {}", output.display());
            }
        }

        sections.push(report::violations_section(&run));
    }

    if wants("urls") {
        let classification = UrlStatusClassifier::classify_file(&settings.url_map);
        sections.push(report::urls_section(&classification));
    }

    if wants("load-times") {
        let comparison = compare_load_times(&settings.load_times);
        sections.push(report::load_times_section(&comparison));
    }

    if wants("evaluation") {
        let stats = EvaluationStats::load_from(&settings.stats_file);
        sections.push(report::evaluation_section(&stats));
    }

    if sections.is_empty() {
        anyhow::bail!("Unknown view: {}", view);
    }

    Ok(sections)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
