//! Violation counting per canonical directive.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use telemetry_core::directives::DirectiveNormalizer;
use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::models::{DirectiveCount, Ingested, ViolationRecord};
use tracing::{debug, info, warn};

use crate::reader::{find_log_files, open_violation_log};

/// Pseudo-origin recorded for inline script/style violations.
pub const INLINE_ORIGIN: &str = "inline";

// ── AggregateOptions ──────────────────────────────────────────────────────────

/// Filters applied during an aggregation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateOptions {
    /// Drop records timestamped before this instant. Records without a
    /// timestamp are always kept.
    pub since: Option<DateTime<Utc>>,
}

// ── Aggregation ───────────────────────────────────────────────────────────────

/// Finished result of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// Canonical directive → violation count.
    pub counts: DirectiveCount,
    /// Canonical directive → distinct blocked origins, first-seen order.
    pub domains: BTreeMap<String, Vec<String>>,
    /// Records counted into `counts`.
    pub parsed: u64,
    /// Lines skipped as malformed.
    pub malformed: u64,
    /// Records dropped by the time window.
    pub filtered: u64,
}

impl Aggregation {
    /// `true` when no violation was counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all directive counts (equals `parsed`).
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    fn add_record(&mut self, record: &ViolationRecord, normalizer: &DirectiveNormalizer) {
        let directive = normalizer.normalize(record.directive());
        *self.counts.entry(directive.to_string()).or_insert(0) += 1;
        self.parsed += 1;

        if let Some(origin) = record.blocked_uri().and_then(blocked_origin) {
            let seen = self.domains.entry(directive.to_string()).or_default();
            if !seen.contains(&origin) {
                seen.push(origin);
            }
        }
    }
}

// ── ViolationAggregator ───────────────────────────────────────────────────────

/// Folds a record sequence into an [`Aggregation`].
pub struct ViolationAggregator<'a> {
    normalizer: &'a DirectiveNormalizer,
    options: AggregateOptions,
}

impl<'a> ViolationAggregator<'a> {
    pub fn new(normalizer: &'a DirectiveNormalizer) -> Self {
        Self::with_options(normalizer, AggregateOptions::default())
    }

    pub fn with_options(normalizer: &'a DirectiveNormalizer, options: AggregateOptions) -> Self {
        Self {
            normalizer,
            options,
        }
    }

    /// Consume `records` completely and return the finished aggregation.
    ///
    /// [`TelemetryError::RecordMalformed`] items are counted and skipped. Any
    /// other error aborts the pass; nothing accumulated so far is returned.
    pub fn aggregate<I>(&self, records: I) -> Result<Aggregation>
    where
        I: IntoIterator<Item = Result<ViolationRecord>>,
    {
        let mut aggregation = Aggregation::default();
        self.accumulate(&mut aggregation, records)?;
        Ok(aggregation)
    }

    fn accumulate<I>(&self, aggregation: &mut Aggregation, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<ViolationRecord>>,
    {
        for item in records {
            let record = match item {
                Ok(record) => record,
                Err(TelemetryError::RecordMalformed { line, reason }) => {
                    debug!("Skipping malformed record at line {}: {}", line, reason);
                    aggregation.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if self.is_filtered(&record) {
                aggregation.filtered += 1;
                continue;
            }

            aggregation.add_record(&record, self.normalizer);
        }
        Ok(())
    }

    fn is_filtered(&self, record: &ViolationRecord) -> bool {
        match (self.options.since, record.timestamp()) {
            (Some(cutoff), Some(ts)) => ts < cutoff,
            _ => false,
        }
    }
}

// ── Path-level entry point ────────────────────────────────────────────────────

/// Aggregate the violation log at `path` (a file, or a directory of logs).
///
/// A missing or malformed source is recovered to an empty aggregation with
/// the condition in [`Ingested::issue`]. A read failure part-way through a
/// file is returned as an error.
pub fn aggregate_log_path(
    path: &Path,
    normalizer: &DirectiveNormalizer,
    options: AggregateOptions,
) -> Result<Ingested<Aggregation>> {
    let files = if path.is_dir() {
        let files = find_log_files(path);
        if files.is_empty() {
            let issue = TelemetryError::SourceNotFound(path.to_path_buf());
            warn!("{}", issue);
            return Ok(Ingested::recovered(Aggregation::default(), issue));
        }
        files
    } else {
        vec![path.to_path_buf()]
    };

    let aggregator = ViolationAggregator::with_options(normalizer, options);
    let mut aggregation = Aggregation::default();

    for file in &files {
        let reader = match open_violation_log(file) {
            Ok(reader) => reader,
            Err(e) if e.is_source_level() => {
                warn!("{}", e);
                return Ok(Ingested::recovered(Aggregation::default(), e));
            }
            Err(e) => return Err(e),
        };

        aggregator
            .accumulate(&mut aggregation, reader)
            .map_err(|e| match e {
                TelemetryError::Io(source) => TelemetryError::FileRead {
                    path: file.clone(),
                    source,
                },
                other => other,
            })?;
    }

    info!(
        "Aggregated {} violations across {} directives ({} malformed, {} filtered)",
        aggregation.parsed,
        aggregation.counts.len(),
        aggregation.malformed,
        aggregation.filtered,
    );

    Ok(Ingested::clean(aggregation))
}

// ── Origins ───────────────────────────────────────────────────────────────────

/// Origin recorded for a blocked URI.
///
/// `http(s)` URIs give `scheme://host[:port]` (lowercased, default ports
/// dropped, IPv6 literals kept in brackets); the literal `inline` is kept. Anything else (`data:`, `eval`,
/// empty) has no origin.
///
/// ```
/// use telemetry_data::aggregator::blocked_origin;
///
/// assert_eq!(
///     blocked_origin("https://CDN.example.com:443/lib.js?v=2").as_deref(),
///     Some("https://cdn.example.com")
/// );
/// assert_eq!(blocked_origin("inline").as_deref(), Some("inline"));
/// assert_eq!(blocked_origin("data"), None);
/// ```
pub fn blocked_origin(uri: &str) -> Option<String> {
    if uri == INLINE_ORIGIN {
        return Some(INLINE_ORIGIN.to_string());
    }

    static ORIGIN_RE: OnceLock<Regex> = OnceLock::new();
    let re = ORIGIN_RE.get_or_init(|| {
        Regex::new(r"(?i)^(https?)://(?:[^@/?#]*@)?(\[[^\]/?#]+\]|[^/?#:\[\]]+)(?::(\d+))?")
            .expect("regex is valid")
    });

    let caps = re.captures(uri)?;
    let scheme = caps[1].to_lowercase();
    let host = caps[2].to_lowercase();
    let default_port = if scheme == "https" { "443" } else { "80" };

    match caps.get(3).map(|m| m.as_str()) {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
