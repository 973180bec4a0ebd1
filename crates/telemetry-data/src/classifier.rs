//! URL safety classification.
//!
//! The URL checker keeps a JSON object keyed by URL. Each entry is sorted
//! into one of the [`UrlCategory`] buckets; entries whose safety has not been
//! determined yet are left out of the statistics entirely.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::{Map, Value};
use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::models::{
    Ingested, UrlCategory, UrlRecord, UrlStatistics, JSONP_VULNERABLE_STATUS,
};
use tracing::{debug, warn};

// ── UrlClassification ─────────────────────────────────────────────────────────

/// Outcome of classifying a URL map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlClassification {
    /// Counts per category.
    pub statistics: UrlStatistics,
    /// Entries whose `safe` flag was absent (excluded from `statistics`).
    pub unknown: usize,
}

impl UrlClassification {
    /// Stand-in for a map that could not be read: every category at zero.
    pub fn zeroed() -> Self {
        Self {
            statistics: UrlStatistics::zeroed(),
            unknown: 0,
        }
    }

    /// Number of classified (non-unknown) entries.
    pub fn classified(&self) -> u64 {
        self.statistics.total()
    }
}

// ── UrlStatusClassifier ───────────────────────────────────────────────────────

/// Stateless URL bucket assignment.
pub struct UrlStatusClassifier;

impl UrlStatusClassifier {
    /// Category for one record, or `None` when its safety is unknown.
    ///
    /// 1. `safe == true` → [`UrlCategory::Safe`]
    /// 2. `safe == false`, status `jsonp_vulnerable` → [`UrlCategory::JsonpVulnerable`]
    /// 3. `safe == false`, any other status → [`UrlCategory::Malicious`]
    pub fn classify_record(record: &UrlRecord) -> Option<UrlCategory> {
        match record.safe? {
            true => Some(UrlCategory::Safe),
            false if record.status.as_deref() == Some(JSONP_VULNERABLE_STATUS) => {
                Some(UrlCategory::JsonpVulnerable)
            }
            false => Some(UrlCategory::Malicious),
        }
    }

    /// Classify every record exactly once.
    pub fn classify<'a, I>(records: I) -> UrlClassification
    where
        I: IntoIterator<Item = &'a UrlRecord>,
    {
        let mut tally: BTreeMap<UrlCategory, u64> = BTreeMap::new();
        let mut unknown = 0;

        for record in records {
            match Self::classify_record(record) {
                Some(category) => *tally.entry(category).or_insert(0) += 1,
                None => unknown += 1,
            }
        }

        UrlClassification {
            statistics: UrlStatistics::from_tally(&tally),
            unknown,
        }
    }

    /// Classify the values of a parsed URL map.
    pub fn classify_map(map: &Map<String, Value>) -> UrlClassification {
        let records: Vec<UrlRecord> = map.values().map(UrlRecord::from_value).collect();
        Self::classify(&records)
    }

    /// Read and classify the URL map at `path`.
    ///
    /// Any failure to read or parse the map is recovered to
    /// [`UrlClassification::zeroed`] with the condition in `issue`.
    pub fn classify_file(path: &Path) -> Ingested<UrlClassification> {
        match load_url_map(path) {
            Ok(map) => {
                let classification = Self::classify_map(&map);
                debug!(
                    "Classified {} URLs from {} ({} unknown)",
                    map.len(),
                    path.display(),
                    classification.unknown
                );
                Ingested::clean(classification)
            }
            Err(e) => {
                warn!("{}", e);
                Ingested::recovered(UrlClassification::zeroed(), e)
            }
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Read a URL safety map from disk.
///
/// * missing file → [`TelemetryError::SourceNotFound`]
/// * empty file, invalid JSON or a non-object top level →
///   [`TelemetryError::SourceMalformed`]
pub fn load_url_map(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => TelemetryError::SourceNotFound(path.to_path_buf()),
        _ => TelemetryError::FileRead {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    if content.trim().is_empty() {
        return Err(TelemetryError::malformed(path, "file is empty"));
    }

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TelemetryError::malformed(
            path,
            "top-level value is not an object",
        )),
        Err(e) => Err(TelemetryError::malformed(path, e)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
