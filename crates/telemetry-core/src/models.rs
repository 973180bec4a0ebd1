use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::TelemetryError;

/// Report field naming the directive that was violated.
pub const VIOLATED_DIRECTIVE_FIELD: &str = "violated-directive";
/// Report field holding the blocked resource URI.
pub const BLOCKED_URI_FIELD: &str = "blocked-uri";
/// Wrapper key browsers put around the report body.
pub const CSP_REPORT_FIELD: &str = "csp-report";

// ── Ingested ──────────────────────────────────────────────────────────────────

/// Result of reading a whole input source.
///
/// A missing or unreadable source is recovered to an empty (or zeroed) value,
/// with the condition kept in `issue` so callers can report it.
#[derive(Debug)]
pub struct Ingested<T> {
    pub data: T,
    pub issue: Option<TelemetryError>,
}

impl<T> Ingested<T> {
    /// Data read without any source-level problem.
    pub fn clean(data: T) -> Self {
        Self { data, issue: None }
    }

    /// Fallback data standing in for a source that could not be read.
    pub fn recovered(data: T, issue: TelemetryError) -> Self {
        Self {
            data,
            issue: Some(issue),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issue.is_none()
    }
}

// ── ViolationRecord ───────────────────────────────────────────────────────────

/// One CSP violation report read from the violation log.
///
/// The violated directive is extracted up front; every other report field
/// (`blocked-uri`, `document-uri`, ...) is kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationRecord {
    directive: String,
    timestamp: Option<DateTime<Utc>>,
    report: Map<String, Value>,
}

impl ViolationRecord {
    /// Build a record from a report payload.
    ///
    /// Returns `None` when `violated-directive` is absent or not a string.
    /// A `timestamp` field is picked up when it is an RFC 3339 string.
    pub fn from_report(report: Map<String, Value>) -> Option<Self> {
        let directive = report
            .get(VIOLATED_DIRECTIVE_FIELD)
            .and_then(Value::as_str)?
            .to_string();

        let timestamp = report
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Some(Self {
            directive,
            timestamp,
            report,
        })
    }

    /// The raw (un-normalized) violated directive.
    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// When the report was logged, if the log recorded it.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// The blocked resource URI, if present.
    pub fn blocked_uri(&self) -> Option<&str> {
        self.field(BLOCKED_URI_FIELD).and_then(Value::as_str)
    }

    /// Any pass-through report field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.report.get(name)
    }

    /// The full report payload.
    pub fn report(&self) -> &Map<String, Value> {
        &self.report
    }
}

// ── DirectiveCount ────────────────────────────────────────────────────────────

/// Canonical directive name → number of violations, sorted by name.
pub type DirectiveCount = BTreeMap<String, u64>;

// ── URL safety ────────────────────────────────────────────────────────────────

/// One entry of the URL safety map written by the URL checker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    /// `Some(true)` safe, `Some(false)` unsafe, `None` not yet determined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe: Option<bool>,
    /// Free-form status such as `"jsonp_vulnerable"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Number of scanning vendors that flagged the URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detections: Option<u64>,
    /// Directive under which the URL was discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
    /// When the URL was last checked.
    #[serde(
        default,
        rename = "lastChecked",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_checked: Option<String>,
}

impl UrlRecord {
    /// Lenient conversion from an arbitrary JSON value.
    ///
    /// Fields of the wrong type are treated as absent, so a non-boolean
    /// `safe` makes the record "unknown" rather than failing the whole map.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name);
        Self {
            safe: field("safe").and_then(Value::as_bool),
            status: field("status").and_then(Value::as_str).map(str::to_string),
            detections: field("detections").and_then(Value::as_u64),
            directive: field("directive")
                .and_then(Value::as_str)
                .map(str::to_string),
            last_checked: field("lastChecked")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

/// Status string marking a URL that serves exploitable JSONP.
pub const JSONP_VULNERABLE_STATUS: &str = "jsonp_vulnerable";

/// Bucket a classified URL falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlCategory {
    Safe,
    Malicious,
    JsonpVulnerable,
}

impl UrlCategory {
    /// All categories in reporting order.
    pub const ALL: [UrlCategory; 3] = [
        UrlCategory::Safe,
        UrlCategory::Malicious,
        UrlCategory::JsonpVulnerable,
    ];

    /// The category's key in statistics output.
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlCategory::Safe => "safe",
            UrlCategory::Malicious => "malicious",
            UrlCategory::JsonpVulnerable => JSONP_VULNERABLE_STATUS,
        }
    }
}

impl fmt::Display for UrlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category URL counts, in [`UrlCategory::ALL`] order.
///
/// Built either with only the non-zero categories ([`Self::from_tally`]) or
/// with every category at zero ([`Self::zeroed`]) when the source could not
/// be read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UrlStatistics {
    counts: Vec<(UrlCategory, u64)>,
}

impl UrlStatistics {
    /// Every category present with a count of zero.
    pub fn zeroed() -> Self {
        Self {
            counts: UrlCategory::ALL.iter().map(|&c| (c, 0)).collect(),
        }
    }

    /// Keep the categories of `tally` with a positive count.
    pub fn from_tally(tally: &BTreeMap<UrlCategory, u64>) -> Self {
        Self {
            counts: UrlCategory::ALL
                .iter()
                .filter_map(|c| tally.get(c).filter(|&&n| n > 0).map(|&n| (*c, n)))
                .collect(),
        }
    }

    /// Count for `category`, `None` when the category is not present.
    pub fn get(&self, category: UrlCategory) -> Option<u64> {
        self.counts
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, n)| *n)
    }

    /// Sum over all present categories.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    /// Number of categories present (including zero-valued ones).
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// `true` when no category is present at all.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `(category, count)` pairs in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (UrlCategory, u64)> + '_ {
        self.counts.iter().copied()
    }
}

impl Serialize for UrlStatistics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len()))?;
        for (category, count) in &self.counts {
            map.serialize_entry(category.as_str(), count)?;
        }
        map.end()
    }
}

// ── Evaluation stats ──────────────────────────────────────────────────────────

/// Hand-off record for one canonical directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveStats {
    /// Number of violations of this directive.
    pub violation_count: u64,
    /// Distinct blocked origins (or `inline`) in first-seen order.
    #[serde(default)]
    pub discovered_domains: Vec<String>,
}

/// Canonical directive name → [`DirectiveStats`], serialized as a plain
/// JSON object with sorted keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationStats(pub BTreeMap<String, DirectiveStats>);

impl EvaluationStats {
    /// Project to a [`DirectiveCount`] for the statistics reporter.
    pub fn violation_counts(&self) -> DirectiveCount {
        self.0
            .iter()
            .map(|(directive, stats)| (directive.clone(), stats.violation_count))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, directive: &str) -> Option<&DirectiveStats> {
        self.0.get(directive)
    }
}

// ── Load times ────────────────────────────────────────────────────────────────

/// One page-load measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTimeSample {
    /// CSP middleware label, e.g. `"With CSP"`.
    pub label: String,
    /// Load time in milliseconds.
    pub load_time_ms: f64,
}

/// Median load time for one CSP label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTimeGroup {
    pub label: String,
    pub samples: usize,
    pub median_ms: f64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_violation_record_from_report() {
        let rec = ViolationRecord::from_report(report(json!({
            "violated-directive": "script-src-elem",
            "blocked-uri": "https://cdn.example.com/x.js",
            "document-uri": "http://localhost:6969/",
        })))
        .unwrap();

        assert_eq!(rec.directive(), "script-src-elem");
        assert_eq!(rec.blocked_uri(), Some("https://cdn.example.com/x.js"));
        assert_eq!(
            rec.field("document-uri").and_then(Value::as_str),
            Some("http://localhost:6969/")
        );
        assert!(rec.timestamp().is_none());
    }

    #[test]
    fn test_violation_record_requires_string_directive() {
        assert!(ViolationRecord::from_report(report(json!({"blocked-uri": "inline"}))).is_none());
        assert!(
            ViolationRecord::from_report(report(json!({"violated-directive": 3}))).is_none()
        );
    }

    #[test]
    fn test_violation_record_timestamp() {
        let rec = ViolationRecord::from_report(report(json!({
            "timestamp": "2024-03-01T12:00:00.000Z",
            "violated-directive": "img-src",
        })))
        .unwrap();
        let ts = rec.timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_url_record_from_value_lenient() {
        let rec = UrlRecord::from_value(&json!({
            "safe": "true",
            "status": 5,
            "detections": 2,
            "directive": "script-src",
        }));
        assert_eq!(rec.safe, None);
        assert_eq!(rec.status, None);
        assert_eq!(rec.detections, Some(2));
        assert_eq!(rec.directive.as_deref(), Some("script-src"));

        let rec = UrlRecord::from_value(&json!("not an object"));
        assert_eq!(rec, UrlRecord::default());
    }

    #[test]
    fn test_url_statistics_zeroed() {
        let stats = UrlStatistics::zeroed();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.total(), 0);
        for category in UrlCategory::ALL {
            assert_eq!(stats.get(category), Some(0));
        }
        assert_eq!(
            serde_json::to_string(&stats).unwrap(),
            r#"{"safe":0,"malicious":0,"jsonp_vulnerable":0}"#
        );
    }

    #[test]
    fn test_url_statistics_from_tally_drops_zero() {
        let mut tally = BTreeMap::new();
        tally.insert(UrlCategory::JsonpVulnerable, 1);
        tally.insert(UrlCategory::Safe, 2);
        tally.insert(UrlCategory::Malicious, 0);

        let stats = UrlStatistics::from_tally(&tally);
        assert_eq!(stats.len(), 2);
        assert_eq!(stats.get(UrlCategory::Malicious), None);
        let order: Vec<UrlCategory> = stats.iter().map(|(c, _)| c).collect();
        assert_eq!(order, vec![UrlCategory::Safe, UrlCategory::JsonpVulnerable]);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_evaluation_stats_serde_shape() {
        let mut map = BTreeMap::new();
        map.insert(
            "script-src".to_string(),
            DirectiveStats {
                violation_count: 2,
                discovered_domains: vec!["https://cdn.example.com".to_string()],
            },
        );
        let stats = EvaluationStats(map);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(
            json,
            json!({"script-src": {"violationCount": 2, "discoveredDomains": ["https://cdn.example.com"]}})
        );

        let back: EvaluationStats =
            serde_json::from_value(json!({"img-src": {"violationCount": 4}})).unwrap();
        assert_eq!(back.get("img-src").unwrap().violation_count, 4);
        assert!(back.get("img-src").unwrap().discovered_domains.is_empty());
        assert_eq!(back.violation_counts().get("img-src"), Some(&4));
    }
}
