//! Evaluation statistics hand-off file.
//!
//! After a violations pass the per-directive counts and discovered origins are
//! written as a JSON object keyed by canonical directive:
//!
//! ```json
//! {
//!   "script-src": { "violationCount": 3, "discoveredDomains": ["https://cdn.example.com"] }
//! }
//! ```

use std::path::Path;

use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::models::{DirectiveStats, EvaluationStats, Ingested};
use tracing::{debug, warn};

use crate::aggregator::Aggregation;

/// Build, persist and reload [`EvaluationStats`].
pub trait EvaluationStatsStore: Sized {
    /// Hand-off object for a finished aggregation.
    fn from_aggregation(run: &Aggregation) -> Self;

    /// Atomically write pretty JSON to `path`, creating parent directories.
    fn save_to(&self, path: &Path) -> Result<()>;

    /// Read a stats file back.
    ///
    /// A missing, empty or invalid file yields empty stats with the condition
    /// in `issue`.
    fn load_from(path: &Path) -> Ingested<Self>;
}

impl EvaluationStatsStore for EvaluationStats {
    fn from_aggregation(run: &Aggregation) -> Self {
        let stats = run
            .counts
            .iter()
            .map(|(directive, &violation_count)| {
                let discovered_domains = run.domains.get(directive).cloned().unwrap_or_default();
                (
                    directive.clone(),
                    DirectiveStats {
                        violation_count,
                        discovered_domains,
                    },
                )
            })
            .collect();
        EvaluationStats(stats)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, &json)?;
            std::fs::rename(&tmp, path)?;
            Ok(())
        };

        write().map_err(|e| {
            TelemetryError::Config(format!("cannot write {}: {}", path.display(), e))
        })?;
        debug!("Wrote evaluation stats for {} directives to {}", self.len(), path.display());
        Ok(())
    }

    fn load_from(path: &Path) -> Ingested<Self> {
        match read_stats(path) {
            Ok(stats) => Ingested::clean(stats),
            Err(e) => {
                warn!("{}", e);
                Ingested::recovered(EvaluationStats::default(), e)
            }
        }
    }
}

fn read_stats(path: &Path) -> Result<EvaluationStats> {
    let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => TelemetryError::SourceNotFound(path.to_path_buf()),
        _ => TelemetryError::FileRead {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    if content.trim().is_empty() {
        return Err(TelemetryError::malformed(path, "file is empty"));
    }
    serde_json::from_str(&content).map_err(|e| TelemetryError::malformed(path, e))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn aggregation() -> Aggregation {
        let mut run = Aggregation::default();
        run.counts.insert("script-src".to_string(), 3);
        run.counts.insert("img-src".to_string(), 1);
        run.domains.insert(
            "script-src".to_string(),
            vec!["https://cdn.example.com".to_string(), "inline".to_string()],
        );
        run
    }

    #[test]
    fn test_from_aggregation() {
        let stats = EvaluationStats::from_aggregation(&aggregation());

        assert_eq!(stats.len(), 2);
        let script = stats.get("script-src").unwrap();
        assert_eq!(script.violation_count, 3);
        assert_eq!(script.discovered_domains, vec!["https://cdn.example.com", "inline"]);
        assert!(stats.get("img-src").unwrap().discovered_domains.is_empty());
    }

    #[test]
    fn test_save_format_is_sorted_camel_case() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("evaluation-stats.json");
        EvaluationStats::from_aggregation(&aggregation())
            .save_to(&path)
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["img-src", "script-src"]);
        assert_eq!(value["script-src"]["violationCount"], 3);
        assert_eq!(value["img-src"]["discoveredDomains"], serde_json::json!([]));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evaluation-stats.json");
        let stats = EvaluationStats::from_aggregation(&aggregation());
        stats.save_to(&path).unwrap();

        let loaded = EvaluationStats::load_from(&path);
        assert!(loaded.is_clean());
        assert_eq!(loaded.data, stats);

        let counts = loaded.data.violation_counts();
        assert_eq!(
            counts,
            BTreeMap::from([("img-src".to_string(), 1), ("script-src".to_string(), 3)])
        );
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let loaded = EvaluationStats::load_from(&dir.path().join("none.json"));
        assert!(loaded.data.is_empty());
        assert!(matches!(loaded.issue, Some(TelemetryError::SourceNotFound(_))));
    }

    #[test]
    fn test_load_empty_or_invalid_file() {
        let dir = TempDir::new().unwrap();
        for (name, content) in [("empty.json", ""), ("bad.json", "{\"script-src\": 3}")] {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            let loaded = EvaluationStats::load_from(&path);
            assert!(loaded.data.is_empty());
            assert!(matches!(
                loaded.issue,
                Some(TelemetryError::SourceMalformed { .. })
            ));
        }
    }

    #[test]
    fn test_load_tolerates_missing_domains() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evaluation-stats.json");
        std::fs::write(&path, r#"{"style-src": {"violationCount": 2}}"#).unwrap();

        let loaded = EvaluationStats::load_from(&path);
        assert!(loaded.is_clean());
        assert_eq!(loaded.data.get("style-src").unwrap().violation_count, 2);
    }

    #[test]
    fn test_save_to_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let result = EvaluationStats::default().save_to(&blocker.join("stats.json"));
        assert!(matches!(result, Err(TelemetryError::Config(_))));
    }
}
