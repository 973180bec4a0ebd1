//! Percentage breakdowns over category counts.
//!
//! [`StatisticsReporter`] is the single place where counts become
//! percentages. The entries it produces are read-only, so a percentage can
//! never drift away from the count it was derived from.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::formatting::percentage;
use crate::models::{DirectiveCount, UrlStatistics};

/// Decimal places kept on every percentage.
pub const PERCENTAGE_DECIMALS: u32 = 1;

// ── SummaryEntry ──────────────────────────────────────────────────────────────

/// One category with its count and share of the total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryEntry {
    category: String,
    count: u64,
    percentage: f64,
}

impl SummaryEntry {
    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Share of the summary total, rounded to one decimal place.
    pub fn percentage(&self) -> f64 {
        self.percentage
    }
}

// ── StatisticsSummary ─────────────────────────────────────────────────────────

/// Percentage-annotated view of a count mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    total: u64,
    entries: Vec<SummaryEntry>,
}

impl StatisticsSummary {
    /// Sum of all retained counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Entries in the order the input supplied them.
    pub fn entries(&self) -> &[SummaryEntry] {
        &self.entries
    }

    pub fn get(&self, category: &str) -> Option<&SummaryEntry> {
        self.entries.iter().find(|e| e.category == category)
    }

    /// Sum of the rounded percentages (100.0 up to rounding).
    pub fn percentage_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.percentage).sum()
    }
}

// ── StatisticsReporter ────────────────────────────────────────────────────────

/// Stateless collection of summary calculations.
pub struct StatisticsReporter;

impl StatisticsReporter {
    /// Summarize `(category, count)` pairs.
    ///
    /// Zero counts are dropped. Returns `None` when the total is zero, i.e.
    /// there is nothing to report.
    pub fn summarize<I, K, C>(counts: I) -> Option<StatisticsSummary>
    where
        I: IntoIterator<Item = (K, C)>,
        K: fmt::Display,
        C: Borrow<u64>,
    {
        let retained: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(category, count)| (category.to_string(), *count.borrow()))
            .filter(|(_, count)| *count > 0)
            .collect();

        let total: u64 = retained.iter().map(|(_, count)| count).sum();
        if total == 0 {
            return None;
        }

        let entries = retained
            .into_iter()
            .map(|(category, count)| SummaryEntry {
                percentage: percentage(count as f64, total as f64, PERCENTAGE_DECIMALS),
                category,
                count,
            })
            .collect();

        Some(StatisticsSummary { total, entries })
    }

    /// Summary of a directive count mapping.
    pub fn summarize_directives(counts: &DirectiveCount) -> Option<StatisticsSummary> {
        Self::summarize(counts)
    }

    /// Summary of URL classification statistics.
    pub fn summarize_urls(stats: &UrlStatistics) -> Option<StatisticsSummary> {
        Self::summarize(stats.iter())
    }
}

// ── Grouping ──────────────────────────────────────────────────────────────────

/// Group `items` by the key `key_fn` extracts, keys sorted.
///
/// Group-then-summarize inputs (counts per category, samples per category)
/// are built on this.
pub fn group_by<T, K, F>(items: impl IntoIterator<Item = T>, key_fn: F) -> BTreeMap<K, Vec<T>>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(key_fn(&item)).or_default().push(item);
    }
    groups
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UrlCategory;

    fn directive_counts(pairs: &[(&str, u64)]) -> DirectiveCount {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_summarize_url_example() {
        let mut tally = BTreeMap::new();
        tally.insert(UrlCategory::Safe, 2);
        tally.insert(UrlCategory::JsonpVulnerable, 1);
        tally.insert(UrlCategory::Malicious, 1);
        let stats = UrlStatistics::from_tally(&tally);

        let summary = StatisticsReporter::summarize_urls(&stats).unwrap();
        assert_eq!(summary.total(), 4);
        let shares: Vec<(&str, u64, f64)> = summary
            .entries()
            .iter()
            .map(|e| (e.category(), e.count(), e.percentage()))
            .collect();
        assert_eq!(
            shares,
            vec![
                ("safe", 2, 50.0),
                ("malicious", 1, 25.0),
                ("jsonp_vulnerable", 1, 25.0),
            ]
        );
    }

    #[test]
    fn test_zeroed_statistics_have_no_summary() {
        assert!(StatisticsReporter::summarize_urls(&UrlStatistics::zeroed()).is_none());
    }

    #[test]
    fn test_empty_directive_counts_have_no_summary() {
        assert!(StatisticsReporter::summarize_directives(&DirectiveCount::new()).is_none());
    }

    #[test]
    fn test_zero_entries_dropped() {
        let counts = directive_counts(&[("img-src", 0), ("script-src", 3)]);
        let summary = StatisticsReporter::summarize_directives(&counts).unwrap();
        assert_eq!(summary.entries().len(), 1);
        assert!(summary.get("img-src").is_none());
        assert_eq!(summary.get("script-src").unwrap().percentage(), 100.0);
    }

    #[test]
    fn test_preserves_input_order() {
        let pairs = vec![("zeta", 1u64), ("alpha", 1), ("mid", 1)];
        let summary = StatisticsReporter::summarize(pairs).unwrap();
        let order: Vec<&str> = summary.entries().iter().map(|e| e.category()).collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_percentages_sum_to_hundred() {
        let cases: Vec<Vec<u64>> = vec![
            vec![1, 1, 1],
            vec![1, 2, 3, 4, 5, 6, 7],
            vec![999, 1],
            vec![1, 1, 1, 1, 1, 1],
            vec![17, 4, 9, 1, 33, 2],
        ];
        for counts in cases {
            let pairs: Vec<(String, u64)> = counts
                .iter()
                .enumerate()
                .map(|(i, c)| (format!("c{i}"), *c))
                .collect();
            let summary = StatisticsReporter::summarize(pairs).unwrap();
            let tolerance = 0.1 * summary.entries().len() as f64 + 1e-9;
            let sum = summary.percentage_sum();
            assert!(
                (sum - 100.0).abs() <= tolerance,
                "counts {counts:?} sum to {sum}"
            );
        }
    }

    #[test]
    fn test_thirds_round_to_one_decimal() {
        let summary = StatisticsReporter::summarize(vec![("a", 1u64), ("b", 2)]).unwrap();
        assert_eq!(summary.get("a").unwrap().percentage(), 33.3);
        assert_eq!(summary.get("b").unwrap().percentage(), 66.7);
    }

    #[test]
    fn test_summary_serializes() {
        let summary = StatisticsReporter::summarize(vec![("safe", 1u64)]).unwrap();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "total": 1,
                "entries": [{"category": "safe", "count": 1, "percentage": 100.0}],
            })
        );
    }

    #[test]
    fn test_group_by_sorted_keys() {
        let groups = group_by(vec![("b", 1), ("a", 2), ("b", 3)], |(k, _)| k.to_string());
        let keys: Vec<&String> = groups.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(groups["b"], vec![("b", 1), ("b", 3)]);
    }
}
