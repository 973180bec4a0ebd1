//! Canonical CSP directive names.
//!
//! Browsers report element-level variants of the fetch directives
//! (`script-src-elem`, and the truncated `script-src-ele` some clients emit).
//! Statistics are kept per base directive, so those variants are collapsed
//! through a single alias table.

use std::collections::HashMap;

use crate::error::{Result, TelemetryError};

// ── Alias table ───────────────────────────────────────────────────────────────

/// Built-in `(alias, canonical)` pairs.
pub const DEFAULT_DIRECTIVE_ALIASES: &[(&str, &str)] = &[
    ("script-src-ele", "script-src"),
    ("script-src-elem", "script-src"),
    ("style-src-ele", "style-src"),
    ("style-src-elem", "style-src"),
];

// ── DirectiveNormalizer ───────────────────────────────────────────────────────

/// Maps raw directive names to their canonical form.
///
/// Lookup is an exact match against the alias table; anything not in the
/// table is returned unchanged.
#[derive(Debug, Clone)]
pub struct DirectiveNormalizer {
    aliases: HashMap<String, String>,
}

impl Default for DirectiveNormalizer {
    fn default() -> Self {
        Self {
            aliases: DEFAULT_DIRECTIVE_ALIASES
                .iter()
                .map(|(alias, canonical)| (alias.to_string(), canonical.to_string()))
                .collect(),
        }
    }
}

impl DirectiveNormalizer {
    /// Normalizer backed by [`DEFAULT_DIRECTIVE_ALIASES`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizer with the default table plus `extra` aliases.
    ///
    /// Fails when any alias would break idempotence (see [`Self::with_alias`]).
    pub fn with_aliases<I, A, C>(extra: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, C)>,
        A: Into<String>,
        C: Into<String>,
    {
        extra
            .into_iter()
            .try_fold(Self::default(), |normalizer, (alias, canonical)| {
                normalizer.with_alias(alias, canonical)
            })
    }

    /// Add one alias to the table.
    ///
    /// The canonical target must not itself be an alias, and the alias must
    /// not already be the target of another entry; either would make
    /// `normalize(normalize(x)) != normalize(x)`.
    pub fn with_alias(
        mut self,
        alias: impl Into<String>,
        canonical: impl Into<String>,
    ) -> Result<Self> {
        let alias = alias.into();
        let canonical = canonical.into();

        if alias.is_empty() || canonical.is_empty() {
            return Err(TelemetryError::Config(
                "directive alias and target must be non-empty".to_string(),
            ));
        }
        if alias == canonical {
            return Err(TelemetryError::Config(format!(
                "directive alias {alias} maps to itself"
            )));
        }
        if self.aliases.contains_key(&canonical) {
            return Err(TelemetryError::Config(format!(
                "directive alias target {canonical} is itself an alias"
            )));
        }
        if self.aliases.values().any(|target| *target == alias) {
            return Err(TelemetryError::Config(format!(
                "directive {alias} is already a canonical target"
            )));
        }

        self.aliases.insert(alias, canonical);
        Ok(self)
    }

    /// Return the canonical name for `raw`.
    ///
    /// # Examples
    ///
    /// ```
    /// use telemetry_core::directives::DirectiveNormalizer;
    ///
    /// let normalizer = DirectiveNormalizer::new();
    /// assert_eq!(normalizer.normalize("script-src-elem"), "script-src");
    /// assert_eq!(normalizer.normalize("style-src-elem"), "style-src");
    /// assert_eq!(normalizer.normalize("img-src"), "img-src");
    /// ```
    pub fn normalize<'a>(&'a self, raw: &'a str) -> &'a str {
        self.aliases.get(raw).map(String::as_str).unwrap_or(raw)
    }

    /// Returns `true` when `name` is an alias key in the table.
    pub fn is_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    /// All canonical targets currently in the table, sorted and de-duplicated.
    pub fn canonical_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.aliases.values().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Parse a `FROM=TO` alias specification as accepted on the command line.
pub fn parse_alias_spec(spec: &str) -> Result<(String, String)> {
    let (alias, canonical) = spec.split_once('=').ok_or_else(|| {
        TelemetryError::Config(format!("directive alias must be FROM=TO, got {spec:?}"))
    })?;
    let alias = alias.trim();
    let canonical = canonical.trim();
    if alias.is_empty() || canonical.is_empty() {
        return Err(TelemetryError::Config(format!(
            "directive alias must be FROM=TO, got {spec:?}"
        )));
    }
    Ok((alias.to_string(), canonical.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
