use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::directives::{parse_alias_spec, DirectiveNormalizer};
use crate::error::Result;

pub const DEFAULT_VIOLATION_LOG: &str = "csp-violation.log";
pub const DEFAULT_URL_MAP: &str = "urls.json";
pub const DEFAULT_LOAD_TIMES: &str = "load_time.csv";
pub const DEFAULT_STATS_FILE: &str = "evaluation-stats.json";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Aggregate CSP violation reports and URL safety results into statistics
#[derive(Parser, Debug, Clone)]
#[command(
    name = "csp-telemetry",
    about = "Aggregate CSP violation reports and URL safety results into statistics",
    version
)]
pub struct Settings {
    /// Which statistics to produce
    #[arg(long, default_value = "all", value_parser = ["violations", "urls", "load-times", "evaluation", "all"])]
    pub view: String,

    /// Newline-delimited JSON violation log (file or directory)
    #[arg(long, default_value = DEFAULT_VIOLATION_LOG)]
    pub violation_log: PathBuf,

    /// URL safety map written by the URL checker
    #[arg(long, default_value = DEFAULT_URL_MAP)]
    pub url_map: PathBuf,

    /// Page load time measurements (CSV with CSP and Load-Time columns)
    #[arg(long, default_value = DEFAULT_LOAD_TIMES)]
    pub load_times: PathBuf,

    /// Aggregated statistics file read by the evaluation view
    #[arg(long, default_value = DEFAULT_STATS_FILE)]
    pub stats_file: PathBuf,

    /// Write aggregated directive statistics to this path
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Extra directive alias, FROM=TO (repeatable)
    #[arg(long = "alias", value_name = "FROM=TO")]
    pub aliases: Vec<String>,

    /// Only count violations logged within the last N hours
    #[arg(long)]
    pub since_hours: Option<u64>,

    /// Output format
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.csp-telemetry/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violation_log: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_map: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_times: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".csp-telemetry").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!("Failed to clear {}: {}", config_path.display(), e);
            }
            return Self::apply_debug(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins; clap stores arg ids by field name.
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "violation_log") {
            if let Some(v) = last.violation_log {
                settings.violation_log = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "url_map") {
            if let Some(v) = last.url_map {
                settings.url_map = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "load_times") {
            if let Some(v) = last.load_times {
                settings.load_times = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "stats_file") {
            if let Some(v) = last.stats_file {
                settings.stats_file = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "aliases") && settings.aliases.is_empty() {
            if aliases_are_valid(&last.aliases) {
                settings.aliases = last.aliases;
            } else {
                tracing::warn!("Ignoring invalid saved directive aliases");
            }
        }

        settings = Self::apply_debug(settings);

        // Invalid aliases still fail this run but are never persisted.
        let mut params = LastUsedParams::from(&settings);
        if !aliases_are_valid(&params.aliases) {
            params.aliases.clear();
        }
        if let Err(e) = params.save_to(config_path) {
            tracing::warn!("Failed to save last-used params: {}", e);
        }

        settings
    }

    /// Build the directive normalizer from the default table plus `--alias`.
    pub fn normalizer(&self) -> Result<DirectiveNormalizer> {
        let extra = self
            .aliases
            .iter()
            .map(|spec| parse_alias_spec(spec))
            .collect::<Result<Vec<_>>>()?;
        DirectiveNormalizer::with_aliases(extra)
    }

    /// Cutoff for `--since-hours`, relative to `now`.
    ///
    /// Windows reaching past the representable range keep everything.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.since_hours.map(|h| {
            i64::try_from(h)
                .ok()
                .and_then(chrono::Duration::try_hours)
                .and_then(|window| now.checked_sub_signed(window))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        })
    }

    /// `--debug` overrides the log level.
    fn apply_debug(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            view: Some(s.view.clone()),
            violation_log: Some(s.violation_log.clone()),
            url_map: Some(s.url_map.clone()),
            load_times: Some(s.load_times.clone()),
            stats_file: Some(s.stats_file.clone()),
            aliases: s.aliases.clone(),
        }
    }
}

fn aliases_are_valid(specs: &[String]) -> bool {
    specs
        .iter()
        .map(|spec| parse_alias_spec(spec))
        .collect::<Result<Vec<_>>>()
        .and_then(DirectiveNormalizer::with_aliases)
        .is_ok()
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
