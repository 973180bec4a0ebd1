use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure `~/.csp-telemetry/` exists (including any missing parents).
///
/// Returns the directory path.
pub fn ensure_directories() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let app_dir = home.join(".csp-telemetry");
    std::fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map the CLI's level names onto an [`EnvFilter`] directive.
///
/// Unrecognised names are passed through unchanged; the caller falls back to
/// `info` when the result does not parse.
pub fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" | "WARN" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr so it never mixes with the report on stdout. When
/// `log_file` is given, the same events are appended to that file without
/// ANSI colours.
pub fn setup_logging(log_level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_directories() {
        let tmp = TempDir::new().expect("tempdir");

        // Override HOME so that dirs::home_dir() resolves to our temp dir.
        let original_home = std::env::var_os("HOME");
        std::env::set_var("HOME", tmp.path());

        let result = ensure_directories();

        // Restore HOME.
        match original_home {
            Some(v) => std::env::set_var("HOME", v),
            None => std::env::remove_var("HOME"),
        }

        let dir = result.expect("ensure_directories should succeed");
        assert_eq!(dir, tmp.path().join(".csp-telemetry"));
        assert!(dir.is_dir(), ".csp-telemetry dir must exist");
    }

    #[test]
    fn test_filter_directive_maps_level_names() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("CRITICAL"), "error");
        assert_eq!(filter_directive("telemetry_data=trace"), "telemetry_data=trace");
    }

    #[test]
    fn test_setup_logging_creates_log_file() {
        let tmp = TempDir::new().expect("tempdir");
        let log_file = tmp.path().join("logs").join("csp-telemetry.log");

        // A global subscriber may already be installed by another test; the
        // file is opened before installation either way.
        let _ = setup_logging("INFO", Some(&log_file));
        assert!(log_file.exists());
    }
}
