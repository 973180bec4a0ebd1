//! Violation log discovery and parsing.
//!
//! The browser-facing endpoint appends one `{"csp-report": {...}}` object per
//! line. Older server builds instead rewrote the whole log as a pretty-printed
//! JSON array of flattened, timestamped reports; both layouts are accepted.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::models::{ViolationRecord, CSP_REPORT_FIELD, VIOLATED_DIRECTIVE_FIELD};
use tracing::{debug, warn};

/// File extensions picked up when the log path is a directory.
pub const LOG_EXTENSIONS: &[&str] = &["log", "jsonl"];

// ── LogFormat ─────────────────────────────────────────────────────────────────

/// Layout of a violation log, detected from its first non-blank byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    NdJson,
    /// A single JSON array of report objects.
    JsonArray,
}

// ── ViolationLogReader ────────────────────────────────────────────────────────

enum Source<R> {
    Lines { reader: R, buf: Vec<u8> },
    Array(std::iter::Enumerate<std::vec::IntoIter<Value>>),
}

/// Lazy sequence of [`ViolationRecord`]s.
///
/// NDJSON input is read one line at a time. Blank lines are skipped; a line
/// that is not JSON or lacks `csp-report.violated-directive` yields
/// [`TelemetryError::RecordMalformed`] and iteration continues. Any other
/// error is yielded once and ends the sequence.
pub struct ViolationLogReader<R> {
    source: Source<R>,
    format: LogFormat,
    line_no: usize,
    done: bool,
}

impl<R: BufRead> ViolationLogReader<R> {
    /// Detect the layout of `reader` and prepare to iterate it.
    ///
    /// A JSON-array log is parsed eagerly here; a parse failure is returned
    /// as [`TelemetryError::JsonParse`].
    pub fn new(mut reader: R) -> Result<Self> {
        let (format, skipped_lines) = detect_format(&mut reader)?;

        let source = match format {
            LogFormat::NdJson => Source::Lines {
                reader,
                buf: Vec::new(),
            },
            LogFormat::JsonArray => {
                let entries: Vec<Value> = serde_json::from_reader(reader)?;
                Source::Array(entries.into_iter().enumerate())
            }
        };

        Ok(Self {
            source,
            format,
            line_no: skipped_lines,
            done: false,
        })
    }

    /// The detected log layout.
    pub fn format(&self) -> LogFormat {
        self.format
    }
}

impl<R: BufRead> Iterator for ViolationLogReader<R> {
    type Item = Result<ViolationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match &mut self.source {
            Source::Lines { reader, buf } => loop {
                buf.clear();
                match reader.read_until(b'\n', buf) {
                    Ok(0) => {
                        self.done = true;
                        return None;
                    }
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(TelemetryError::Io(e)));
                    }
                }
                self.line_no += 1;

                let line = match std::str::from_utf8(buf) {
                    Ok(s) => s.trim(),
                    Err(e) => {
                        return Some(Err(TelemetryError::RecordMalformed {
                            line: self.line_no,
                            reason: format!("invalid UTF-8: {e}"),
                        }))
                    }
                };
                if line.is_empty() {
                    continue;
                }
                return Some(parse_ndjson_line(line, self.line_no));
            },
            Source::Array(entries) => {
                let (index, entry) = entries.next()?;
                Some(parse_array_entry(entry, index + 1))
            }
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Open a single violation log file.
///
/// * missing file → [`TelemetryError::SourceNotFound`]
/// * JSON-array log that does not parse → [`TelemetryError::SourceMalformed`]
/// * any other I/O failure → [`TelemetryError::FileRead`]
pub fn open_violation_log(path: &Path) -> Result<ViolationLogReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => TelemetryError::SourceNotFound(path.to_path_buf()),
        _ => TelemetryError::FileRead {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    ViolationLogReader::new(BufReader::new(file)).map_err(|e| match e {
        TelemetryError::JsonParse(err) => TelemetryError::malformed(path, err),
        TelemetryError::Io(source) => TelemetryError::FileRead {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Find all log files (see [`LOG_EXTENSIONS`]) recursively under `dir`,
/// sorted by path.
pub fn find_log_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Log directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| LOG_EXTENSIONS.contains(&ext))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    debug!("Found {} log files under {}", files.len(), dir.display());
    files
}

// ── Internal helpers ──────────────────────────────────────────────────────────

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Skip a leading UTF-8 byte order mark, if any.
fn skip_bom<R: BufRead>(reader: &mut R) -> Result<()> {
    let has_bom = loop {
        match reader.fill_buf() {
            Ok(buf) => break buf.starts_with(UTF8_BOM),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };
    if has_bom {
        reader.consume(UTF8_BOM.len());
    }
    Ok(())
}

/// Skip a BOM and leading whitespace and report which layout follows.
///
/// Returns the layout and the number of newlines consumed, so NDJSON line
/// numbers stay accurate.
fn detect_format<R: BufRead>(reader: &mut R) -> Result<(LogFormat, usize)> {
    skip_bom(reader)?;
    let mut newlines = 0;
    loop {
        let (skip, first) = {
            let buf = match reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if buf.is_empty() {
                return Ok((LogFormat::NdJson, newlines));
            }
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            newlines += buf[..skip].iter().filter(|&&b| b == b'\n').count();
            (skip, buf.get(skip).copied())
        };
        reader.consume(skip);

        if let Some(byte) = first {
            let format = if byte == b'[' {
                LogFormat::JsonArray
            } else {
                LogFormat::NdJson
            };
            return Ok((format, newlines));
        }
    }
}

/// Parse one NDJSON line: `{"csp-report": {"violated-directive": ...}}`.
fn parse_ndjson_line(line: &str, line_no: usize) -> Result<ViolationRecord> {
    let malformed = |reason: String| TelemetryError::RecordMalformed {
        line: line_no,
        reason,
    };

    let data: Value =
        serde_json::from_str(line).map_err(|e| malformed(format!("invalid JSON: {e}")))?;

    let report = data
        .get(CSP_REPORT_FIELD)
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| malformed(format!("missing {CSP_REPORT_FIELD} object")))?;

    ViolationRecord::from_report(report).ok_or_else(|| {
        malformed(format!(
            "missing {CSP_REPORT_FIELD}.{VIOLATED_DIRECTIVE_FIELD}"
        ))
    })
}

/// Parse one element of a JSON-array log. Elements are either flat reports
/// or `{"csp-report": {...}}` wrappers; `position` is 1-based.
fn parse_array_entry(entry: Value, position: usize) -> Result<ViolationRecord> {
    let malformed = |reason: &str| TelemetryError::RecordMalformed {
        line: position,
        reason: reason.to_string(),
    };

    let Value::Object(mut object) = entry else {
        return Err(malformed("log entry is not an object"));
    };

    let report: Map<String, Value> = match object.remove(CSP_REPORT_FIELD) {
        Some(Value::Object(inner)) => {
            // Keep the outer timestamp when only the wrapper carries one.
            let mut inner = inner;
            if let Some(ts) = object.remove("timestamp") {
                inner.entry("timestamp").or_insert(ts);
            }
            inner
        }
        Some(_) => return Err(malformed("csp-report is not an object")),
        None => object,
    };

    ViolationRecord::from_report(report).ok_or_else(|| malformed("missing violated-directive"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
