//! Run directory layout, export formats, and result recovery
//!
//! Every invocation writes into its own timestamped directory under the
//! configured output root:
//!
//! ```text
//! results/
//!   20250824-153012/
//!     config.json          resolved configuration snapshot
//!     system_info.json     host snapshot
//!     ctx-8k/
//!       benchmark.csv
//!       benchmark.json
//!       benchmark.columns.json
//!     ctx-16k/
//!       ...
//! ```
//!
//! Files are written to a `.tmp` sibling and renamed into place, so an
//! interrupted run never leaves a partial file under the final name.
//! Raw records are the source of truth; everything else (statistics,
//! charts, tables) is derived by re-reading them.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BenchConfig, ExportFormat};
use crate::error::{MedirError, Result};
use crate::executor::RunRecord;
use crate::sysinfo::SystemInfo;

/// Run directory name format, local time
pub const RUN_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Sentinel for missing values in CSV output
const NOT_APPLICABLE: &str = "n/a";

/// Current local time formatted as a run directory name
#[must_use]
pub fn run_stamp() -> String {
    chrono::Local::now().format(RUN_STAMP_FORMAT).to_string()
}

// ============================================================================
// On-disk documents
// ============================================================================

/// JSON export: configuration snapshot plus the raw records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsDocument {
    /// Configuration the records were measured under
    pub config: BenchConfig,
    /// Raw run records, matrix order
    pub records: Vec<RunRecord>,
}

/// Column-oriented export: one array per record field, record order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Columns {
    /// Model names
    pub model: Vec<String>,
    /// Requested context lengths
    pub requested_ctx: Vec<u32>,
    /// Server-reported context lengths
    pub reported_ctx: Vec<u32>,
    /// Tokens generated per record
    pub tokens_generated: Vec<Option<u64>>,
    /// Generation durations in nanoseconds
    pub eval_duration_ns: Vec<Option<u64>>,
    /// Wall-clock durations in nanoseconds
    pub total_duration_ns: Vec<Option<u64>>,
    /// Throughput samples
    pub tokens_per_second: Vec<Option<f64>>,
    /// GPU placement shares
    pub gpu_percent: Vec<Option<u8>>,
    /// Resident memory in GB
    pub memory_gb: Vec<Option<f64>>,
    /// Per-record errors
    pub error: Vec<Option<String>>,
}

impl Columns {
    /// Pivot records into column arrays
    #[must_use]
    pub fn from_records(records: &[RunRecord]) -> Self {
        let mut columns = Self::default();
        for r in records {
            columns.model.push(r.model.clone());
            columns.requested_ctx.push(r.requested_ctx);
            columns.reported_ctx.push(r.reported_ctx);
            columns.tokens_generated.push(r.tokens_generated);
            columns.eval_duration_ns.push(r.eval_duration_ns);
            columns.total_duration_ns.push(r.total_duration_ns);
            columns.tokens_per_second.push(r.tokens_per_second);
            columns.gpu_percent.push(r.gpu_percent);
            columns.memory_gb.push(r.memory_gb);
            columns.error.push(r.error.clone());
        }
        columns
    }
}

/// Columnar export wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnarDocument {
    /// Configuration the records were measured under
    pub config: BenchConfig,
    /// Column arrays
    pub columns: Columns,
}

// ============================================================================
// CSV rendering
// ============================================================================

const CSV_HEADER: &str = "model,requested_ctx,reported_ctx,ctx_fallback,preloaded,\
tokens_generated,load_duration_ns,prompt_eval_duration_ns,eval_duration_ns,\
total_duration_ns,tokens_per_second,gpu_percent,cpu_percent,memory_gb,\
timestamp,label,error,warning";

/// Quote a CSV field when it contains a delimiter, quote, or newline
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_opt_int<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| NOT_APPLICABLE.to_string(), |v| v.to_string())
}

fn csv_opt_f64(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_APPLICABLE.to_string(), |v| format!("{v:.2}"))
}

fn csv_opt_str(value: Option<&str>) -> String {
    value.map_or_else(|| NOT_APPLICABLE.to_string(), csv_field)
}

/// Render records as CSV with a header row; missing values read `n/a`
#[must_use]
pub fn records_to_csv(records: &[RunRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for r in records {
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            csv_field(&r.model),
            r.requested_ctx,
            r.reported_ctx,
            r.ctx_fallback,
            r.preloaded,
            csv_opt_int(r.tokens_generated),
            csv_opt_int(r.load_duration_ns),
            csv_opt_int(r.prompt_eval_duration_ns),
            csv_opt_int(r.eval_duration_ns),
            csv_opt_int(r.total_duration_ns),
            csv_opt_f64(r.tokens_per_second),
            csv_opt_int(r.gpu_percent),
            csv_opt_int(r.cpu_percent),
            csv_opt_f64(r.memory_gb),
            csv_field(&r.timestamp),
            csv_field(&r.label),
            csv_opt_str(r.error.as_deref()),
            csv_opt_str(r.warning.as_deref()),
        );
    }
    out
}

// ============================================================================
// Writer
// ============================================================================

/// Writes one run directory: context batches plus root metadata
#[derive(Debug)]
pub struct RunWriter {
    root: PathBuf,
    formats: Vec<ExportFormat>,
}

impl RunWriter {
    /// Create a run directory named after the current local time
    ///
    /// # Errors
    ///
    /// Returns `IoError` when the directory cannot be created.
    pub fn create(output_dir: &Path, formats: &[ExportFormat]) -> Result<Self> {
        Self::with_stamp(output_dir, &run_stamp(), formats)
    }

    /// Create a run directory with an explicit name
    ///
    /// # Errors
    ///
    /// Returns `IoError` when the directory cannot be created.
    pub fn with_stamp(output_dir: &Path, stamp: &str, formats: &[ExportFormat]) -> Result<Self> {
        let root = output_dir.join(stamp);
        fs::create_dir_all(&root).map_err(|e| MedirError::IoError {
            message: format!("failed to create run directory {}: {e}", root.display()),
        })?;
        debug!("run directory: {}", root.display());
        Ok(Self {
            root,
            formats: formats.to_vec(),
        })
    }

    /// Run directory this writer owns
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one context's records in every configured format
    ///
    /// Called after each context sweep completes, so results survive a
    /// later interruption.
    ///
    /// # Errors
    ///
    /// Returns `IoError` on filesystem failures, `FormatError` when
    /// serialization fails.
    pub fn write_context_batch(
        &self,
        label: &str,
        config: &BenchConfig,
        records: &[RunRecord],
    ) -> Result<PathBuf> {
        let ctx_dir = self.root.join(label);
        fs::create_dir_all(&ctx_dir).map_err(|e| MedirError::IoError {
            message: format!("failed to create {}: {e}", ctx_dir.display()),
        })?;

        for format in &self.formats {
            let path = ctx_dir.join(format.file_name());
            let contents = match format {
                ExportFormat::Csv => records_to_csv(records),
                ExportFormat::Json => {
                    let doc = ResultsDocument {
                        config: config.clone(),
                        records: records.to_vec(),
                    };
                    to_pretty_json(&doc)?
                },
                ExportFormat::Columnar => {
                    let doc = ColumnarDocument {
                        config: config.clone(),
                        columns: Columns::from_records(records),
                    };
                    to_pretty_json(&doc)?
                },
            };
            write_atomic(&path, &contents)?;
        }
        Ok(ctx_dir)
    }

    /// Write the resolved configuration snapshot to the run root
    ///
    /// # Errors
    ///
    /// Returns `IoError` on filesystem failures.
    pub fn write_config(&self, config: &BenchConfig) -> Result<()> {
        write_atomic(&self.root.join("config.json"), &to_pretty_json(config)?)
    }

    /// Write the host snapshot to the run root
    ///
    /// # Errors
    ///
    /// Returns `IoError` on filesystem failures.
    pub fn write_system_info(&self, info: &SystemInfo) -> Result<()> {
        write_atomic(&self.root.join("system_info.json"), &to_pretty_json(info)?)
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| MedirError::FormatError {
        reason: format!("serialization failed: {e}"),
    })
}

/// Write via a `.tmp` sibling plus rename, so readers never observe a
/// half-written file under the final name
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MedirError::IoError {
            message: format!("invalid output path {}", path.display()),
        })?;
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    fs::write(&tmp, contents).map_err(|e| MedirError::IoError {
        message: format!("failed to write {}: {e}", tmp.display()),
    })?;
    fs::rename(&tmp, path).map_err(|e| MedirError::IoError {
        message: format!("failed to rename {} into place: {e}", tmp.display()),
    })
}

// ============================================================================
// Reader
// ============================================================================

/// Records on disk: either the wrapped document or a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsOnDisk {
    Wrapped { records: Vec<RunRecord> },
    Bare(Vec<RunRecord>),
}

/// Run directories under an output root, name-sorted ascending
///
/// A run directory is any directory whose name starts with `202` (the
/// timestamp century prefix), which skips stray files and unrelated
/// directories.
///
/// # Errors
///
/// Returns `IoError` when the output root cannot be listed.
pub fn discover_runs(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(output_dir).map_err(|e| MedirError::IoError {
        message: format!("failed to read {}: {e}", output_dir.display()),
    })?;

    let mut runs: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry.path().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("202"))
        })
        .map(|entry| entry.path())
        .collect();
    runs.sort();
    Ok(runs)
}

/// Most recent run directory under an output root, if any
///
/// # Errors
///
/// Returns `IoError` when the output root cannot be listed.
pub fn latest_run(output_dir: &Path) -> Result<Option<PathBuf>> {
    Ok(discover_runs(output_dir)?.into_iter().next_back())
}

/// Load every record from one run directory's context subdirectories
///
/// # Errors
///
/// Returns `IoError` when the directory cannot be listed, `FormatError`
/// when a `benchmark.json` does not parse.
pub fn read_run(run_dir: &Path) -> Result<Vec<RunRecord>> {
    let entries = fs::read_dir(run_dir).map_err(|e| MedirError::IoError {
        message: format!("failed to read {}: {e}", run_dir.display()),
    })?;

    let mut ctx_dirs: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry.path().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("ctx-"))
        })
        .map(|entry| entry.path())
        .collect();
    ctx_dirs.sort();

    let mut records = Vec::new();
    for dir in ctx_dirs {
        let path = dir.join("benchmark.json");
        if path.is_file() {
            records.extend(read_records_file(&path)?);
        }
    }
    Ok(records)
}

/// Load records pooled across several run directories
///
/// # Errors
///
/// Propagates the first read or parse failure.
pub fn read_runs(run_dirs: &[PathBuf]) -> Result<Vec<RunRecord>> {
    let mut records = Vec::new();
    for dir in run_dirs {
        records.extend(read_run(dir)?);
    }
    Ok(records)
}

/// Parse one records file, accepting the wrapped document or a bare array
///
/// # Errors
///
/// Returns `IoError` when the file cannot be read, `FormatError` when it
/// does not parse as either shape.
pub fn read_records_file(path: &Path) -> Result<Vec<RunRecord>> {
    let contents = fs::read_to_string(path).map_err(|e| MedirError::IoError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    let on_disk: RecordsOnDisk =
        serde_json::from_str(&contents).map_err(|e| MedirError::FormatError {
            reason: format!("{} is not a results file: {e}", path.display()),
        })?;
    Ok(match on_disk {
        RecordsOnDisk::Wrapped { records } | RecordsOnDisk::Bare(records) => records,
    })
}
