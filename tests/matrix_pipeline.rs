//! End-to-end sweep against scripted transport and session bindings
//!
//! Drives the pipeline a real invocation follows - planning, sequential
//! execution, atomic persistence, read-back, aggregation, chart output -
//! with the inference server scripted out.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use medir::client::MockTransport;
use medir::config::{BenchConfig, ExportFormat, SelectionSpec};
use medir::matrix::MatrixRunner;
use medir::results::{discover_runs, latest_run, read_run, read_runs, RunWriter};
use medir::session::{MemorySplit, MockSession};
use medir::stats::aggregate;
use medir::viz::{self, ChartFormat};

fn sweep_config(output: &Path) -> BenchConfig {
    BenchConfig {
        context_sizes: vec![8192, 16384],
        repeat_runs: 2,
        num_predict: 1024,
        selection: SelectionSpec::List(vec!["m1".to_string(), "m2".to_string()]),
        output_dir: output.to_path_buf(),
        prompt: Some("measure".to_string()),
        formats: vec![
            ExportFormat::Csv,
            ExportFormat::Json,
            ExportFormat::Columnar,
        ],
        ..BenchConfig::default()
    }
}

/// Session whose models report a fully GPU-resident split
fn gpu_session() -> MockSession {
    MockSession::new()
        .with_catalog(&["m1", "m2"])
        .with_split("m1", MemorySplit::from_bytes(6_000_000_000, 6_000_000_000, Some(8192)))
        .with_split("m2", MemorySplit::from_bytes(4_000_000_000, 4_000_000_000, Some(8192)))
}

fn tmp_files(dir: &Path, suffix: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else if path.to_string_lossy().ends_with(suffix) {
                found.push(path.display().to_string());
            }
        }
    }
    found
}

// ============================================================================
// Plan ordering
// ============================================================================

#[test]
fn test_dry_run_plan_is_exactly_the_documented_order() {
    // 2 contexts x 2 models x 2 repeats = 8 cells, context-major.
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new(2_000_000_000);
    let session = gpu_session();
    let config = sweep_config(tmp.path());
    let runner = MatrixRunner::new(&transport, &session, &config);

    let plan = runner.plan().unwrap();

    let coords: Vec<(u32, &str, u32)> = plan
        .cells
        .iter()
        .map(|c| (c.context_size, c.model.as_str(), c.repeat_index))
        .collect();
    assert_eq!(
        coords,
        vec![
            (8192, "m1", 0),
            (8192, "m1", 1),
            (8192, "m2", 0),
            (8192, "m2", 1),
            (16384, "m1", 0),
            (16384, "m1", 1),
            (16384, "m2", 0),
            (16384, "m2", 1),
        ]
    );
    // Planning never sends a generation request.
    assert!(transport.calls().is_empty());
    // And writes nothing.
    assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
}

// ============================================================================
// Full sweep persistence
// ============================================================================

#[test]
fn test_sweep_writes_complete_run_directory() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new(2_000_000_000);
    let session = gpu_session();
    let config = sweep_config(tmp.path());
    let runner = MatrixRunner::new(&transport, &session, &config);

    let summary = runner.run().unwrap();
    assert_eq!(summary.succeeded, 8);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.context_dirs.len(), 2);

    // One timestamped run directory, discoverable and latest.
    let runs = discover_runs(tmp.path()).unwrap();
    assert_eq!(runs, vec![summary.run_dir.clone()]);
    assert_eq!(latest_run(tmp.path()).unwrap(), Some(summary.run_dir.clone()));

    // Root snapshots.
    assert!(summary.run_dir.join("config.json").exists());
    assert!(summary.run_dir.join("system_info.json").exists());

    // One file per format per context, named by the label template.
    for label in ["ctx-8k", "ctx-16k"] {
        let ctx_dir = summary.run_dir.join(label);
        assert!(ctx_dir.join("benchmark.csv").exists(), "{label} csv");
        assert!(ctx_dir.join("benchmark.json").exists(), "{label} json");
        assert!(
            ctx_dir.join("benchmark.columns.json").exists(),
            "{label} columnar"
        );

        let csv = fs::read_to_string(ctx_dir.join("benchmark.csv")).unwrap();
        assert!(csv.starts_with("model,"), "csv header first");
        // Header plus one row per (model, repeat).
        assert_eq!(csv.lines().count(), 5);
    }

    // Atomic writes leave no staging files behind.
    assert!(tmp_files(tmp.path(), ".tmp").is_empty());

    // Read-back sees every record with measured throughput.
    let records = read_run(&summary.run_dir).unwrap();
    assert_eq!(records.len(), 8);
    for record in &records {
        assert!(record.error.is_none());
        // 1024 tokens over 2s.
        assert_eq!(record.tokens_per_second, Some(512.0));
        assert_eq!(record.gpu_percent, Some(100));
        assert!(!record.ctx_fallback);
    }
}

#[test]
fn test_injected_failure_is_recorded_never_fatal() {
    // 2 contexts x 3 models x 2 repeats = 12 cells; the 5th errors.
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new(2_000_000_000).with_failure_at(4);
    let session = MockSession::new().with_catalog(&["m1", "m2", "m3"]);
    let config = BenchConfig {
        context_sizes: vec![8192, 16384],
        repeat_runs: 2,
        selection: SelectionSpec::All,
        output_dir: tmp.path().to_path_buf(),
        prompt: Some("measure".to_string()),
        ..BenchConfig::default()
    };
    let runner = MatrixRunner::new(&transport, &session, &config);

    let summary = runner.run().unwrap();
    assert_eq!(summary.succeeded, 11);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total(), 12);

    let records = read_run(&summary.run_dir).unwrap();
    assert_eq!(records.len(), 12);

    let failed: Vec<_> = records.iter().filter(|r| r.error.is_some()).collect();
    assert_eq!(failed.len(), 1);
    // Failed records carry the sentinel in every numeric field.
    assert!(failed[0].tokens_per_second.is_none());
    assert!(failed[0].tokens_generated.is_none());
    assert!(failed[0].eval_duration_ns.is_none());
    assert!(failed[0].error.as_ref().unwrap().contains("injected failure"));
}

#[test]
fn test_unreported_context_falls_back_with_warning() {
    // No memory split scripted and no context_length in the response:
    // reported_ctx falls back to the requested size, flagged as such.
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new(2_000_000_000);
    let session = MockSession::new().with_catalog(&["m1", "m2"]);
    let config = sweep_config(tmp.path());
    let runner = MatrixRunner::new(&transport, &session, &config);

    let summary = runner.run().unwrap();
    let records = read_run(&summary.run_dir).unwrap();
    for record in &records {
        assert!(record.ctx_fallback);
        assert_eq!(record.reported_ctx, record.requested_ctx);
        assert!(record.warning.is_some());
    }
}

// ============================================================================
// Aggregation across runs
// ============================================================================

#[test]
fn test_records_pool_across_run_directories() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new(2_000_000_000);
    let session = gpu_session();
    let config = sweep_config(tmp.path());
    let runner = MatrixRunner::new(&transport, &session, &config);

    let summary = runner.run().unwrap();
    let first = read_run(&summary.run_dir).unwrap();

    // A second, older run with the same record set under another stamp.
    let writer =
        RunWriter::with_stamp(tmp.path(), "20200101-000000", &[ExportFormat::Json]).unwrap();
    let batch: Vec<_> = first
        .iter()
        .filter(|r| r.label == "ctx-8k")
        .cloned()
        .collect();
    writer.write_context_batch("ctx-8k", &config, &batch).unwrap();

    let runs = discover_runs(tmp.path()).unwrap();
    assert_eq!(runs.len(), 2);
    // Name-sorted ascending puts the 2020 stamp first.
    assert!(runs[0].ends_with("20200101-000000"));

    let all = read_runs(&runs).unwrap();
    assert_eq!(all.len(), first.len() + batch.len());

    // The split reports 8192 for every run, so pooling lands on
    // (model, 8192): 4 samples from each source at that key, plus the
    // doubled 8k batch.
    let metrics = aggregate(&all);
    let m1_8k = metrics
        .iter()
        .find(|m| m.model == "m1" && m.context == 8192)
        .unwrap();
    assert_eq!(m1_8k.tokens_per_second.count, 6);
    assert!((m1_8k.tokens_per_second.mean - 512.0).abs() < 1e-9);
    // Identical samples pool to zero spread.
    assert!(m1_8k.tokens_per_second.std_dev.abs() < 1e-9);
}

// ============================================================================
// Charts from a recorded run
// ============================================================================

#[test]
fn test_charts_render_from_recorded_run() {
    let tmp = TempDir::new().unwrap();
    let transport = MockTransport::new(2_000_000_000);
    let session = gpu_session();
    let config = sweep_config(tmp.path());
    let runner = MatrixRunner::new(&transport, &session, &config);

    let summary = runner.run().unwrap();
    let records = read_run(&summary.run_dir).unwrap();
    let metrics = aggregate(&records);
    assert!(!metrics.is_empty());

    let charts_dir = tmp.path().join("charts");
    let written = viz::write_charts(&metrics, 1, &charts_dir, ChartFormat::Svg).unwrap();
    assert_eq!(written.len(), 4);
    assert!(charts_dir.join("performance.svg").exists());
    assert!(charts_dir.join("memory.svg").exists());
    assert!(charts_dir.join("benchmark.svg").exists());

    let summary_md = fs::read_to_string(charts_dir.join("summary.md")).unwrap();
    assert!(summary_md.contains("m1"));
    assert!(summary_md.contains("m2"));

    // PNG renders the same data; only the encoding changes.
    let png_written =
        viz::write_charts(&metrics, 1, &charts_dir, ChartFormat::Png).unwrap();
    assert_eq!(png_written.len(), 4);
    let png = fs::read(charts_dir.join("performance.png")).unwrap();
    assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
}

// ============================================================================
// Write-path safety
// ============================================================================

#[cfg(unix)]
#[test]
fn test_unwritable_context_dir_leaves_no_destination_file() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let writer =
        RunWriter::with_stamp(tmp.path(), "20200101-000000", &[ExportFormat::Json]).unwrap();
    let config = sweep_config(tmp.path());

    // Pre-create the context dir read-only so the staging write fails.
    let ctx_dir = writer.root().join("ctx-8k");
    fs::create_dir_all(&ctx_dir).unwrap();
    fs::set_permissions(&ctx_dir, fs::Permissions::from_mode(0o555)).unwrap();

    let result = writer.write_context_batch("ctx-8k", &config, &[]);
    assert!(result.is_err());
    // Neither the destination nor a stale staging file appears.
    assert!(!ctx_dir.join("benchmark.json").exists());
    assert!(!ctx_dir.join("benchmark.json.tmp").exists());

    fs::set_permissions(&ctx_dir, fs::Permissions::from_mode(0o755)).unwrap();
}
