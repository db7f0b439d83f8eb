//! Argument surface and command logic for the medir binary
//!
//! Kept out of main.rs so tests can parse arguments and drive commands
//! without spawning a process.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::client::OllamaClient;
use crate::config::{
    load_yaml_overlay, parse_format_list, BenchConfig, ConfigOverlay, EnvSource, SelectionSpec,
};
use crate::error::{MedirError, Result};
use crate::executor::RunRecord;
use crate::matrix::{MatrixPlan, MatrixRunner, MatrixSummary};
use crate::results::{discover_runs, read_run, read_runs};
use crate::session::OllamaSession;
use crate::stats::aggregate;
use crate::viz::{self, ChartFormat};

// ============================================================================
// Argument surface
// ============================================================================

/// Benchmark harness for local inference servers
#[derive(Parser)]
#[command(name = "medir")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// True when the selected subcommand asked for debug logging
    #[must_use]
    pub fn debug(&self) -> bool {
        match &self.command {
            Commands::RunSingle(args) => args.debug,
            Commands::RunMatrix(args) => args.debug,
            Commands::Visualize(args) => args.debug,
        }
    }
}

/// Top-level commands
#[derive(Subcommand)]
pub enum Commands {
    /// Benchmark models at a single context size
    ///
    /// Examples:
    ///   medir run-single qwen3:8b
    ///   medir run-single qwen3:8b gemma3:4b --num-ctx 16384 --repeat-runs 3
    ///   medir run-single --select "qwen.*" --cold-start
    RunSingle(RunSingleArgs),
    /// Sweep a context-size x model matrix from a YAML config
    ///
    /// Examples:
    ///   medir run-matrix
    ///   medir run-matrix --config matrix.yaml --dry-run
    ///   medir run-matrix --repeat-runs 5 --keep-alive 5m
    RunMatrix(RunMatrixArgs),
    /// Aggregate recorded runs and render charts
    ///
    /// Examples:
    ///   medir visualize
    ///   medir visualize results --format svg
    ///   medir visualize --single-run results/20251006-012211 -o charts
    Visualize(VisualizeArgs),
}

/// Arguments for `run-single`
#[derive(Args)]
pub struct RunSingleArgs {
    /// Models to benchmark (name or comma-separated list)
    #[arg(value_name = "MODELS")]
    pub models: Vec<String>,

    /// Select models by regex against the catalog ("all" for every model)
    #[arg(short, long, value_name = "PATTERN")]
    pub select: Option<String>,

    /// Inline prompt text (wins over --prompt-file)
    #[arg(long, value_name = "TEXT")]
    pub prompt: Option<String>,

    /// Read the prompt from a file
    #[arg(long, value_name = "PATH")]
    pub prompt_file: Option<PathBuf>,

    /// Tokens to generate per request
    #[arg(short = 'n', long, value_name = "N")]
    pub num_predict: Option<u32>,

    /// Context window to request
    #[arg(long, value_name = "N")]
    pub num_ctx: Option<u32>,

    /// Sampling temperature
    #[arg(short, long, value_name = "T")]
    pub temperature: Option<f64>,

    /// Sampling seed for reproducible generations
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Measured runs per model
    #[arg(long, value_name = "N")]
    pub repeat_runs: Option<u32>,

    /// Server-side residency after each request (e.g. "2s", "5m")
    #[arg(long, value_name = "DUR")]
    pub keep_alive: Option<String>,

    /// Inference server host
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Inference server port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Run label (default: ctx-{context}k template)
    #[arg(long, value_name = "LABEL")]
    pub label: Option<String>,

    /// Root directory for results
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Export formats, comma-separated: csv,json,columnar
    #[arg(long, value_name = "LIST")]
    pub format: Option<String>,

    /// Force-unload each model before its first measured run
    #[arg(long)]
    pub cold_start: bool,

    /// Path to a YAML config file (default: medir.yaml if present)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log request payloads and timing detail
    #[arg(long)]
    pub debug: bool,
}

impl RunSingleArgs {
    /// Map the parsed flags onto a configuration overlay. Only flags that
    /// were actually given become `Some`, so lower layers keep their say.
    fn overlay(self) -> Result<ConfigOverlay> {
        let selection = if let Some(pattern) = &self.select {
            Some(SelectionSpec::from_pattern(pattern))
        } else if self.models.is_empty() {
            None
        } else {
            Some(SelectionSpec::from_names(&self.models))
        };
        let formats = match &self.format {
            Some(list) => Some(parse_format_list(list)?),
            None => None,
        };
        Ok(ConfigOverlay {
            host: self.host,
            port: self.port,
            prompt: self.prompt,
            prompt_file: self.prompt_file,
            num_predict: self.num_predict,
            num_ctx: self.num_ctx,
            temperature: self.temperature,
            seed: self.seed,
            repeat_runs: self.repeat_runs,
            keep_alive: self.keep_alive,
            label: self.label,
            label_template: None,
            output_dir: self.output_dir,
            formats,
            context_sizes: None,
            selection,
            cold_start: self.cold_start.then_some(true),
            stop_between_contexts: None,
            stop_between_models: None,
            debug: self.debug.then_some(true),
        })
    }
}

/// Arguments for `run-matrix`
#[derive(Args)]
pub struct RunMatrixArgs {
    /// Path to a YAML config file (default: medir.yaml if present)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the cell sequence without sending generation requests
    #[arg(long)]
    pub dry_run: bool,

    /// Tokens to generate per request
    #[arg(short = 'n', long, value_name = "N")]
    pub num_predict: Option<u32>,

    /// Sampling temperature
    #[arg(short, long, value_name = "T")]
    pub temperature: Option<f64>,

    /// Measured runs per matrix cell
    #[arg(long, value_name = "N")]
    pub repeat_runs: Option<u32>,

    /// Server-side residency after each request (e.g. "2s", "5m")
    #[arg(long, value_name = "DUR")]
    pub keep_alive: Option<String>,

    /// Inference server host
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Inference server port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Root directory for results
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Log request payloads and timing detail
    #[arg(long)]
    pub debug: bool,
}

impl RunMatrixArgs {
    fn overlay(self) -> ConfigOverlay {
        ConfigOverlay {
            host: self.host,
            port: self.port,
            num_predict: self.num_predict,
            temperature: self.temperature,
            repeat_runs: self.repeat_runs,
            keep_alive: self.keep_alive,
            output_dir: self.output_dir,
            debug: self.debug.then_some(true),
            ..ConfigOverlay::default()
        }
    }
}

/// Arguments for `visualize`
#[derive(Args)]
pub struct VisualizeArgs {
    /// Results base directory, or one timestamped run directory
    #[arg(value_name = "RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// Restrict aggregation to one run directory
    #[arg(long, value_name = "PATH")]
    pub single_run: Option<PathBuf>,

    /// Chart format: png or svg
    #[arg(long, value_name = "FORMAT", default_value = "png")]
    pub format: String,

    /// Output directory for charts (default: RESULTS_DIR)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Log aggregation detail
    #[arg(long)]
    pub debug: bool,
}

// ============================================================================
// Command handlers
// ============================================================================

/// Benchmark one or more models at a single context size.
///
/// Resolves configuration, forces a one-entry context list, and drives
/// the sweep machinery so output lands in the same run-directory layout
/// a matrix run produces.
pub fn handle_run_single(args: RunSingleArgs) -> Result<()> {
    let yaml = load_yaml_overlay(args.config.as_deref())?;
    let env = EnvSource::from_process();
    let mut config = BenchConfig::resolve(args.overlay()?, &env, yaml)?;
    // A single run is a one-context matrix.
    config.context_sizes = vec![config.num_ctx];

    let session = OllamaSession::new(OllamaClient::new(&config.api_base()));
    let runner = MatrixRunner::new(session.client(), &session, &config);

    print_config(&config);
    let summary = runner.run()?;

    let records = read_run(&summary.run_dir)?;
    print_records(&records);
    print_summary(&summary);
    Ok(())
}

/// Sweep the full context-size x model matrix, or print the plan.
pub fn handle_run_matrix(args: RunMatrixArgs) -> Result<()> {
    let yaml = load_yaml_overlay(args.config.as_deref())?;
    let env = EnvSource::from_process();
    let dry_run = args.dry_run;
    let config = BenchConfig::resolve(args.overlay(), &env, yaml)?;

    let session = OllamaSession::new(OllamaClient::new(&config.api_base()));
    let runner = MatrixRunner::new(session.client(), &session, &config);

    print_config(&config);
    if dry_run {
        let plan = runner.plan()?;
        print_plan(&plan);
        return Ok(());
    }

    let summary = runner.run()?;
    print_summary(&summary);
    Ok(())
}

/// Aggregate recorded runs and render charts plus a Markdown summary.
pub fn handle_visualize(args: VisualizeArgs) -> Result<()> {
    let format = ChartFormat::parse(&args.format)?;
    let results_dir = args
        .results_dir
        .unwrap_or_else(|| PathBuf::from("results"));
    let output_dir = args.output_dir.unwrap_or_else(|| results_dir.clone());

    let run_dirs = if let Some(run) = args.single_run {
        vec![run]
    } else if is_run_dir(&results_dir) {
        vec![results_dir.clone()]
    } else {
        discover_runs(&results_dir)?
    };
    if run_dirs.is_empty() {
        return Err(MedirError::FormatError {
            reason: format!(
                "no benchmark runs found under {}",
                results_dir.display()
            ),
        });
    }

    println!("=== Visualization ===");
    println!("  Aggregating data from {} benchmark runs:", run_dirs.len());
    for dir in &run_dirs {
        println!("    - {}", dir.display());
    }

    let records = read_runs(&run_dirs)?;
    let metrics = aggregate(&records);
    let written = viz::write_charts(&metrics, run_dirs.len(), &output_dir, format)?;

    println!();
    for path in &written {
        println!("  Wrote {}", path.display());
    }
    println!();
    println!("Charts saved to: {}", output_dir.display());
    Ok(())
}

/// A path names one timestamped run directory rather than a results base
fn is_run_dir(path: &std::path::Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with("202"))
}

// ============================================================================
// Console output
// ============================================================================

fn describe_selection(selection: &SelectionSpec) -> String {
    match selection {
        SelectionSpec::All => "all catalog models".to_string(),
        SelectionSpec::List(names) => names.join(", "),
        SelectionSpec::Pattern(pattern) => format!("pattern '{pattern}'"),
    }
}

fn print_config(config: &BenchConfig) {
    let contexts: Vec<String> = config
        .context_sizes
        .iter()
        .map(|c| format!("{}K", c / 1024))
        .collect();

    println!("=== Benchmark Configuration ===");
    println!("  Server: {}", config.api_base());
    println!("  Contexts: {}", contexts.join(", "));
    println!("  Models: {}", describe_selection(&config.selection));
    println!("  Repeat runs: {}", config.repeat_runs);
    println!("  Tokens per run: {}", config.num_predict);
    println!("  Temperature: {}", config.temperature);
    println!("  Keep-alive: {}", config.keep_alive);
    if let Some(seed) = config.seed {
        println!("  Seed: {seed}");
    }
    if config.cold_start {
        println!("  Cold start: enabled");
    }
    if config.stop_between_models {
        println!("  Stop between models: enabled");
    }
    if config.stop_between_contexts {
        println!("  Stop between contexts: enabled");
    }
    println!("  Output: {}", config.output_dir.display());
    println!();
}

fn print_plan(plan: &MatrixPlan) {
    println!("Dry run - cells in execution order:");
    for (index, cell) in plan.cells.iter().enumerate() {
        println!("  {:>3}. {cell}", index + 1);
    }
    println!();
    println!(
        "{} models resolved, {} cells planned",
        plan.models.len(),
        plan.cells.len()
    );
}

fn print_records(records: &[RunRecord]) {
    println!();
    println!("=== Results ===");
    for record in records {
        if let Some(error) = &record.error {
            println!("  {}: failed - {error}", record.model);
            continue;
        }
        let throughput = record
            .tokens_per_second
            .map_or_else(|| "n/a".to_string(), |tps| format!("{tps:.1} tok/s"));
        let mut line = format!("  {}: {throughput}", record.model);
        if let Some(gb) = record.memory_gb {
            line.push_str(&format!(", {gb:.1} GB"));
        }
        if let Some(gpu) = record.gpu_percent {
            line.push_str(&format!(", {gpu}% GPU"));
        }
        if let Some(warning) = &record.warning {
            line.push_str(&format!(" ({warning})"));
        }
        println!("{line}");
    }
}

fn print_summary(summary: &MatrixSummary) {
    println!();
    println!("=== Run Summary ===");
    println!("  Cells executed: {}", summary.total());
    println!("  Succeeded: {}", summary.succeeded);
    println!("  Failed: {}", summary.failed);
    println!();
    println!("Results saved to: {}", summary.run_dir.display());
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    // ========================================================================
    // Argument parsing
    // ========================================================================

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_single_parses_models_and_flags() {
        let cli = Cli::parse_from([
            "medir",
            "run-single",
            "qwen3:8b",
            "gemma3:4b",
            "--num-ctx",
            "16384",
            "--repeat-runs",
            "3",
            "--cold-start",
        ]);
        let Commands::RunSingle(args) = cli.command else {
            panic!("expected run-single");
        };
        assert_eq!(args.models, vec!["qwen3:8b", "gemma3:4b"]);
        assert_eq!(args.num_ctx, Some(16384));
        assert_eq!(args.repeat_runs, Some(3));
        assert!(args.cold_start);
        assert!(!args.debug);
    }

    #[test]
    fn test_run_single_overlay_keeps_absent_flags_absent() {
        let cli = Cli::parse_from(["medir", "run-single", "qwen3:8b"]);
        let Commands::RunSingle(args) = cli.command else {
            panic!("expected run-single");
        };
        let overlay = args.overlay().unwrap();
        assert_eq!(
            overlay.selection,
            Some(SelectionSpec::List(vec!["qwen3:8b".to_string()]))
        );
        assert!(overlay.port.is_none());
        assert!(overlay.num_ctx.is_none());
        assert!(overlay.cold_start.is_none());
        assert!(overlay.debug.is_none());
    }

    #[test]
    fn test_run_single_select_wins_over_positional_models() {
        let cli = Cli::parse_from(["medir", "run-single", "qwen3:8b", "--select", "gemma.*"]);
        let Commands::RunSingle(args) = cli.command else {
            panic!("expected run-single");
        };
        let overlay = args.overlay().unwrap();
        assert_eq!(
            overlay.selection,
            Some(SelectionSpec::Pattern("gemma.*".to_string()))
        );
    }

    #[test]
    fn test_run_single_rejects_unknown_format() {
        let cli = Cli::parse_from(["medir", "run-single", "m1", "--format", "csv,parquet"]);
        let Commands::RunSingle(args) = cli.command else {
            panic!("expected run-single");
        };
        let err = args.overlay().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_run_matrix_parses_dry_run_and_overrides() {
        let cli = Cli::parse_from([
            "medir",
            "run-matrix",
            "--dry-run",
            "--repeat-runs",
            "5",
            "--port",
            "11435",
        ]);
        let Commands::RunMatrix(args) = cli.command else {
            panic!("expected run-matrix");
        };
        assert!(args.dry_run);
        let overlay = args.overlay();
        assert_eq!(overlay.repeat_runs, Some(5));
        assert_eq!(overlay.port, Some(11435));
        assert!(overlay.host.is_none());
        // dry-run is an execution switch, never part of the config
        assert!(overlay.selection.is_none());
    }

    #[test]
    fn test_visualize_defaults() {
        let cli = Cli::parse_from(["medir", "visualize"]);
        let Commands::Visualize(args) = cli.command else {
            panic!("expected visualize");
        };
        assert!(args.results_dir.is_none());
        assert!(args.single_run.is_none());
        assert_eq!(args.format, "png");
        assert!(args.output_dir.is_none());
    }

    #[test]
    fn test_debug_flag_is_visible_before_dispatch() {
        let cli = Cli::parse_from(["medir", "run-matrix", "--debug"]);
        assert!(cli.debug());
        let cli = Cli::parse_from(["medir", "visualize"]);
        assert!(!cli.debug());
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    #[test]
    fn test_is_run_dir_matches_timestamped_names() {
        assert!(is_run_dir(std::path::Path::new(
            "results/20251006-012211"
        )));
        assert!(!is_run_dir(std::path::Path::new("results")));
    }

    #[test]
    fn test_describe_selection_variants() {
        assert_eq!(describe_selection(&SelectionSpec::All), "all catalog models");
        assert_eq!(
            describe_selection(&SelectionSpec::List(vec![
                "m1".to_string(),
                "m2".to_string()
            ])),
            "m1, m2"
        );
        assert_eq!(
            describe_selection(&SelectionSpec::Pattern("qwen.*".to_string())),
            "pattern 'qwen.*'"
        );
    }
}
