//! Matrix sweep orchestration
//!
//! Expands configured context sizes × resolved models × repeat runs into
//! an ordered cell sequence and drives it strictly sequentially. The
//! sequencing is load-bearing: server-side GPU residency is part of what
//! is being measured, and overlapping cells would corrupt each other's
//! timings. The only concurrency this tool tolerates is a separate
//! read-only aggregation pass over already-finalized run directories.
//!
//! A cell failure is recorded in its [`RunRecord`] and counted; the sweep
//! always visits every remaining cell.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::client::GenerationTransport;
use crate::config::BenchConfig;
use crate::error::{MedirError, Result};
use crate::executor::{RunExecutor, RunRecord};
use crate::results::RunWriter;
use crate::session::{resolve_selection, ModelSession, ModelSpec};
use crate::sysinfo::SystemInfo;

// ============================================================================
// Cells
// ============================================================================

/// One coordinate of the sweep: a context size, a model, and which of the
/// configured repeat runs this is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixCell {
    /// Requested context window
    pub context_size: u32,
    /// Model under test
    pub model: String,
    /// Zero-based repeat index within the (context, model) pair
    pub repeat_index: u32,
}

impl std::fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} @ {}K run {}",
            self.model,
            self.context_size / 1024,
            self.repeat_index + 1
        )
    }
}

/// Expand a sweep into its ordered cell sequence: outer loop over context
/// sizes in configured order (never sorted), middle loop over models in
/// resolution order, inner loop over repeats
#[must_use]
pub fn expand_cells(
    context_sizes: &[u32],
    models: &[ModelSpec],
    repeat_runs: u32,
) -> Vec<MatrixCell> {
    let mut cells =
        Vec::with_capacity(context_sizes.len() * models.len() * repeat_runs as usize);
    for &context_size in context_sizes {
        for model in models {
            for repeat_index in 0..repeat_runs {
                cells.push(MatrixCell {
                    context_size,
                    model: model.name.clone(),
                    repeat_index,
                });
            }
        }
    }
    cells
}

// ============================================================================
// Plan and summary
// ============================================================================

/// A resolved sweep: the models the selection matched and the exact cell
/// sequence a live run would execute. Dry-run output is rendered from
/// this structure, so it cannot drift from the real execution order.
#[derive(Debug, Clone)]
pub struct MatrixPlan {
    /// Models in resolution order
    pub models: Vec<ModelSpec>,
    /// Cells in execution order
    pub cells: Vec<MatrixCell>,
}

/// Outcome of one finished sweep
#[derive(Debug, Clone)]
pub struct MatrixSummary {
    /// Run directory that received all output
    pub run_dir: PathBuf,
    /// Cells that produced a measurement
    pub succeeded: usize,
    /// Cells that recorded an error
    pub failed: usize,
    /// Context directories written, sweep order
    pub context_dirs: Vec<PathBuf>,
}

impl MatrixSummary {
    /// Cells executed in total
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Drives one sweep against injected transport and session bindings
pub struct MatrixRunner<'a> {
    transport: &'a dyn GenerationTransport,
    session: &'a dyn ModelSession,
    config: &'a BenchConfig,
}

impl<'a> MatrixRunner<'a> {
    /// Bind a runner to a transport, a session, and a resolved config
    #[must_use]
    pub fn new(
        transport: &'a dyn GenerationTransport,
        session: &'a dyn ModelSession,
        config: &'a BenchConfig,
    ) -> Self {
        Self {
            transport,
            session,
            config,
        }
    }

    /// Resolve the model selection and expand the cell sequence.
    ///
    /// Resolution may read the server's catalog; no generation request is
    /// sent. Both dry runs and live runs start from this plan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when the selection resolves to no
    /// models — running zero cells would be indistinguishable from
    /// success — and propagates catalog failures for `all`/pattern
    /// selections.
    pub fn plan(&self) -> Result<MatrixPlan> {
        let models = resolve_selection(self.session, &self.config.selection)?;
        if models.is_empty() {
            return Err(MedirError::InvalidConfiguration {
                key: "models".to_string(),
                reason: "selection matched no models in the catalog".to_string(),
            });
        }
        let cells = expand_cells(&self.config.context_sizes, &models, self.config.repeat_runs);
        Ok(MatrixPlan { models, cells })
    }

    /// Execute the full sweep into a fresh timestamped run directory.
    ///
    /// The resolved configuration and a host snapshot are written to the
    /// run root first, then cells execute in plan order. Each context's
    /// record batch is rewritten atomically after every completed cell,
    /// so an interrupted sweep leaves every finished cell on disk.
    ///
    /// # Errors
    ///
    /// Returns configuration and filesystem failures. Benchmark failures
    /// are recorded per cell and counted in the summary instead.
    pub fn run(&self) -> Result<MatrixSummary> {
        let plan = self.plan()?;
        let prompt = self.config.resolve_prompt()?;

        let writer = RunWriter::create(&self.config.output_dir, &self.config.formats)?;
        writer.write_config(self.config)?;
        writer.write_system_info(&SystemInfo::capture())?;
        info!("run directory: {}", writer.root().display());

        self.sweep(&plan, &prompt, &writer)
    }

    fn sweep(&self, plan: &MatrixPlan, prompt: &str, writer: &RunWriter) -> Result<MatrixSummary> {
        let executor = RunExecutor::new(self.transport, self.session, self.config);
        let contexts = &self.config.context_sizes;
        let total = plan.cells.len();
        let mut summary = MatrixSummary {
            run_dir: writer.root().to_path_buf(),
            succeeded: 0,
            failed: 0,
            context_dirs: Vec::new(),
        };
        let mut cell_no = 0usize;

        for (ctx_idx, &context_size) in contexts.iter().enumerate() {
            let label = self.config.label_for(context_size);
            info!(
                "context {}/{}: {} tokens ({label})",
                ctx_idx + 1,
                contexts.len(),
                context_size
            );

            let mut batch: Vec<RunRecord> = Vec::new();
            let mut ctx_dir: Option<PathBuf> = None;

            for (model_idx, model) in plan.models.iter().enumerate() {
                // Force the first measured run of this model to start
                // from an unloaded state.
                if self.config.cold_start {
                    self.session.cold_start(&model.name);
                }

                for repeat in 0..self.config.repeat_runs {
                    cell_no += 1;
                    info!(
                        "cell {cell_no}/{total}: {} @ {}K run {}/{}",
                        model.name,
                        context_size / 1024,
                        repeat + 1,
                        self.config.repeat_runs
                    );

                    let record = executor.execute(&model.name, context_size, prompt);
                    if record.is_success() {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                        warn!(
                            "cell {cell_no}/{total} failed: {}",
                            record.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    batch.push(record);
                    ctx_dir = Some(writer.write_context_batch(&label, self.config, &batch)?);
                }

                // Models leaving scope are unloaded before the next
                // cell's first run.
                if self.config.stop_between_models && model_idx + 1 < plan.models.len() {
                    self.session.cold_start(&model.name);
                }
            }

            if let Some(dir) = ctx_dir {
                summary.context_dirs.push(dir);
            }

            if self.config.stop_between_contexts && ctx_idx + 1 < contexts.len() {
                for model in &plan.models {
                    self.session.cold_start(&model.name);
                }
            }
        }

        info!(
            "sweep complete: {} succeeded, {} failed",
            summary.succeeded, summary.failed
        );
        Ok(summary)
    }
}
