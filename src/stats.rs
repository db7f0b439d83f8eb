//! Statistical pooling of run records
//!
//! Records from any number of run directories are pooled by
//! (model, context length) key and summarized per key. Aggregated values
//! are derived data, always recomputable from the raw records.
//!
//! Standard deviation is the population form (divide by n), so a
//! single-sample key reads as stddev 0 rather than undefined.

#![allow(clippy::cast_precision_loss)] // Statistical functions need usize->f64

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MedirError;
use crate::executor::RunRecord;

// ============================================================================
// Sample statistics
// ============================================================================

/// Summary statistics over one pooled sample set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation; 0 for a single sample
    pub std_dev: f64,
    /// Smallest sample
    pub min: f64,
    /// Largest sample
    pub max: f64,
    /// Number of samples pooled
    pub count: usize,
}

impl SampleStats {
    /// Compute statistics over a sample set; `None` when empty
    #[must_use]
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &x in samples {
            min = min.min(x);
            max = max.max(x);
        }

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            min,
            max,
            count: samples.len(),
        })
    }

    /// True when error bars are meaningful (more than one sample)
    #[must_use]
    pub fn has_spread(&self) -> bool {
        self.count > 1
    }
}

// ============================================================================
// Pooled aggregation
// ============================================================================

/// Per-(model, context) summary pooled across runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetric {
    /// Model name
    pub model: String,
    /// Context length the samples were measured at
    pub context: u32,
    /// Tokens/sec statistics over successful samples
    pub tokens_per_second: SampleStats,
    /// Resident memory statistics, when any sample reported it
    pub memory_gb: Option<SampleStats>,
    /// Mean GPU share, when any sample reported it
    pub gpu_percent: Option<f64>,
    /// Mean CPU share, when any sample reported it
    pub cpu_percent: Option<f64>,
    /// Failed executions seen for this key
    pub failed_count: usize,
}

impl AggregatedMetric {
    /// True when every reporting sample ran CPU-only (GPU share zero)
    #[must_use]
    pub fn is_cpu_only(&self) -> bool {
        self.gpu_percent == Some(0.0)
    }
}

/// Pool records by (model, reported context) and summarize each key.
///
/// Order-independent and merge-associative: the same record multiset
/// yields the same statistics regardless of directory boundaries or
/// record order. Keys whose every record failed are logged as
/// aggregation gaps and omitted. Output is sorted by model, then context.
#[must_use]
pub fn aggregate(records: &[RunRecord]) -> Vec<AggregatedMetric> {
    let mut pools: BTreeMap<(String, u32), Vec<&RunRecord>> = BTreeMap::new();
    for record in records {
        pools
            .entry((record.model.clone(), record.reported_ctx))
            .or_default()
            .push(record);
    }

    let mut metrics = Vec::new();
    for ((model, context), pool) in pools {
        let tps: Vec<f64> = pool
            .iter()
            .filter(|r| r.is_success())
            .filter_map(|r| r.tokens_per_second)
            .collect();
        let failed_count = pool.iter().filter(|r| !r.is_success()).count();

        let Some(tokens_per_second) = SampleStats::from_samples(&tps) else {
            warn!(
                "{}",
                MedirError::AggregationGap {
                    model: model.clone(),
                    context,
                }
            );
            continue;
        };

        let memory: Vec<f64> = pool.iter().filter_map(|r| r.memory_gb).collect();
        let gpu: Vec<f64> = pool
            .iter()
            .filter_map(|r| r.gpu_percent)
            .map(f64::from)
            .collect();
        let cpu: Vec<f64> = pool
            .iter()
            .filter_map(|r| r.cpu_percent)
            .map(f64::from)
            .collect();

        metrics.push(AggregatedMetric {
            model,
            context,
            tokens_per_second,
            memory_gb: SampleStats::from_samples(&memory),
            gpu_percent: SampleStats::from_samples(&gpu).map(|s| s.mean),
            cpu_percent: SampleStats::from_samples(&cpu).map(|s| s.mean),
            failed_count,
        });
    }
    metrics
}

/// Context sizes present in aggregated data, ascending and de-duplicated
#[must_use]
pub fn contexts_present(metrics: &[AggregatedMetric]) -> Vec<u32> {
    let mut contexts: Vec<u32> = metrics.iter().map(|m| m.context).collect();
    contexts.sort_unstable();
    contexts.dedup();
    contexts
}

/// Model names present in aggregated data, in first-seen order
#[must_use]
pub fn models_present(metrics: &[AggregatedMetric]) -> Vec<String> {
    let mut models = Vec::new();
    for metric in metrics {
        if !models.contains(&metric.model) {
            models.push(metric.model.clone());
        }
    }
    models
}
