//! Single-cell benchmark execution
//!
//! [`RunExecutor`] performs exactly one non-streaming generation request
//! for one model under one fully-specified option set and returns one
//! [`RunRecord`]. Transport and server failures are recorded in the
//! record, never raised, so one cell's failure cannot abort a sweep.
//! This component writes no files.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{GenerateOptions, GenerateRequest, GenerationTransport, KeepAlive};
use crate::config::BenchConfig;
use crate::session::ModelSession;

/// Warning attached when the server never reports an active context length
const CTX_FALLBACK_WARNING: &str =
    "server did not report an active context length; recording the requested size";

/// Generation throughput in tokens per second.
///
/// `None` is the "not applicable" sentinel: a zero eval duration never
/// produces an infinite value or a fault.
#[must_use]
pub fn tokens_per_second(tokens: u64, eval_duration_ns: u64) -> Option<f64> {
    if eval_duration_ns == 0 {
        return None;
    }
    Some(tokens as f64 / (eval_duration_ns as f64 / 1e9))
}

/// One measured execution outcome
///
/// Immutable once created; written once into a run directory. Failed
/// executions carry `error` and the "not applicable" sentinel (`None`)
/// in every numeric field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Model name as requested
    pub model: String,
    /// Context size that was requested
    pub requested_ctx: u32,
    /// Context length recorded for the run: server-reported when
    /// available, otherwise the requested size (see `ctx_fallback`)
    pub reported_ctx: u32,
    /// True when `reported_ctx` is the requested-size fallback rather
    /// than a server-reported value
    #[serde(default)]
    pub ctx_fallback: bool,
    /// Whether the model was resident before the request
    #[serde(default)]
    pub preloaded: bool,
    /// Tokens generated
    pub tokens_generated: Option<u64>,
    /// Model load duration (ns)
    pub load_duration_ns: Option<u64>,
    /// Prompt evaluation duration (ns)
    pub prompt_eval_duration_ns: Option<u64>,
    /// Generation duration (ns)
    pub eval_duration_ns: Option<u64>,
    /// Total request duration (ns)
    pub total_duration_ns: Option<u64>,
    /// Generation throughput; `None` when not applicable
    pub tokens_per_second: Option<f64>,
    /// GPU share of resident memory, 0..=100
    pub gpu_percent: Option<u8>,
    /// CPU share of resident memory, 0..=100
    pub cpu_percent: Option<u8>,
    /// Resident size in decimal GB
    pub memory_gb: Option<f64>,
    /// Record creation time, RFC 3339
    pub timestamp: String,
    /// Run label (e.g. "ctx-8k")
    pub label: String,
    /// Failure message; `Some` marks the record as failed
    pub error: Option<String>,
    /// Non-fatal irregularity noted during the run
    pub warning: Option<String>,
}

impl RunRecord {
    /// True when the execution produced a measurement
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn base(model: &str, requested_ctx: u32, label: &str) -> Self {
        Self {
            model: model.to_string(),
            requested_ctx,
            reported_ctx: requested_ctx,
            ctx_fallback: false,
            preloaded: false,
            tokens_generated: None,
            load_duration_ns: None,
            prompt_eval_duration_ns: None,
            eval_duration_ns: None,
            total_duration_ns: None,
            tokens_per_second: None,
            gpu_percent: None,
            cpu_percent: None,
            memory_gb: None,
            timestamp: chrono::Local::now().to_rfc3339(),
            label: label.to_string(),
            error: None,
            warning: None,
        }
    }

    /// Record for a failed execution: numeric fields not applicable,
    /// message attached
    #[must_use]
    pub fn failed(model: &str, requested_ctx: u32, label: &str, error: String) -> Self {
        let mut record = Self::base(model, requested_ctx, label);
        record.error = Some(error);
        record
    }
}

/// Executes one timed generation request per call
pub struct RunExecutor<'a> {
    transport: &'a dyn GenerationTransport,
    session: &'a dyn ModelSession,
    config: &'a BenchConfig,
}

impl<'a> RunExecutor<'a> {
    /// Bind an executor to a transport, session, and resolved config
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

    /// Build the wire request for one cell. Dry-run mode prints exactly
    /// this, so it must match what [`execute`](Self::execute) sends.
    #[must_use]
    pub fn build_request(&self, model: &str, context_size: u32, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream: false,
            think: false,
            options: Some(GenerateOptions {
                num_predict: Some(self.config.num_predict),
                num_ctx: Some(context_size),
                temperature: Some(self.config.temperature),
                seed: self.config.seed,
            }),
            keep_alive: Some(KeepAlive::Duration(self.config.keep_alive.clone())),
        }
    }

    /// Run one generation and produce one record.
    ///
    /// Never returns an error: transport failures, HTTP errors, and
    /// server-reported errors all come back as a failed record.
    pub fn execute(&self, model: &str, context_size: u32, prompt: &str) -> RunRecord {
        let label = self.config.label_for(context_size);
        let preloaded = self.session.is_preloaded(model);
        let request = self.build_request(model, context_size, prompt);

        if self.config.debug {
            match serde_json::to_string(&request) {
                Ok(payload) => debug!(model, context_size, %payload, "generate request"),
                Err(e) => debug!(model, context_size, "payload not serializable: {e}"),
            }
        }

        let response = match self.transport.generate(&request) {
            Ok(response) => response,
            Err(e) => {
                warn!(model, context_size, "run failed: {e}");
                let mut record = RunRecord::failed(model, context_size, &label, e.to_string());
                record.preloaded = preloaded;
                return record;
            },
        };

        let mut record = RunRecord::base(model, context_size, &label);
        record.preloaded = preloaded;
        record.tokens_generated = Some(response.eval_count);
        record.load_duration_ns = Some(response.load_duration);
        record.prompt_eval_duration_ns = Some(response.prompt_eval_duration);
        record.eval_duration_ns = Some(response.eval_duration);
        record.total_duration_ns = Some(response.total_duration);
        record.tokens_per_second = tokens_per_second(response.eval_count, response.eval_duration);

        // Memory placement is probed after the call, while the model is
        // still resident under the request's keep-alive.
        let split = self.session.memory_split(model);
        if let Some(split) = &split {
            record.gpu_percent = Some(split.gpu_percent);
            record.cpu_percent = Some(split.cpu_percent);
            record.memory_gb = Some(split.total_gb);
        }

        let reported_ctx = response
            .context_length
            .or_else(|| split.and_then(|s| s.context_length));
        match reported_ctx {
            Some(ctx) => record.reported_ctx = ctx,
            None => {
                record.reported_ctx = context_size;
                record.ctx_fallback = true;
                record.warning = Some(CTX_FALLBACK_WARNING.to_string());
                warn!(model, context_size, "{CTX_FALLBACK_WARNING}");
            },
        }

        record
    }
}
