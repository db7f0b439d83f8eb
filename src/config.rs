//! Layered benchmark configuration
//!
//! One immutable [`BenchConfig`] is produced per invocation from four
//! sources with strict precedence: CLI flags > environment variables >
//! YAML file > hardcoded defaults. Presence decides, not value equality:
//! a flag explicitly set to the default value still beats a conflicting
//! environment variable.
//!
//! Environment access is never ambient. The caller snapshots the process
//! environment into an [`EnvSource`] (or builds one from literal pairs in
//! tests) and passes it in, so multiple configurations can be resolved in
//! the same process without interference.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MedirError, Result};

/// Conventional config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "medir.yaml";

/// Prompt used when neither `prompt` nor `prompt_file` is configured.
///
/// Sized so that small models finish in seconds while still exercising
/// real generation, and phrased to avoid tokenizer-specific shortcuts.
pub const DEFAULT_PROMPT: &str = "\
Task: Write one neutral, self-contained paragraph explaining how to benchmark small local language models fairly across devices.

Requirements:
- Output exactly five sentences.
- Each sentence must contain 14-16 words.
- Use plain English; avoid brand names, URLs, or platform-specific details.
- Do not include lists, headings, code, markdown, apologies, or meta commentary.
- Provide only the paragraph content; no title, no introduction, no closing.";

// ============================================================================
// Export formats
// ============================================================================

/// On-disk export format for run records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values, one row per record
    Csv,
    /// Pretty-printed JSON: config snapshot + record array
    Json,
    /// Column-oriented JSON: config snapshot + per-field arrays
    Columnar,
}

impl ExportFormat {
    /// Parse a format name as it appears in YAML lists or `--format` values
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming the `format` key for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "columnar" | "columns" => Ok(ExportFormat::Columnar),
            other => Err(MedirError::InvalidConfiguration {
                key: "format".to_string(),
                reason: format!("unknown export format '{other}' (expected csv, json, or columnar)"),
            }),
        }
    }

    /// File name this format writes inside a context directory
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "benchmark.csv",
            ExportFormat::Json => "benchmark.json",
            ExportFormat::Columnar => "benchmark.columns.json",
        }
    }
}

/// Parse a comma-separated `--format` value into a de-duplicated list
///
/// # Errors
///
/// Returns `InvalidConfiguration` for any unknown format name.
pub fn parse_format_list(s: &str) -> Result<Vec<ExportFormat>> {
    let mut formats = Vec::new();
    for part in s.split(',') {
        let f = ExportFormat::parse(part)?;
        if !formats.contains(&f) {
            formats.push(f);
        }
    }
    Ok(formats)
}

// ============================================================================
// Model selection
// ============================================================================

/// How models are chosen for a run, resolved against the server catalog
/// once at startup (never re-evaluated mid-sweep)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionSpec {
    /// Every model in the catalog, catalog order
    All,
    /// Explicit model names, order preserved
    List(Vec<String>),
    /// Case-insensitive regex matched against catalog names
    Pattern(String),
}

impl SelectionSpec {
    /// Build a spec from a `--select` pattern string.
    ///
    /// "all" and "*" mean the whole catalog; anything else is a regex.
    #[must_use]
    pub fn from_pattern(pattern: &str) -> Self {
        let trimmed = pattern.trim();
        if trimmed.eq_ignore_ascii_case("all") || trimmed == "*" {
            SelectionSpec::All
        } else {
            SelectionSpec::Pattern(trimmed.to_string())
        }
    }

    /// Build a spec from explicit names, splitting any comma-separated entries
    #[must_use]
    pub fn from_names(names: &[String]) -> Self {
        let list: Vec<String> = names
            .iter()
            .flat_map(|n| n.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        SelectionSpec::List(list)
    }
}

impl Default for SelectionSpec {
    fn default() -> Self {
        SelectionSpec::All
    }
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Resolved, immutable benchmark configuration
///
/// Created once per invocation by [`BenchConfig::resolve`]; a snapshot is
/// written into every run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Inference server host
    pub host: String,
    /// Inference server port
    pub port: u16,
    /// Inline prompt text (wins over `prompt_file`)
    pub prompt: Option<String>,
    /// Path to a prompt file
    pub prompt_file: Option<PathBuf>,
    /// Tokens to generate per request
    pub num_predict: u32,
    /// Requested context window for single runs; also the fallback when a
    /// matrix config carries no `context_sizes`
    pub num_ctx: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Optional sampling seed for reproducible generations
    pub seed: Option<u64>,
    /// Executions per matrix cell
    pub repeat_runs: u32,
    /// Server-side residency duration after a request (e.g. "2s", "5m")
    pub keep_alive: String,
    /// Explicit run label; wins over `label_template`
    pub label: Option<String>,
    /// Label template; `{context}` expands to `ctx_size / 1024`
    pub label_template: String,
    /// Root directory that receives timestamped run directories
    pub output_dir: PathBuf,
    /// Export formats written per context size
    pub formats: Vec<ExportFormat>,
    /// Context sizes for the matrix sweep, in configured order
    pub context_sizes: Vec<u32>,
    /// Model selection, resolved against the catalog at startup
    pub selection: SelectionSpec,
    /// Force-unload each model before its first measured run
    pub cold_start: bool,
    /// Unload models when the sweep leaves a context size
    pub stop_between_contexts: bool,
    /// Unload a model when the sweep moves to the next one
    pub stop_between_models: bool,
    /// Log request payloads and timing detail
    pub debug: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11434,
            prompt: None,
            prompt_file: None,
            num_predict: 256,
            num_ctx: 4096,
            temperature: 0.2,
            seed: None,
            repeat_runs: 1,
            keep_alive: "2s".to_string(),
            label: None,
            label_template: "ctx-{context}k".to_string(),
            output_dir: PathBuf::from("results"),
            formats: vec![ExportFormat::Csv, ExportFormat::Json],
            context_sizes: Vec::new(),
            selection: SelectionSpec::All,
            cold_start: false,
            stop_between_contexts: false,
            stop_between_models: false,
            debug: false,
        }
    }
}

impl BenchConfig {
    /// Resolve the four configuration layers into one immutable config.
    ///
    /// `yaml` is the overlay loaded from a config file (see
    /// [`load_yaml_overlay`]), already absent-vs-present resolved by the
    /// caller. Layers apply lowest to highest: defaults, file, env, CLI.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when an environment variable fails
    /// type coercion.
    pub fn resolve(
        cli: ConfigOverlay,
        env: &EnvSource,
        yaml: Option<ConfigOverlay>,
    ) -> Result<Self> {
        let mut config = BenchConfig::default();
        if let Some(file_overlay) = yaml {
            file_overlay.apply(&mut config);
        }
        env_overlay(env)?.apply(&mut config);
        cli.apply(&mut config);

        if config.context_sizes.is_empty() {
            config.context_sizes = vec![config.num_ctx];
        }
        Ok(config)
    }

    /// Base URL for the inference server
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Run label for one context size: explicit label, or the template
    /// with `{context}` expanded to `size / 1024`
    #[must_use]
    pub fn label_for(&self, context_size: u32) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        let context_k = context_size / 1024;
        self.label_template
            .replace("{context}", &context_k.to_string())
    }

    /// Load the effective prompt: inline text, then prompt file, then the
    /// embedded default.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` naming `prompt_file` when a
    /// configured file cannot be read.
    pub fn resolve_prompt(&self) -> Result<String> {
        if let Some(text) = &self.prompt {
            return Ok(text.clone());
        }
        if let Some(path) = &self.prompt_file {
            return std::fs::read_to_string(path).map_err(|e| {
                MedirError::InvalidConfiguration {
                    key: "prompt_file".to_string(),
                    reason: format!("cannot read {}: {e}", path.display()),
                }
            });
        }
        Ok(DEFAULT_PROMPT.to_string())
    }
}

// ============================================================================
// Per-layer overlay
// ============================================================================

/// One configuration layer: every field optional, absent fields leave the
/// lower layers untouched
#[derive(Debug, Clone, Default)]
pub struct ConfigOverlay {
    /// Server host override
    pub host: Option<String>,
    /// Server port override
    pub port: Option<u16>,
    /// Inline prompt override
    pub prompt: Option<String>,
    /// Prompt file override
    pub prompt_file: Option<PathBuf>,
    /// Tokens-to-generate override
    pub num_predict: Option<u32>,
    /// Context size override
    pub num_ctx: Option<u32>,
    /// Temperature override
    pub temperature: Option<f64>,
    /// Seed override
    pub seed: Option<u64>,
    /// Repeat count override
    pub repeat_runs: Option<u32>,
    /// Keep-alive override
    pub keep_alive: Option<String>,
    /// Explicit label override
    pub label: Option<String>,
    /// Label template override
    pub label_template: Option<String>,
    /// Output root override
    pub output_dir: Option<PathBuf>,
    /// Export format list override
    pub formats: Option<Vec<ExportFormat>>,
    /// Matrix context sizes override
    pub context_sizes: Option<Vec<u32>>,
    /// Model selection override
    pub selection: Option<SelectionSpec>,
    /// Cold-start toggle override
    pub cold_start: Option<bool>,
    /// Stop-between-contexts toggle override
    pub stop_between_contexts: Option<bool>,
    /// Stop-between-models toggle override
    pub stop_between_models: Option<bool>,
    /// Debug toggle override
    pub debug: Option<bool>,
}

impl ConfigOverlay {
    fn apply(self, config: &mut BenchConfig) {
        if let Some(v) = self.host {
            config.host = v;
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = self.prompt {
            config.prompt = Some(v);
        }
        if let Some(v) = self.prompt_file {
            config.prompt_file = Some(v);
        }
        if let Some(v) = self.num_predict {
            config.num_predict = v;
        }
        if let Some(v) = self.num_ctx {
            config.num_ctx = v;
        }
        if let Some(v) = self.temperature {
            config.temperature = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        if let Some(v) = self.repeat_runs {
            config.repeat_runs = v;
        }
        if let Some(v) = self.keep_alive {
            config.keep_alive = v;
        }
        if let Some(v) = self.label {
            config.label = Some(v);
        }
        if let Some(v) = self.label_template {
            config.label_template = v;
        }
        if let Some(v) = self.output_dir {
            config.output_dir = v;
        }
        if let Some(v) = self.formats {
            config.formats = v;
        }
        if let Some(v) = self.context_sizes {
            config.context_sizes = v;
        }
        if let Some(v) = self.selection {
            config.selection = v;
        }
        if let Some(v) = self.cold_start {
            config.cold_start = v;
        }
        if let Some(v) = self.stop_between_contexts {
            config.stop_between_contexts = v;
        }
        if let Some(v) = self.stop_between_models {
            config.stop_between_models = v;
        }
        if let Some(v) = self.debug {
            config.debug = v;
        }
    }
}

// ============================================================================
// Environment layer
// ============================================================================

/// Snapshot of environment variables, injected rather than read ambiently
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    /// Snapshot the process environment
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a source from literal pairs (test binding)
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Empty source (no variables set)
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

fn parse_env<T: std::str::FromStr>(env: &EnvSource, key: &str) -> Result<Option<T>> {
    match env.get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| MedirError::InvalidConfiguration {
                key: key.to_string(),
                reason: format!(
                    "cannot parse '{raw}' as {}",
                    std::any::type_name::<T>()
                ),
            }),
    }
}

fn parse_env_bool(env: &EnvSource, key: &str) -> Option<bool> {
    env.get(key)
        .map(|raw| matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Build the environment overlay from the recognized `OLLAMA_*` variables.
///
/// # Errors
///
/// Returns `InvalidConfiguration` naming the variable when a set value
/// fails type coercion (a set-but-invalid value is an operator mistake,
/// not an absent layer).
pub fn env_overlay(env: &EnvSource) -> Result<ConfigOverlay> {
    Ok(ConfigOverlay {
        host: env.get("OLLAMA_HOST").map(String::from),
        port: parse_env(env, "OLLAMA_PORT")?,
        num_predict: parse_env(env, "OLLAMA_NUM_PREDICT")?,
        num_ctx: parse_env(env, "OLLAMA_NUM_CTX")?,
        temperature: parse_env(env, "OLLAMA_TEMPERATURE")?,
        keep_alive: env.get("OLLAMA_KEEP_ALIVE").map(String::from),
        debug: parse_env_bool(env, "OLLAMA_DEBUG"),
        ..ConfigOverlay::default()
    })
}

// ============================================================================
// YAML layer
// ============================================================================

/// YAML config file schema; every section and key optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YamlFile {
    #[serde(default)]
    matrix: MatrixSection,
    #[serde(default)]
    benchmark: BenchmarkSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    advanced: AdvancedSection,
    #[serde(default)]
    connection: ConnectionSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MatrixSection {
    context_sizes: Option<Vec<u32>>,
    models: Option<Vec<String>>,
    model_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BenchmarkSection {
    num_predict: Option<u32>,
    num_ctx: Option<u32>,
    temperature: Option<f64>,
    repeat_runs: Option<u32>,
    keep_alive: Option<String>,
    seed: Option<u64>,
    prompt: Option<String>,
    prompt_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OutputSection {
    output_dir: Option<PathBuf>,
    formats: Option<Vec<String>>,
    label_template: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AdvancedSection {
    debug: Option<bool>,
    stop_between_contexts: Option<bool>,
    stop_between_models: Option<bool>,
    cold_start: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConnectionSection {
    host: Option<String>,
    port: Option<u16>,
}

impl YamlFile {
    /// Flatten the sectioned file into one overlay.
    ///
    /// `models` wins over `model_pattern` when both are present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for unknown export format names.
    pub fn into_overlay(self) -> Result<ConfigOverlay> {
        let selection = if let Some(models) = self.matrix.models {
            Some(SelectionSpec::from_names(&models))
        } else {
            self.matrix
                .model_pattern
                .as_deref()
                .map(SelectionSpec::from_pattern)
        };

        let formats = match self.output.formats {
            None => None,
            Some(names) => {
                let mut list = Vec::new();
                for name in &names {
                    let f = ExportFormat::parse(name)?;
                    if !list.contains(&f) {
                        list.push(f);
                    }
                }
                Some(list)
            },
        };

        Ok(ConfigOverlay {
            host: self.connection.host,
            port: self.connection.port,
            prompt: self.benchmark.prompt,
            prompt_file: self.benchmark.prompt_file,
            num_predict: self.benchmark.num_predict,
            num_ctx: self.benchmark.num_ctx,
            temperature: self.benchmark.temperature,
            seed: self.benchmark.seed,
            repeat_runs: self.benchmark.repeat_runs,
            keep_alive: self.benchmark.keep_alive,
            label_template: self.output.label_template,
            output_dir: self.output.output_dir,
            formats,
            context_sizes: self.matrix.context_sizes,
            selection,
            cold_start: self.advanced.cold_start,
            stop_between_contexts: self.advanced.stop_between_contexts,
            stop_between_models: self.advanced.stop_between_models,
            debug: self.advanced.debug,
            ..ConfigOverlay::default()
        })
    }
}

/// Load the YAML overlay for an invocation.
///
/// An explicitly requested file must exist and parse. Without `--config`,
/// the conventional `medir.yaml` is used when present and silently skipped
/// when absent; a present-but-broken default file is still an error.
///
/// # Errors
///
/// Returns `InvalidConfiguration` naming the path for missing explicit
/// files and for parse failures (the reason carries the YAML error, which
/// names the offending key).
pub fn load_yaml_overlay(explicit: Option<&Path>) -> Result<Option<ConfigOverlay>> {
    load_yaml_overlay_at(explicit, Path::new(DEFAULT_CONFIG_PATH))
}

fn load_yaml_overlay_at(
    explicit: Option<&Path>,
    default_path: &Path,
) -> Result<Option<ConfigOverlay>> {
    let (path, required) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => (default_path.to_path_buf(), false),
    };

    if !path.exists() {
        if required {
            return Err(MedirError::InvalidConfiguration {
                key: "config".to_string(),
                reason: format!("configuration file not found: {}", path.display()),
            });
        }
        return Ok(None);
    }

    let text = std::fs::read_to_string(&path).map_err(|e| MedirError::InvalidConfiguration {
        key: "config".to_string(),
        reason: format!("cannot read {}: {e}", path.display()),
    })?;

    let file: YamlFile =
        serde_yaml::from_str(&text).map_err(|e| MedirError::InvalidConfiguration {
            key: "config".to_string(),
            reason: format!("cannot parse {}: {e}", path.display()),
        })?;

    file.into_overlay().map(Some)
}
