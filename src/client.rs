//! HTTP client for the Ollama-compatible inference server
//!
//! Real network calls, no mock data at this layer: `/api/generate`
//! (non-streaming), `/api/tags` (catalog), `/api/ps` (resident models).
//! Response structs parse leniently (`#[serde(default)]`) because servers
//! of different vintages omit fields freely.
//!
//! Generation carries no client-side timeout: a request may legitimately
//! block for the full token budget, and operators bound worst-case
//! duration by sizing `num_predict`/`num_ctx`. Probe endpoints use a
//! short per-request timeout so a dead server fails fast.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::{MedirError, Result};

/// Connect timeout for all requests (connection setup only)
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Request timeout for catalog/residency probes
const PROBE_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Wire format
// ============================================================================

/// Server-side residency duration attached to a generate request
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum KeepAlive {
    /// Duration string, e.g. "2s" or "5m"
    Duration(String),
    /// Seconds; 0 requests immediate unload
    Seconds(i64),
}

/// Generate request for `POST /api/generate`
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// Model name
    pub model: String,
    /// Input prompt
    pub prompt: String,
    /// Whether to stream (always false here)
    pub stream: bool,
    /// Disable thinking-mode preambles on reasoning models
    pub think: bool,
    /// Generation options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
    /// Residency duration after the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<KeepAlive>,
}

/// Generation options forwarded to the model runner
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateOptions {
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Requested context window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Sampling seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Generate response from `POST /api/generate`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateResponse {
    /// Generated text
    #[serde(default)]
    pub response: String,
    /// Whether generation completed
    #[serde(default)]
    pub done: bool,
    /// Total request duration in nanoseconds
    #[serde(default)]
    pub total_duration: u64,
    /// Model load duration in nanoseconds
    #[serde(default)]
    pub load_duration: u64,
    /// Prompt tokens evaluated
    #[serde(default)]
    pub prompt_eval_count: u64,
    /// Prompt evaluation duration in nanoseconds
    #[serde(default)]
    pub prompt_eval_duration: u64,
    /// Tokens generated
    #[serde(default)]
    pub eval_count: u64,
    /// Generation duration in nanoseconds
    #[serde(default)]
    pub eval_duration: u64,
    /// Active context length, when the server reports it
    #[serde(default)]
    pub context_length: Option<u32>,
    /// Server-side error message
    #[serde(default)]
    pub error: Option<String>,
}

/// One catalog entry from `GET /api/tags`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagModel {
    /// Model name (e.g. "qwen3:8b")
    pub name: String,
    /// On-disk size in bytes
    #[serde(default)]
    pub size: u64,
    /// Content digest
    #[serde(default)]
    pub digest: String,
}

#[derive(Debug, Default, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

/// One resident entry from `GET /api/ps`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PsModel {
    /// Model name
    pub name: String,
    /// Total resident size in bytes
    #[serde(default)]
    pub size: u64,
    /// Bytes resident in GPU memory
    #[serde(default)]
    pub size_vram: u64,
    /// Active context length, when the server reports it
    #[serde(default)]
    pub context_length: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct PsResponse {
    #[serde(default)]
    models: Vec<PsModel>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

// ============================================================================
// Client
// ============================================================================

/// Blocking HTTP client bound to one inference server
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// Create a client for the given base URL (e.g. "http://localhost:11434")
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Base URL this client talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one non-streaming generation.
    ///
    /// An HTTP error status with a JSON `{"error": ...}` body is surfaced
    /// as `ConnectionError` carrying the server's message.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` when the request fails or the server
    /// reports an error; `FormatError` when a success body does not parse.
    pub fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(|e| MedirError::ConnectionError(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(MedirError::ConnectionError(format!(
                "HTTP {status} from {url}: {detail}"
            )));
        }

        let parsed: GenerateResponse =
            response.json().map_err(|e| MedirError::FormatError {
                reason: format!("Failed to parse generate response: {e}"),
            })?;

        if let Some(message) = &parsed.error {
            return Err(MedirError::ConnectionError(format!(
                "Server error: {message}"
            )));
        }

        Ok(parsed)
    }

    /// List the local model catalog via `GET /api/tags`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` on network failure, `FormatError` on an
    /// unparsable body.
    pub fn list_models(&self) -> Result<Vec<TagModel>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .map_err(|e| MedirError::ConnectionError(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(MedirError::ConnectionError(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let parsed: TagsResponse = response.json().map_err(|e| MedirError::FormatError {
            reason: format!("Failed to parse tags response: {e}"),
        })?;
        Ok(parsed.models)
    }

    /// List models currently resident in server memory via `GET /api/ps`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` on network failure, `FormatError` on an
    /// unparsable body.
    pub fn list_resident(&self) -> Result<Vec<PsModel>> {
        let url = format!("{}/api/ps", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .map_err(|e| MedirError::ConnectionError(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(MedirError::ConnectionError(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }

        let parsed: PsResponse = response.json().map_err(|e| MedirError::FormatError {
            reason: format!("Failed to parse ps response: {e}"),
        })?;
        Ok(parsed.models)
    }

    /// Check if the server is reachable (catalog endpoint responds).
    #[must_use]
    pub fn health_check(&self) -> bool {
        self.list_models().is_ok()
    }
}

// ============================================================================
// Transport seam
// ============================================================================

/// Generation transport, separated from the concrete client so executor
/// and orchestrator logic can run against a scripted server in tests
pub trait GenerationTransport: Send + Sync {
    /// Run one non-streaming generation.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError`/`FormatError` exactly as
    /// [`OllamaClient::generate`] does.
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse>;
}

impl GenerationTransport for OllamaClient {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        OllamaClient::generate(self, request)
    }
}

/// Scripted transport for testing: synthesizes timings and fails on
/// chosen call indices
pub struct MockTransport {
    eval_duration_ns: u64,
    load_duration_ns: u64,
    fail_calls: std::collections::HashSet<usize>,
    calls: std::sync::Mutex<Vec<GenerateRequest>>,
}

impl MockTransport {
    /// Transport answering every call with the given generation duration
    #[must_use]
    pub fn new(eval_duration_ns: u64) -> Self {
        Self {
            eval_duration_ns,
            load_duration_ns: 100_000_000,
            fail_calls: std::collections::HashSet::new(),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Make the n-th call (0-based) fail with a connection error
    #[must_use]
    pub fn with_failure_at(mut self, call_index: usize) -> Self {
        self.fail_calls.insert(call_index);
        self
    }

    /// Requests seen so far, in call order
    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().expect("mock lock").clone()
    }
}

impl GenerationTransport for MockTransport {
    fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let mut calls = self.calls.lock().expect("mock lock");
        let index = calls.len();
        calls.push(request.clone());
        drop(calls);

        if self.fail_calls.contains(&index) {
            return Err(MedirError::ConnectionError(format!(
                "injected failure on call {index}"
            )));
        }

        let tokens = request
            .options
            .as_ref()
            .and_then(|o| o.num_predict)
            .unwrap_or(128);
        Ok(GenerateResponse {
            response: "mock output".to_string(),
            done: true,
            total_duration: self.load_duration_ns + self.eval_duration_ns,
            load_duration: self.load_duration_ns,
            prompt_eval_count: 16,
            prompt_eval_duration: 50_000_000,
            eval_count: u64::from(tokens),
            eval_duration: self.eval_duration_ns,
            context_length: None,
            error: None,
        })
    }
}
