//! Model session control for the inference server
//!
//! [`ModelSession`] is the capability seam between orchestration and the
//! server: catalog lookup, residency probes, memory-split inspection, and
//! best-effort cold starts. Orchestration code only ever sees the trait,
//! so the concrete binding (HTTP here, scripted in tests) is swappable
//! without touching sweep logic.
//!
//! Selection patterns are resolved against the catalog exactly once, at
//! startup, into a typed model list. An empty or mistyped pattern is
//! caught before the first cell runs, not deep into a long sweep.

use std::collections::HashSet;
use std::sync::Mutex;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::{GenerateRequest, KeepAlive, OllamaClient};
use crate::config::SelectionSpec;
use crate::error::{MedirError, Result};

// ============================================================================
// Session data
// ============================================================================

/// One model in the server catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Model name
    pub name: String,
    /// On-disk size in bytes
    pub size_bytes: u64,
}

/// Memory placement of a resident model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemorySplit {
    /// Share of the model resident in GPU memory, 0..=100
    pub gpu_percent: u8,
    /// Share resident in system memory, 0..=100
    pub cpu_percent: u8,
    /// Total resident size in decimal GB (as the server displays it)
    pub total_gb: f64,
    /// Active context length, when the server reports it
    pub context_length: Option<u32>,
}

impl MemorySplit {
    /// Derive a split from resident byte counts.
    ///
    /// Mirrors how the server's own status display renders the
    /// "100% GPU" / "48%/52% CPU/GPU" column from `size` and `size_vram`.
    #[must_use]
    pub fn from_bytes(size: u64, size_vram: u64, context_length: Option<u32>) -> Self {
        let gpu_percent = if size == 0 {
            0
        } else {
            let pct = (size_vram as f64 / size as f64 * 100.0).round();
            pct.clamp(0.0, 100.0) as u8
        };
        Self {
            gpu_percent,
            cpu_percent: 100 - gpu_percent,
            total_gb: size as f64 / 1e9,
            context_length,
        }
    }

    /// True when the model fell back to CPU-only execution
    #[must_use]
    pub fn is_cpu_only(&self) -> bool {
        self.gpu_percent == 0
    }
}

/// A resolved, concrete model identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model name as it will be sent to the server
    pub name: String,
    /// Whether the name was present in the catalog at resolution time.
    /// Absent models are still attempted (the server may auto-provision).
    pub in_catalog: bool,
}

// ============================================================================
// Capability trait
// ============================================================================

/// Capability contract for model catalog and residency control
pub trait ModelSession: Send + Sync {
    /// Fetch the server's local model catalog.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` when the server cannot be reached or the
    /// response is unusable.
    fn catalog(&self) -> Result<Vec<CatalogEntry>>;

    /// True if the model currently appears in the resident list.
    ///
    /// Probe failures read as "not resident".
    fn is_preloaded(&self, model: &str) -> bool;

    /// Memory placement for a resident model; `None` when the model is
    /// not resident or the probe fails.
    fn memory_split(&self, model: &str) -> Option<MemorySplit>;

    /// Best-effort unload. Failures are logged and swallowed: the next
    /// run proceeds and records whatever residency state actually results.
    fn cold_start(&self, model: &str);
}

/// Resolve a selection spec against the catalog into a typed model list.
///
/// Order-preserving and de-duplicated (first occurrence wins). Explicit
/// list entries missing from the catalog are kept, flagged, and warned
/// about; patterns match case-insensitively in catalog order. An empty
/// result is not an error here — the caller decides whether zero models
/// is fatal.
///
/// # Errors
///
/// Returns `InvalidConfiguration` for an unparsable pattern, and
/// propagates catalog failures when the selection needs the catalog
/// (`All`/`Pattern`). For explicit lists an unreachable catalog degrades
/// to "presence unknown" rather than failing.
pub fn resolve_selection(
    session: &dyn ModelSession,
    spec: &SelectionSpec,
) -> Result<Vec<ModelSpec>> {
    match spec {
        SelectionSpec::All => {
            let catalog = session.catalog()?;
            Ok(dedup_specs(catalog.into_iter().map(|entry| ModelSpec {
                name: entry.name,
                in_catalog: true,
            })))
        },
        SelectionSpec::Pattern(pattern) => {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| MedirError::InvalidConfiguration {
                    key: "select".to_string(),
                    reason: format!("invalid pattern '{pattern}': {e}"),
                })?;
            let catalog = session.catalog()?;
            Ok(dedup_specs(
                catalog
                    .into_iter()
                    .filter(|entry| regex.is_match(&entry.name))
                    .map(|entry| ModelSpec {
                        name: entry.name,
                        in_catalog: true,
                    }),
            ))
        },
        SelectionSpec::List(names) => {
            let known: Option<HashSet<String>> = match session.catalog() {
                Ok(catalog) => Some(catalog.into_iter().map(|e| e.name).collect()),
                Err(e) => {
                    warn!("catalog unavailable, skipping presence check: {e}");
                    None
                },
            };
            let specs = names.iter().map(|name| {
                let in_catalog = known.as_ref().is_none_or(|k| k.contains(name));
                if !in_catalog {
                    warn!("{}", MedirError::ModelNotFound(name.clone()));
                }
                ModelSpec {
                    name: name.clone(),
                    in_catalog,
                }
            });
            Ok(dedup_specs(specs))
        },
    }
}

fn dedup_specs(specs: impl Iterator<Item = ModelSpec>) -> Vec<ModelSpec> {
    let mut seen = HashSet::new();
    specs
        .filter(|spec| seen.insert(spec.name.clone()))
        .collect()
}

// ============================================================================
// HTTP binding
// ============================================================================

/// [`ModelSession`] over the server's HTTP API
pub struct OllamaSession {
    client: OllamaClient,
}

impl OllamaSession {
    /// Bind a session to an existing client
    #[must_use]
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    /// The underlying HTTP client
    #[must_use]
    pub fn client(&self) -> &OllamaClient {
        &self.client
    }
}

impl ModelSession for OllamaSession {
    fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .client
            .list_models()?
            .into_iter()
            .map(|m| CatalogEntry {
                name: m.name,
                size_bytes: m.size,
            })
            .collect())
    }

    fn is_preloaded(&self, model: &str) -> bool {
        self.client
            .list_resident()
            .map(|resident| resident.iter().any(|m| m.name == model))
            .unwrap_or(false)
    }

    fn memory_split(&self, model: &str) -> Option<MemorySplit> {
        let resident = self.client.list_resident().ok()?;
        resident
            .iter()
            .find(|m| m.name == model)
            .map(|m| MemorySplit::from_bytes(m.size, m.size_vram, m.context_length))
    }

    fn cold_start(&self, model: &str) {
        // Zero keep-alive asks the server to evict immediately.
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: String::new(),
            stream: false,
            think: false,
            options: None,
            keep_alive: Some(KeepAlive::Seconds(0)),
        };
        if let Err(e) = self.client.generate(&request) {
            warn!("cold start of {model} failed: {e}");
        }
    }
}

// ============================================================================
// Scripted binding for tests
// ============================================================================

/// Scripted [`ModelSession`] with a recorded cold-start log
#[derive(Default)]
pub struct MockSession {
    catalog: Vec<CatalogEntry>,
    preloaded: HashSet<String>,
    splits: Vec<(String, MemorySplit)>,
    catalog_error: bool,
    cold_starts: Mutex<Vec<String>>,
}

impl MockSession {
    /// Empty session: no catalog, nothing resident
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add catalog entries by name
    #[must_use]
    pub fn with_catalog(mut self, names: &[&str]) -> Self {
        self.catalog = names
            .iter()
            .map(|n| CatalogEntry {
                name: (*n).to_string(),
                size_bytes: 1_000_000_000,
            })
            .collect();
        self
    }

    /// Mark a model as resident
    #[must_use]
    pub fn with_preloaded(mut self, name: &str) -> Self {
        self.preloaded.insert(name.to_string());
        self
    }

    /// Script the memory split returned for a model
    #[must_use]
    pub fn with_split(mut self, name: &str, split: MemorySplit) -> Self {
        self.splits.push((name.to_string(), split));
        self
    }

    /// Make catalog calls fail (unreachable server)
    #[must_use]
    pub fn with_catalog_error(mut self) -> Self {
        self.catalog_error = true;
        self
    }

    /// Models that received a cold start, in call order
    pub fn cold_start_log(&self) -> Vec<String> {
        self.cold_starts.lock().expect("mock lock").clone()
    }
}

impl ModelSession for MockSession {
    fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        if self.catalog_error {
            return Err(MedirError::ConnectionError(
                "mock catalog unavailable".to_string(),
            ));
        }
        Ok(self.catalog.clone())
    }

    fn is_preloaded(&self, model: &str) -> bool {
        self.preloaded.contains(model)
    }

    fn memory_split(&self, model: &str) -> Option<MemorySplit> {
        self.splits
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, split)| *split)
    }

    fn cold_start(&self, model: &str) {
        self.cold_starts
            .lock()
            .expect("mock lock")
            .push(model.to_string());
    }
}
