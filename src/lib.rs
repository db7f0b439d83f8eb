//! # Medir
//!
//! Benchmark harness for local LLM inference servers speaking the Ollama
//! HTTP API.
//!
//! Medir (Spanish: "to measure") sweeps a context-size x model matrix
//! against a running server, records per-run throughput and memory
//! placement, pools statistics across runs, and renders charts without
//! any plotting dependency.
//!
//! ## Features
//!
//! - **Layered configuration**: CLI > environment > YAML > defaults,
//!   resolved by presence rather than value
//! - **Sequential sweeps**: one generation request at a time, failures
//!   recorded per cell instead of aborting the matrix
//! - **Durable results**: timestamped run directories, atomic writes,
//!   CSV/JSON/columnar exports
//! - **Self-contained charts**: SVG markup and PNG rasterization are
//!   produced in-crate
//!
//! ## Example
//!
//! ```rust
//! use medir::{tokens_per_second, BenchConfig};
//!
//! // Throughput from server-reported counters
//! assert_eq!(tokens_per_second(1024, 8_000_000_000), Some(128.0));
//!
//! // Zero duration means "not applicable", never a division blowup
//! assert_eq!(tokens_per_second(512, 0), None);
//!
//! let config = BenchConfig::default();
//! assert_eq!(config.api_base(), "http://localhost:11434");
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // u64 -> f64 for token counts is safe
#![allow(clippy::cast_possible_truncation)] // chart pixel coordinates
#![allow(clippy::cast_sign_loss)] // rounded percentages are non-negative
#![allow(clippy::cast_possible_wrap)] // raster coordinates fit in i64
#![allow(clippy::must_use_candidate)] // Not all methods need #[must_use]
#![allow(clippy::missing_panics_doc)] // Mutex poisoning in the mock transport
#![allow(clippy::too_many_lines)] // Chart builders are naturally long
#![allow(clippy::doc_markdown)] // Allow technical terms without backticks
#![allow(clippy::float_cmp)] // Allow exact float comparisons in tests
#![allow(clippy::struct_excessive_bools)] // Teardown toggles are independent flags

/// HTTP client for the inference server's generate/tags/ps endpoints
pub mod client;
/// CLI command implementations (extracted for testability)
pub mod cli;
pub mod config;
pub mod error;
/// Single-cell execution: one timed generation request per call
pub mod executor;
/// Matrix sweep orchestration
///
/// Expands context sizes x models x repeats into an ordered cell
/// sequence and drives it strictly sequentially. Cell failures are
/// recorded, never fatal; teardown policy runs between models and
/// context sizes when configured.
pub mod matrix;
/// Results persistence: run directories, exports, discovery, read-back
pub mod results;
/// Model catalog, residency, and memory-split probing
pub mod session;
pub mod stats;
pub mod sysinfo;
/// Chart geometry plus SVG and PNG backends
///
/// One geometry builder emits drawing primitives; the SVG backend
/// serializes them as markup and the PNG backend rasterizes them onto
/// an RGB canvas with an embedded bitmap font. No image crate involved.
pub mod viz;

// Re-exports for convenience
pub use config::{BenchConfig, ExportFormat, SelectionSpec};
pub use error::{MedirError, Result};
pub use executor::{tokens_per_second, RunRecord};
pub use stats::{aggregate, AggregatedMetric, SampleStats};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
