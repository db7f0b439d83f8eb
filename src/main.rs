//! Medir CLI - benchmark harness for local LLM inference servers
//!
//! # Commands
//!
//! - `run-single` - Benchmark models at one context size
//! - `run-matrix` - Sweep a context-size x model matrix from YAML config
//! - `visualize` - Aggregate recorded runs and render charts

use clap::Parser;
use medir::cli::{self, Cli};
use medir::config::{env_overlay, EnvSource};

fn init_tracing(debug: bool) {
    let fallback = if debug { "medir=debug" } else { "medir=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));
    tracing_subscriber::fmt::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // OLLAMA_DEBUG raises the filter like --debug does; malformed
    // environment values are reported by config resolution instead.
    let env_debug = env_overlay(&EnvSource::from_process())
        .ok()
        .and_then(|overlay| overlay.debug)
        .unwrap_or(false);
    init_tracing(cli.debug() || env_debug);

    if let Err(e) = cli::entrypoint(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
